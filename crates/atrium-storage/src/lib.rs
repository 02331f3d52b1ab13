// Postgres storage layer with sqlx
//
// This crate provides database implementations for the core traits:
// - PgEventQueue: implements EventQueue over notification_events
// - PgUserDirectory: implements UserDirectory over users + notification_preferences
// - PgSendLog: implements SendLog over digest_sends
//
// The InMemory* types mirror the Postgres semantics for tests.

pub mod directory;
pub mod event_queue;
pub mod memory;
pub mod models;

pub use directory::{PgSendLog, PgUserDirectory};
pub use event_queue::PgEventQueue;
pub use memory::{InMemoryDirectory, InMemoryEventQueue, InMemorySendLog};
pub use models::*;

/// Migrations for the notification schema, embedded at compile time
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
