// Core abstractions for the Atrium notification pipeline
//
// This crate defines the domain types and the trait seams the pipeline is
// built against. It has no database or HTTP dependencies; storage and
// transport live in atrium-storage and atrium-mailer.

pub mod error;
pub mod event;
pub mod prefs;
pub mod traits;

pub use error::{NotifyError, Result};
pub use event::{EventKind, EventPayload, EventRecord, NewEvent, SKIP_NO_ADDRESS};
pub use prefs::{Cadence, RecipientPrefs};
pub use traits::{EventQueue, Mailer, SendLog, UserDirectory};
