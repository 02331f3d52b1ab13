//! User directory and digest send log over Postgres
//!
//! Both are thin reads/writes: the users and notification_preferences tables
//! are owned by the portal's account and settings screens, and the pipeline
//! only looks things up. digest_sends is owned here and backs the minimum
//! resend interval.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{error, instrument};
use uuid::Uuid;

use atrium_core::{NotifyError, RecipientPrefs, Result, SendLog, UserDirectory};

use crate::models::{DigestSendRow, PreferenceRow, UserRow};

/// Postgres-backed user directory
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    #[instrument(skip(self))]
    async fn email(&self, recipient_id: Uuid) -> Result<Option<String>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, name, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(recipient_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to look up user: {}", e);
            NotifyError::directory(e.to_string())
        })?;

        // A missing user and a user without an address read the same to the
        // dispatcher: nowhere to send
        Ok(row.and_then(|u| u.email))
    }

    #[instrument(skip(self))]
    async fn prefs(&self, recipient_id: Uuid) -> Result<RecipientPrefs> {
        let row = sqlx::query_as::<_, PreferenceRow>(
            r#"
            SELECT recipient_id, enabled_kinds, cadence, updated_at
            FROM notification_preferences
            WHERE recipient_id = $1
            "#,
        )
        .bind(recipient_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to look up preferences: {}", e);
            NotifyError::directory(e.to_string())
        })?;

        Ok(row.map(PreferenceRow::into_prefs).unwrap_or_default())
    }
}

/// Postgres-backed digest send log
#[derive(Clone)]
pub struct PgSendLog {
    pool: PgPool,
}

impl PgSendLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SendLog for PgSendLog {
    #[instrument(skip(self))]
    async fn last_sent_at(&self, recipient_id: Uuid) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query_as::<_, DigestSendRow>(
            r#"
            SELECT recipient_id, last_sent_at
            FROM digest_sends
            WHERE recipient_id = $1
            "#,
        )
        .bind(recipient_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to look up send log: {}", e);
            NotifyError::queue(e.to_string())
        })?;

        Ok(row.map(|r| r.last_sent_at))
    }

    #[instrument(skip(self))]
    async fn record_sent(&self, recipient_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO digest_sends (recipient_id, last_sent_at)
            VALUES ($1, $2)
            ON CONFLICT (recipient_id) DO UPDATE SET last_sent_at = EXCLUDED.last_sent_at
            "#,
        )
        .bind(recipient_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to record digest send: {}", e);
            NotifyError::queue(e.to_string())
        })?;

        Ok(())
    }
}
