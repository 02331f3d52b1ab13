//! PostgreSQL implementation of the event queue
//!
//! The claim step is the one true synchronization point in the pipeline:
//! two overlapping scheduled runs must never both own an event. SKIP LOCKED
//! inside a single UPDATE makes the claim all-or-nothing, so a partial claim
//! can never be observed by a second run.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, error, instrument};
use uuid::Uuid;

use atrium_core::{EventQueue, EventRecord, NewEvent, NotifyError, Result};

use crate::models::EventRow;

/// PostgreSQL-backed event queue
///
/// # Example
///
/// ```ignore
/// use atrium_storage::PgEventQueue;
/// use sqlx::PgPool;
///
/// let pool = PgPool::connect("postgres://localhost/atrium").await?;
/// let queue = PgEventQueue::new(pool);
/// ```
#[derive(Clone)]
pub struct PgEventQueue {
    pool: PgPool,
}

impl PgEventQueue {
    /// Create a new queue over the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl EventQueue for PgEventQueue {
    #[instrument(skip(self, event), fields(recipient_id = %event.recipient_id, kind = %event.kind()))]
    async fn append(&self, event: NewEvent, now: DateTime<Utc>) -> Result<Uuid> {
        let id = Uuid::now_v7();
        let payload = serde_json::to_value(&event.payload)
            .map_err(|e| NotifyError::serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO notification_events (id, recipient_id, kind, subject_id, payload, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(event.recipient_id)
        .bind(event.kind().as_str())
        .bind(event.subject_id)
        .bind(&payload)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to append event: {}", e);
            NotifyError::queue(e.to_string())
        })?;

        debug!(%id, "appended event");
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn claim_batch(
        &self,
        now: DateTime<Utc>,
        cutoff: Duration,
        max_size: usize,
        claimant: &str,
    ) -> Result<Vec<EventRecord>> {
        let eligible_before = now - cutoff;

        // This query:
        // 1. Finds unclaimed, unprocessed events old enough to be settled
        // 2. Orders by created_at ascending, limited to max_size
        // 3. Uses SKIP LOCKED so a concurrent claim passes over locked rows
        // 4. Flips claim state in the same atomic statement
        let rows = sqlx::query(
            r#"
            WITH claimable AS (
                SELECT id
                FROM notification_events
                WHERE processed = FALSE
                  AND claimed = FALSE
                  AND created_at <= $1
                ORDER BY created_at, id
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE notification_events e
            SET claimed = TRUE,
                claimed_at = $3,
                claimed_by = $4
            FROM claimable c
            WHERE e.id = c.id
            RETURNING e.id, e.recipient_id, e.kind, e.subject_id, e.payload, e.created_at,
                      e.processed, e.claimed, e.claimed_at, e.claimed_by, e.processed_at,
                      e.skip_reason
            "#,
        )
        .bind(eligible_before)
        .bind(max_size as i64)
        .bind(now)
        .bind(claimant)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to claim events: {}", e);
            NotifyError::queue(e.to_string())
        })?;

        let mut claimed = Vec::with_capacity(rows.len());
        for row in rows {
            let row = EventRow {
                id: row.get("id"),
                recipient_id: row.get("recipient_id"),
                kind: row.get("kind"),
                subject_id: row.get("subject_id"),
                payload: row.get("payload"),
                created_at: row.get("created_at"),
                processed: row.get("processed"),
                claimed: row.get("claimed"),
                claimed_at: row.get("claimed_at"),
                claimed_by: row.get("claimed_by"),
                processed_at: row.get("processed_at"),
                skip_reason: row.get("skip_reason"),
            };
            claimed.push(row.into_record()?);
        }

        // UPDATE ... RETURNING does not guarantee row order; claim order is
        // defined as (created_at, id) ascending
        claimed.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));

        debug!(count = claimed.len(), "claimed events");
        Ok(claimed)
    }

    #[instrument(skip(self, ids), fields(batch = ids.len()))]
    async fn finalize(
        &self,
        ids: &[Uuid],
        now: DateTime<Utc>,
        skip_reason: Option<&str>,
    ) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| NotifyError::queue(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE notification_events
            SET processed = TRUE,
                processed_at = $2,
                skip_reason = $3
            WHERE id = ANY($1)
              AND claimed = TRUE
              AND processed = FALSE
            "#,
        )
        .bind(ids)
        .bind(now)
        .bind(skip_reason)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to finalize events: {}", e);
            NotifyError::queue(e.to_string())
        })?;

        let affected = result.rows_affected() as usize;
        if affected != ids.len() {
            // An event was not claimed (or already processed); roll the whole
            // batch back so no subset is ever marked processed
            tx.rollback()
                .await
                .map_err(|e| NotifyError::queue(e.to_string()))?;
            return Err(NotifyError::BatchNotClaimed(ids.len() - affected, ids.len()));
        }

        tx.commit()
            .await
            .map_err(|e| NotifyError::queue(e.to_string()))?;

        debug!(count = affected, skip_reason, "finalized events");
        Ok(())
    }

    #[instrument(skip(self, ids), fields(batch = ids.len()))]
    async fn release(&self, ids: &[Uuid]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        sqlx::query(
            r#"
            UPDATE notification_events
            SET claimed = FALSE,
                claimed_at = NULL,
                claimed_by = NULL
            WHERE id = ANY($1)
              AND processed = FALSE
            "#,
        )
        .bind(ids)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to release events: {}", e);
            NotifyError::queue(e.to_string())
        })?;

        debug!(count = ids.len(), "released events");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn release_stale(&self, now: DateTime<Utc>, lease: Duration) -> Result<u64> {
        let stale_before = now - lease;

        let result = sqlx::query(
            r#"
            UPDATE notification_events
            SET claimed = FALSE,
                claimed_at = NULL,
                claimed_by = NULL
            WHERE processed = FALSE
              AND claimed = TRUE
              AND claimed_at <= $1
            "#,
        )
        .bind(stale_before)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to release stale claims: {}", e);
            NotifyError::queue(e.to_string())
        })?;

        let released = result.rows_affected();
        if released > 0 {
            debug!(released, "released stale claims");
        }
        Ok(released)
    }
}
