// Trait seams for pluggable backends
//
// These traits let the pipeline run against different backends:
// - Postgres implementations for production (atrium-storage)
// - In-memory implementations for tests
// - An HTTP email API for delivery (atrium-mailer)

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::event::{EventRecord, NewEvent};
use crate::prefs::RecipientPrefs;

// ============================================================================
// EventQueue - the durable, append-only event collection
// ============================================================================

/// The durable event queue
///
/// Append is the only way rows are created and nothing deletes them; claim,
/// finalize, and release only flip processing state. Claiming must be atomic
/// across the selected set so two overlapping pipeline runs can never both
/// own an event.
#[async_trait]
pub trait EventQueue: Send + Sync {
    /// Append one event with `processed=false, claimed=false`
    async fn append(&self, event: NewEvent, now: DateTime<Utc>) -> Result<Uuid>;

    /// Atomically claim up to `max_size` unclaimed, unprocessed events
    /// created at or before `now - cutoff`, oldest first
    ///
    /// The selected set is flipped to `claimed=true, claimed_at=now,
    /// claimed_by=claimant` in a single all-or-nothing write. An empty
    /// result is not an error.
    async fn claim_batch(
        &self,
        now: DateTime<Utc>,
        cutoff: Duration,
        max_size: usize,
        claimant: &str,
    ) -> Result<Vec<EventRecord>>;

    /// Mark a claimed batch processed, optionally annotating why the events
    /// were skipped instead of sent
    ///
    /// Fails with `NotifyError::BatchNotClaimed` (and changes nothing) if any
    /// of the events is not currently claimed: an event is never processed
    /// without having been claimed first.
    async fn finalize(
        &self,
        ids: &[Uuid],
        now: DateTime<Utc>,
        skip_reason: Option<&str>,
    ) -> Result<()>;

    /// Return a claimed batch to the unclaimed state so a future run can
    /// re-batch it (suppression path)
    async fn release(&self, ids: &[Uuid]) -> Result<()>;

    /// Release every claim older than `lease`, returning how many events
    /// were freed
    ///
    /// Recovers events stranded by a transport failure or by a run that
    /// died after claiming.
    async fn release_stale(&self, now: DateTime<Utc>, lease: Duration) -> Result<u64>;
}

// ============================================================================
// UserDirectory - read-only lookup of portal users
// ============================================================================

/// Read-only view of the portal's user records
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// The recipient's email address, if they have one on file
    async fn email(&self, recipient_id: Uuid) -> Result<Option<String>>;

    /// The recipient's notification preferences; the default when no
    /// preference row exists
    async fn prefs(&self, recipient_id: Uuid) -> Result<RecipientPrefs>;
}

// ============================================================================
// SendLog - per-recipient last-digest timestamps
// ============================================================================

/// Tracks when each recipient last received a digest, backing the minimum
/// resend interval
#[async_trait]
pub trait SendLog: Send + Sync {
    async fn last_sent_at(&self, recipient_id: Uuid) -> Result<Option<DateTime<Utc>>>;

    async fn record_sent(&self, recipient_id: Uuid, at: DateTime<Utc>) -> Result<()>;
}

// ============================================================================
// Mailer - the outbound email transport
// ============================================================================

/// Outbound email transport
///
/// Fire-and-forget: the provider gives no delivery receipt back into the
/// pipeline, so success here means "accepted", not "delivered".
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, text_body: &str, html_body: &str)
        -> Result<()>;
}
