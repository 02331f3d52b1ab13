//! Event recording, gated by recipient preferences
//!
//! Portal mutation handlers call `record` right after their own write
//! commits. Recording is a pure append: merging duplicate events is the
//! batcher's job at dispatch time, never the recorder's.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use atrium_core::{EventKind, EventPayload, EventQueue, NewEvent, Result, UserDirectory};

/// Appends qualifying portal events to the durable queue
pub struct EventRecorder {
    queue: Arc<dyn EventQueue>,
    directory: Arc<dyn UserDirectory>,
}

impl EventRecorder {
    pub fn new(queue: Arc<dyn EventQueue>, directory: Arc<dyn UserDirectory>) -> Self {
        Self { queue, directory }
    }

    /// Whether events of this kind should be recorded for the recipient
    ///
    /// Reads stored preferences directly; a recipient with no preference row
    /// gets everything. No caching: preferences change rarely relative to
    /// the digest schedule, so a stale read costs at most one cycle.
    pub async fn should_record(&self, recipient_id: Uuid, kind: EventKind) -> Result<bool> {
        Ok(self.directory.prefs(recipient_id).await?.allows(kind))
    }

    /// Append one event for the recipient
    ///
    /// Returns `Ok(None)` without touching the queue when the recipient has
    /// disabled this kind; a disabled kind is a no-op, not an error.
    pub async fn record(
        &self,
        recipient_id: Uuid,
        subject_id: Uuid,
        payload: EventPayload,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>> {
        let kind = payload.kind();
        if !self.should_record(recipient_id, kind).await? {
            debug!(%recipient_id, %kind, "kind disabled for recipient, not recording");
            return Ok(None);
        }

        let id = self
            .queue
            .append(NewEvent::new(recipient_id, subject_id, payload), now)
            .await?;
        Ok(Some(id))
    }
}
