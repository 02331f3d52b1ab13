// Database models (internal rows, converted to core domain types)

use atrium_core::{
    Cadence, EventKind, EventPayload, EventRecord, NotifyError, RecipientPrefs, Result,
};
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct EventRow {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub kind: String,
    pub subject_id: Uuid,
    pub payload: sqlx::types::JsonValue,
    pub created_at: DateTime<Utc>,
    pub processed: bool,
    pub claimed: bool,
    pub claimed_at: Option<DateTime<Utc>>,
    pub claimed_by: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub skip_reason: Option<String>,
}

impl EventRow {
    /// Convert a row into the domain record, decoding the jsonb payload
    pub fn into_record(self) -> Result<EventRecord> {
        let kind = EventKind::parse(&self.kind)
            .ok_or_else(|| NotifyError::serialization(format!("unknown event kind: {}", self.kind)))?;
        let payload: EventPayload = serde_json::from_value(self.payload)
            .map_err(|e| NotifyError::serialization(e.to_string()))?;

        Ok(EventRecord {
            id: self.id,
            recipient_id: self.recipient_id,
            kind,
            subject_id: self.subject_id,
            payload,
            created_at: self.created_at,
            processed: self.processed,
            claimed: self.claimed,
            claimed_at: self.claimed_at,
            claimed_by: self.claimed_by,
            processed_at: self.processed_at,
            skip_reason: self.skip_reason,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct PreferenceRow {
    pub recipient_id: Uuid,
    pub enabled_kinds: Vec<String>,
    pub cadence: String,
    pub updated_at: DateTime<Utc>,
}

impl PreferenceRow {
    /// Convert a row into domain preferences
    ///
    /// Unknown kind strings are dropped rather than erroring: a stale row
    /// written by an older portal release must not wedge the pipeline.
    pub fn into_prefs(self) -> RecipientPrefs {
        let enabled_kinds = self
            .enabled_kinds
            .iter()
            .filter_map(|s| EventKind::parse(s))
            .collect();
        let cadence = Cadence::parse(&self.cadence).unwrap_or_default();

        RecipientPrefs {
            enabled_kinds,
            cadence,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: Option<String>,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DigestSendRow {
    pub recipient_id: Uuid,
    pub last_sent_at: DateTime<Utc>,
}
