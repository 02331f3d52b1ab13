// Event records for the notification queue
//
// An event is a durable record of one portal occurrence (a comment, a task
// creation, a status change) destined for a recipient's digest. Records are
// append-only: the queue flips claim/processed flags but never deletes rows,
// so the table doubles as an audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Terminal skip annotation for recipients with no email address
pub const SKIP_NO_ADDRESS: &str = "no-address";

/// The closed set of portal occurrences that produce notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Comment,
    Task,
    Status,
}

impl EventKind {
    /// All kinds, in a fixed order
    pub const ALL: [EventKind; 3] = [EventKind::Comment, EventKind::Task, EventKind::Status];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Comment => "comment",
            EventKind::Task => "task",
            EventKind::Status => "status",
        }
    }

    pub fn parse(s: &str) -> Option<EventKind> {
        match s {
            "comment" => Some(EventKind::Comment),
            "task" => Some(EventKind::Task),
            "status" => Some(EventKind::Status),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific event data, stored as jsonb and matched exhaustively when
/// rendering a digest line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// A new comment on a project
    Comment { author: String, text: String },

    /// A project or task moved between board columns
    Status { from: String, to: String },

    /// A task was created
    Task { title: String, status: String },
}

impl EventPayload {
    /// The kind this payload belongs to
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::Comment { .. } => EventKind::Comment,
            EventPayload::Status { .. } => EventKind::Status,
            EventPayload::Task { .. } => EventKind::Task,
        }
    }
}

/// A new event to append to the queue
///
/// The kind is derived from the payload variant, so a recorder cannot insert
/// a payload under the wrong kind.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub recipient_id: Uuid,
    pub subject_id: Uuid,
    pub payload: EventPayload,
}

impl NewEvent {
    pub fn new(recipient_id: Uuid, subject_id: Uuid, payload: EventPayload) -> Self {
        Self {
            recipient_id,
            subject_id,
            payload,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

/// A durable event record as stored in the queue
///
/// Lifecycle: `unclaimed -> claimed -> processed`, where a claimed event can
/// return to unclaimed via suppression release or the stale-lease sweep.
/// `processed` is only ever set while the event is claimed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub kind: EventKind,
    pub subject_id: Uuid,
    pub payload: EventPayload,
    pub created_at: DateTime<Utc>,
    pub processed: bool,
    pub claimed: bool,
    pub claimed_at: Option<DateTime<Utc>>,
    pub claimed_by: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub skip_reason: Option<String>,
}

impl EventRecord {
    /// Dedupe key: events sharing a key describe the same topic, and the
    /// digest keeps only the most recent of them
    pub fn dedupe_key(&self) -> (EventKind, Uuid) {
        (self.kind, self.subject_id)
    }
}
