//! In-memory implementations of the core traits for testing
//!
//! These mirror the Postgres semantics: claiming is atomic under a single
//! write lock, finalize is all-or-nothing and refuses unclaimed events, and
//! nothing ever deletes a record.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use atrium_core::{
    EventQueue, EventRecord, NewEvent, NotifyError, RecipientPrefs, Result, SendLog,
    UserDirectory,
};

/// In-memory event queue
pub struct InMemoryEventQueue {
    events: RwLock<HashMap<Uuid, EventRecord>>,
}

impl InMemoryEventQueue {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
        }
    }

    /// Get a snapshot of one event
    pub fn event(&self, id: Uuid) -> Option<EventRecord> {
        self.events.read().get(&id).cloned()
    }

    /// Number of unclaimed, unprocessed events
    pub fn pending_count(&self) -> usize {
        self.events
            .read()
            .values()
            .filter(|e| !e.processed && !e.claimed)
            .count()
    }

    /// Number of claimed, unprocessed events
    pub fn claimed_count(&self) -> usize {
        self.events
            .read()
            .values()
            .filter(|e| !e.processed && e.claimed)
            .count()
    }

    /// Number of processed events
    pub fn processed_count(&self) -> usize {
        self.events.read().values().filter(|e| e.processed).count()
    }

    /// Clear all data (for testing)
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl Default for InMemoryEventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventQueue for InMemoryEventQueue {
    async fn append(&self, event: NewEvent, now: DateTime<Utc>) -> Result<Uuid> {
        let id = Uuid::now_v7();
        let record = EventRecord {
            id,
            recipient_id: event.recipient_id,
            kind: event.kind(),
            subject_id: event.subject_id,
            payload: event.payload,
            created_at: now,
            processed: false,
            claimed: false,
            claimed_at: None,
            claimed_by: None,
            processed_at: None,
            skip_reason: None,
        };
        self.events.write().insert(id, record);
        Ok(id)
    }

    async fn claim_batch(
        &self,
        now: DateTime<Utc>,
        cutoff: Duration,
        max_size: usize,
        claimant: &str,
    ) -> Result<Vec<EventRecord>> {
        let eligible_before = now - cutoff;
        let mut events = self.events.write();

        let mut eligible: Vec<Uuid> = events
            .values()
            .filter(|e| !e.processed && !e.claimed && e.created_at <= eligible_before)
            .map(|e| e.id)
            .collect();
        // Claim order is (created_at, id) ascending, same as Postgres
        eligible.sort_by_key(|id| (events[id].created_at, *id));
        eligible.truncate(max_size);

        let mut claimed = Vec::with_capacity(eligible.len());
        for id in eligible {
            if let Some(event) = events.get_mut(&id) {
                event.claimed = true;
                event.claimed_at = Some(now);
                event.claimed_by = Some(claimant.to_string());
                claimed.push(event.clone());
            }
        }

        Ok(claimed)
    }

    async fn finalize(
        &self,
        ids: &[Uuid],
        now: DateTime<Utc>,
        skip_reason: Option<&str>,
    ) -> Result<()> {
        let mut events = self.events.write();

        // Check the whole batch before mutating anything: never mark a
        // subset processed
        let unclaimed = ids
            .iter()
            .filter(|id| {
                events
                    .get(id)
                    .map_or(true, |e| !e.claimed || e.processed)
            })
            .count();
        if unclaimed > 0 {
            return Err(NotifyError::BatchNotClaimed(unclaimed, ids.len()));
        }

        for id in ids {
            if let Some(event) = events.get_mut(id) {
                event.processed = true;
                event.processed_at = Some(now);
                event.skip_reason = skip_reason.map(str::to_string);
            }
        }

        Ok(())
    }

    async fn release(&self, ids: &[Uuid]) -> Result<()> {
        let mut events = self.events.write();
        for id in ids {
            if let Some(event) = events.get_mut(id) {
                if !event.processed {
                    event.claimed = false;
                    event.claimed_at = None;
                    event.claimed_by = None;
                }
            }
        }
        Ok(())
    }

    async fn release_stale(&self, now: DateTime<Utc>, lease: Duration) -> Result<u64> {
        let stale_before = now - lease;
        let mut events = self.events.write();
        let mut released = 0;

        for event in events.values_mut() {
            if !event.processed
                && event.claimed
                && event.claimed_at.is_some_and(|at| at <= stale_before)
            {
                event.claimed = false;
                event.claimed_at = None;
                event.claimed_by = None;
                released += 1;
            }
        }

        Ok(released)
    }
}

/// In-memory user directory
#[derive(Default)]
pub struct InMemoryDirectory {
    emails: RwLock<HashMap<Uuid, Option<String>>>,
    prefs: RwLock<HashMap<Uuid, RecipientPrefs>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user, with or without an email address
    pub fn add_user(&self, recipient_id: Uuid, email: Option<&str>) {
        self.emails
            .write()
            .insert(recipient_id, email.map(str::to_string));
    }

    /// Store explicit preferences for a user
    pub fn set_prefs(&self, recipient_id: Uuid, prefs: RecipientPrefs) {
        self.prefs.write().insert(recipient_id, prefs);
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn email(&self, recipient_id: Uuid) -> Result<Option<String>> {
        Ok(self.emails.read().get(&recipient_id).cloned().flatten())
    }

    async fn prefs(&self, recipient_id: Uuid) -> Result<RecipientPrefs> {
        Ok(self
            .prefs
            .read()
            .get(&recipient_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// In-memory digest send log
#[derive(Default)]
pub struct InMemorySendLog {
    sends: RwLock<HashMap<Uuid, DateTime<Utc>>>,
}

impl InMemorySendLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SendLog for InMemorySendLog {
    async fn last_sent_at(&self, recipient_id: Uuid) -> Result<Option<DateTime<Utc>>> {
        Ok(self.sends.read().get(&recipient_id).copied())
    }

    async fn record_sent(&self, recipient_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.sends.write().insert(recipient_id, at);
        Ok(())
    }
}
