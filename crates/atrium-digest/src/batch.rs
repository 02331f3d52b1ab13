//! Grouping and deduplication of claimed events
//!
//! Grouping partitions a claimed batch by recipient. Collapsing keeps one
//! event per `(kind, subject_id)` topic, preferring the greatest
//! `created_at`; on an exact timestamp tie the event later in claim order
//! wins. Collapsed-away duplicates are dropped from the rendered digest only;
//! the dispatcher still finalizes their underlying records so they are never
//! resurfaced.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use uuid::Uuid;

use atrium_core::{EventKind, EventRecord};

/// Partition a claimed batch by recipient
///
/// Events within each group stay in claim order.
pub fn group_by_recipient(events: Vec<EventRecord>) -> HashMap<Uuid, Vec<EventRecord>> {
    let mut groups: HashMap<Uuid, Vec<EventRecord>> = HashMap::new();
    for event in events {
        groups.entry(event.recipient_id).or_default().push(event);
    }
    groups
}

/// Collapse one recipient's events down to the latest per dedupe key
///
/// Output order follows the first appearance of each key in claim order,
/// so rendering is deterministic. Idempotent: collapsing collapsed output
/// changes nothing.
pub fn collapse(events: Vec<EventRecord>) -> Vec<EventRecord> {
    let mut slot_by_key: HashMap<(EventKind, Uuid), usize> = HashMap::new();
    let mut collapsed: Vec<EventRecord> = Vec::new();

    for event in events {
        match slot_by_key.entry(event.dedupe_key()) {
            Entry::Occupied(slot) => {
                let idx = *slot.get();
                // >= so an equal timestamp prefers the later claim-order event
                if event.created_at >= collapsed[idx].created_at {
                    collapsed[idx] = event;
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(collapsed.len());
                collapsed.push(event);
            }
        }
    }

    collapsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use atrium_core::EventPayload;
    use chrono::{DateTime, Duration, Utc};

    fn event(
        recipient: Uuid,
        subject: Uuid,
        payload: EventPayload,
        created_at: DateTime<Utc>,
    ) -> EventRecord {
        EventRecord {
            id: Uuid::now_v7(),
            recipient_id: recipient,
            kind: payload.kind(),
            subject_id: subject,
            payload,
            created_at,
            processed: false,
            claimed: true,
            claimed_at: Some(created_at),
            claimed_by: Some("test-run".into()),
            processed_at: None,
            skip_reason: None,
        }
    }

    fn comment(text: &str) -> EventPayload {
        EventPayload::Comment {
            author: "lee".into(),
            text: text.into(),
        }
    }

    fn status(from: &str, to: &str) -> EventPayload {
        EventPayload::Status {
            from: from.into(),
            to: to.into(),
        }
    }

    #[test]
    fn test_group_partitions_by_recipient() {
        let (r1, r2) = (Uuid::now_v7(), Uuid::now_v7());
        let subject = Uuid::now_v7();
        let now = Utc::now();

        let groups = group_by_recipient(vec![
            event(r1, subject, comment("a"), now),
            event(r2, subject, comment("b"), now),
            event(r1, subject, status("todo", "doing"), now),
        ]);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&r1].len(), 2);
        assert_eq!(groups[&r2].len(), 1);
    }

    #[test]
    fn test_collapse_keeps_latest_per_topic() {
        let recipient = Uuid::now_v7();
        let subject = Uuid::now_v7();
        let t = Utc::now();

        // Two comments on one project plus a status change collapse to
        // two lines: the newest comment and the status change
        let collapsed = collapse(vec![
            event(recipient, subject, comment("first"), t + Duration::seconds(1)),
            event(recipient, subject, comment("second"), t + Duration::seconds(2)),
            event(recipient, subject, status("todo", "done"), t + Duration::seconds(3)),
        ]);

        assert_eq!(collapsed.len(), 2);
        assert_eq!(collapsed[0].payload, comment("second"));
        assert_eq!(collapsed[1].payload, status("todo", "done"));
    }

    #[test]
    fn test_collapse_tie_prefers_later_claim_order() {
        let recipient = Uuid::now_v7();
        let subject = Uuid::now_v7();
        let t = Utc::now();

        let collapsed = collapse(vec![
            event(recipient, subject, comment("earlier in claim order"), t),
            event(recipient, subject, comment("later in claim order"), t),
        ]);

        assert_eq!(collapsed.len(), 1);
        assert_eq!(collapsed[0].payload, comment("later in claim order"));
    }

    #[test]
    fn test_collapse_does_not_merge_across_subjects_or_kinds() {
        let recipient = Uuid::now_v7();
        let (s1, s2) = (Uuid::now_v7(), Uuid::now_v7());
        let t = Utc::now();

        let collapsed = collapse(vec![
            event(recipient, s1, comment("on project one"), t),
            event(recipient, s2, comment("on project two"), t),
            event(recipient, s1, status("todo", "doing"), t),
        ]);

        assert_eq!(collapsed.len(), 3);
    }

    #[test]
    fn test_collapse_is_idempotent() {
        let recipient = Uuid::now_v7();
        let subject = Uuid::now_v7();
        let t = Utc::now();

        let input = vec![
            event(recipient, subject, comment("a"), t),
            event(recipient, subject, comment("b"), t + Duration::seconds(5)),
            event(recipient, subject, status("doing", "done"), t + Duration::seconds(9)),
        ];

        let once = collapse(input);
        let twice = collapse(once.clone());

        let ids = |events: &[EventRecord]| events.iter().map(|e| e.id).collect::<Vec<_>>();
        assert_eq!(ids(&once), ids(&twice));
    }

    #[test]
    fn test_collapse_output_order_follows_first_appearance() {
        let recipient = Uuid::now_v7();
        let (s1, s2) = (Uuid::now_v7(), Uuid::now_v7());
        let t = Utc::now();

        let collapsed = collapse(vec![
            event(recipient, s1, comment("s1 old"), t),
            event(recipient, s2, comment("s2"), t + Duration::seconds(1)),
            event(recipient, s1, comment("s1 new"), t + Duration::seconds(2)),
        ]);

        // s1 keeps its first-appearance slot even though its survivor is newest
        assert_eq!(collapsed.len(), 2);
        assert_eq!(collapsed[0].payload, comment("s1 new"));
        assert_eq!(collapsed[1].payload, comment("s2"));
    }
}
