//! The scheduled pipeline entrypoint
//!
//! One invocation per scheduler tick: sweep stale claims, claim a batch,
//! group per recipient, dispatch. The clock is injected (`run_once(now)`), so
//! the whole pipeline runs under test without a timer. Overlapping
//! invocations are safe: the atomic claim partitions the queue between them,
//! and the per-recipient send log bounds send frequency transitively because
//! a recipient's claimed events can only sit in one invocation's batch.

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};
use tracing::{error, info, instrument};
use uuid::Uuid;

use atrium_core::{EventQueue, Mailer, Result, SendLog, UserDirectory};

use crate::batch::group_by_recipient;
use crate::dispatch::{DigestOutcome, Dispatcher};
use crate::render::DigestRenderer;

/// Pipeline tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestConfig {
    /// Ignore events younger than this, to avoid racing an in-flight portal
    /// write
    pub claim_cutoff: Duration,

    /// Maximum events claimed per invocation
    pub batch_size: usize,

    /// Minimum gap between two digests to the same recipient
    pub min_interval: Duration,

    /// Claims older than this are treated as abandoned and released
    pub claim_lease: Duration,

    /// Timezone for human-readable timestamps in message bodies
    pub tz: FixedOffset,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            claim_cutoff: Duration::minutes(2),
            batch_size: 100,
            min_interval: Duration::minutes(10),
            // 2x the usual 15 minute schedule interval
            claim_lease: Duration::minutes(30),
            tz: Utc.fix(),
        }
    }
}

impl DigestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the claim cutoff
    pub fn with_claim_cutoff(mut self, cutoff: Duration) -> Self {
        self.claim_cutoff = cutoff;
        self
    }

    /// Set the per-invocation batch size
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set the minimum resend interval
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Set the claim lease
    pub fn with_claim_lease(mut self, lease: Duration) -> Self {
        self.claim_lease = lease;
        self
    }

    /// Set the display timezone
    pub fn with_tz(mut self, tz: FixedOffset) -> Self {
        self.tz = tz;
        self
    }
}

/// Counters from one pipeline invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Stale claims released before claiming
    pub released_stale: u64,

    /// Raw events claimed this run
    pub claimed: usize,

    /// Recipients who received a digest
    pub sent: usize,

    /// Recipients suppressed by the resend interval
    pub suppressed: usize,

    /// Recipients terminally skipped (no address)
    pub skipped: usize,

    /// Recipients whose send failed (events left claimed)
    pub failed: usize,
}

/// The digest pipeline
///
/// Holds handles to the queue, directory, send log, and transport; every
/// scheduled tick calls `run_once` with the current time.
pub struct DigestPipeline {
    queue: Arc<dyn EventQueue>,
    dispatcher: Dispatcher,
    config: DigestConfig,
}

impl DigestPipeline {
    pub fn new(
        queue: Arc<dyn EventQueue>,
        directory: Arc<dyn UserDirectory>,
        send_log: Arc<dyn SendLog>,
        mailer: Arc<dyn Mailer>,
        config: DigestConfig,
    ) -> Self {
        let dispatcher = Dispatcher::new(
            queue.clone(),
            directory,
            send_log,
            mailer,
            DigestRenderer::new(config.tz),
            config.min_interval,
        );
        Self {
            queue,
            dispatcher,
            config,
        }
    }

    /// Run one pipeline invocation at the given instant
    #[instrument(skip(self), fields(run_id))]
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<RunSummary> {
        let run_id = format!("digest-run-{}", Uuid::now_v7());
        tracing::Span::current().record("run_id", run_id.as_str());

        let mut summary = RunSummary::default();

        summary.released_stale = self
            .queue
            .release_stale(now, self.config.claim_lease)
            .await?;

        let claimed = self
            .queue
            .claim_batch(now, self.config.claim_cutoff, self.config.batch_size, &run_id)
            .await?;
        summary.claimed = claimed.len();

        if claimed.is_empty() {
            info!(released_stale = summary.released_stale, "nothing to dispatch");
            return Ok(summary);
        }

        // Recipients are independent; a failure for one must not keep the
        // rest from going out
        for (recipient_id, events) in group_by_recipient(claimed) {
            match self.dispatcher.try_send(now, recipient_id, events).await {
                Ok(DigestOutcome::Sent { .. }) => summary.sent += 1,
                Ok(DigestOutcome::Suppressed) => summary.suppressed += 1,
                Ok(DigestOutcome::Skipped) => summary.skipped += 1,
                Ok(DigestOutcome::Failed) => summary.failed += 1,
                Err(e) => {
                    // Storage-level trouble; the batch stays claimed and the
                    // lease sweep will recover it
                    error!(%recipient_id, error = %e, "dispatch errored");
                    summary.failed += 1;
                }
            }
        }

        info!(
            claimed = summary.claimed,
            sent = summary.sent,
            suppressed = summary.suppressed,
            skipped = summary.skipped,
            failed = summary.failed,
            released_stale = summary.released_stale,
            "pipeline run complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::EventRecorder;
    use crate::testing::RecordingMailer;
    use atrium_core::{EventKind, EventPayload, RecipientPrefs};
    use atrium_storage::{InMemoryDirectory, InMemoryEventQueue, InMemorySendLog};

    struct Fixture {
        queue: Arc<InMemoryEventQueue>,
        directory: Arc<InMemoryDirectory>,
        send_log: Arc<InMemorySendLog>,
        mailer: Arc<RecordingMailer>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                queue: Arc::new(InMemoryEventQueue::new()),
                directory: Arc::new(InMemoryDirectory::new()),
                send_log: Arc::new(InMemorySendLog::new()),
                mailer: Arc::new(RecordingMailer::new()),
            }
        }

        fn pipeline(&self, config: DigestConfig) -> DigestPipeline {
            DigestPipeline::new(
                self.queue.clone(),
                self.directory.clone(),
                self.send_log.clone(),
                self.mailer.clone(),
                config,
            )
        }

        fn recorder(&self) -> EventRecorder {
            EventRecorder::new(self.queue.clone(), self.directory.clone())
        }
    }

    #[tokio::test]
    async fn test_end_to_end_digest_run() {
        let fx = Fixture::new();
        let recipient = Uuid::now_v7();
        let project = Uuid::now_v7();
        let now = Utc::now();

        fx.directory.add_user(recipient, Some("rowan@example.com"));
        fx.directory.set_prefs(
            recipient,
            RecipientPrefs::with_kinds([EventKind::Comment, EventKind::Status]),
        );

        let recorder = fx.recorder();
        let event_time = now - Duration::minutes(5);
        recorder
            .record(
                recipient,
                project,
                EventPayload::Comment {
                    author: "Ash".into(),
                    text: "Draft uploaded".into(),
                },
                event_time,
            )
            .await
            .unwrap();
        recorder
            .record(
                recipient,
                project,
                EventPayload::Status {
                    from: "In progress".into(),
                    to: "Review".into(),
                },
                event_time + Duration::seconds(30),
            )
            .await
            .unwrap();
        // Disabled kind: never recorded at all
        let task_id = recorder
            .record(
                recipient,
                project,
                EventPayload::Task {
                    title: "Follow up".into(),
                    status: "todo".into(),
                },
                event_time + Duration::minutes(1),
            )
            .await
            .unwrap();
        assert_eq!(task_id, None);

        let summary = fx
            .pipeline(DigestConfig::default())
            .run_once(now)
            .await
            .unwrap();

        assert_eq!(summary.claimed, 2);
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.failed, 0);

        let sent = fx.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "rowan@example.com");
        assert_eq!(sent[0].subject, "2 new updates in your projects");
        assert!(sent[0].text_body.contains("Draft uploaded"));
        assert!(sent[0].text_body.contains("Review"));

        assert_eq!(fx.queue.processed_count(), 2);
        assert_eq!(fx.send_log.last_sent_at(recipient).await.unwrap(), Some(now));
    }

    #[tokio::test]
    async fn test_empty_queue_is_not_an_error() {
        let fx = Fixture::new();
        let summary = fx
            .pipeline(DigestConfig::default())
            .run_once(Utc::now())
            .await
            .unwrap();
        assert_eq!(summary, RunSummary::default());
        assert!(fx.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_mixed_recipients_in_one_run() {
        let fx = Fixture::new();
        let now = Utc::now();
        let sendable = Uuid::now_v7();
        let addressless = Uuid::now_v7();
        let recently_mailed = Uuid::now_v7();

        fx.directory.add_user(sendable, Some("a@example.com"));
        fx.directory.add_user(addressless, None);
        fx.directory.add_user(recently_mailed, Some("b@example.com"));
        fx.send_log
            .record_sent(recently_mailed, now - Duration::minutes(3))
            .await
            .unwrap();

        let recorder = fx.recorder();
        for recipient in [sendable, addressless, recently_mailed] {
            recorder
                .record(
                    recipient,
                    Uuid::now_v7(),
                    EventPayload::Comment {
                        author: "Ash".into(),
                        text: "hello".into(),
                    },
                    now - Duration::minutes(5),
                )
                .await
                .unwrap();
        }

        let summary = fx
            .pipeline(DigestConfig::default())
            .run_once(now)
            .await
            .unwrap();

        assert_eq!(summary.claimed, 3);
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.suppressed, 1);

        let sent = fx.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "a@example.com");

        // The suppressed recipient's event is back in the pool and goes out
        // on a later run
        let later = now + Duration::minutes(15);
        let summary = fx
            .pipeline(DigestConfig::default())
            .run_once(later)
            .await
            .unwrap();
        assert_eq!(summary.claimed, 1);
        assert_eq!(summary.sent, 1);
        assert_eq!(fx.mailer.sent()[1].to, "b@example.com");
    }

    #[tokio::test]
    async fn test_stale_claims_recovered_at_start_of_run() {
        let fx = Fixture::new();
        let recipient = Uuid::now_v7();
        let now = Utc::now();
        fx.directory.add_user(recipient, Some("a@example.com"));

        fx.recorder()
            .record(
                recipient,
                Uuid::now_v7(),
                EventPayload::Comment {
                    author: "Ash".into(),
                    text: "orphaned".into(),
                },
                now - Duration::hours(2),
            )
            .await
            .unwrap();

        // A run an hour ago claimed the event and died before finalizing
        fx.queue
            .claim_batch(now - Duration::hours(1), Duration::minutes(2), 100, "dead-run")
            .await
            .unwrap();

        let summary = fx
            .pipeline(DigestConfig::default())
            .run_once(now)
            .await
            .unwrap();

        assert_eq!(summary.released_stale, 1);
        assert_eq!(summary.claimed, 1);
        assert_eq!(summary.sent, 1);
        assert!(fx.mailer.sent()[0].text_body.contains("orphaned"));
    }

    #[tokio::test]
    async fn test_batch_size_bounds_a_run() {
        let fx = Fixture::new();
        let recipient = Uuid::now_v7();
        let now = Utc::now();
        fx.directory.add_user(recipient, Some("a@example.com"));

        let recorder = fx.recorder();
        for i in 0..5 {
            recorder
                .record(
                    recipient,
                    Uuid::now_v7(),
                    EventPayload::Comment {
                        author: "Ash".into(),
                        text: format!("comment {i}"),
                    },
                    now - Duration::minutes(10),
                )
                .await
                .unwrap();
        }

        let config = DigestConfig::default()
            .with_batch_size(3)
            .with_min_interval(Duration::zero());
        let summary = fx.pipeline(config).run_once(now).await.unwrap();

        assert_eq!(summary.claimed, 3);
        assert_eq!(fx.queue.pending_count(), 2);
    }
}
