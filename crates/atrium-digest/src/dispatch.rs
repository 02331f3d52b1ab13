//! Rate limiting and dispatch
//!
//! The dispatcher owns the tail of an event's lifecycle. It receives one
//! recipient's claimed batch and either finalizes it (sent, or terminally
//! skipped for want of an address), releases it (rate-limit suppression), or
//! leaves it claimed for the stale sweep to recover (transport failure).
//! Finalize and release always cover the whole batch: a send that did not
//! complete never marks a subset processed.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use atrium_core::{
    Cadence, EventQueue, EventRecord, Mailer, Result, SendLog, UserDirectory, SKIP_NO_ADDRESS,
};

use crate::batch::collapse;
use crate::render::DigestRenderer;

/// What happened to one recipient's batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestOutcome {
    /// Digest sent; the whole batch is processed and the send log updated
    Sent { item_count: usize },

    /// Too soon since the last digest; the batch went back to unclaimed
    Suppressed,

    /// Recipient has no address; the batch is terminally skipped
    Skipped,

    /// Transport error; the batch stays claimed until the lease lapses
    Failed,
}

/// Sends one digest per recipient, enforcing the minimum resend interval
pub struct Dispatcher {
    queue: Arc<dyn EventQueue>,
    directory: Arc<dyn UserDirectory>,
    send_log: Arc<dyn SendLog>,
    mailer: Arc<dyn Mailer>,
    renderer: DigestRenderer,
    min_interval: Duration,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<dyn EventQueue>,
        directory: Arc<dyn UserDirectory>,
        send_log: Arc<dyn SendLog>,
        mailer: Arc<dyn Mailer>,
        renderer: DigestRenderer,
        min_interval: Duration,
    ) -> Self {
        Self {
            queue,
            directory,
            send_log,
            mailer,
            renderer,
            min_interval,
        }
    }

    /// Dispatch one recipient's claimed batch
    ///
    /// `events` is the raw (uncollapsed) batch; duplicates are collapsed for
    /// the message but every underlying record is finalized on success.
    pub async fn try_send(
        &self,
        now: DateTime<Utc>,
        recipient_id: Uuid,
        events: Vec<EventRecord>,
    ) -> Result<DigestOutcome> {
        let ids: Vec<Uuid> = events.iter().map(|e| e.id).collect();

        let Some(address) = self.directory.email(recipient_id).await? else {
            // Retrying cannot conjure an address; skip terminally so these
            // events never surface in a later batch
            info!(%recipient_id, count = ids.len(), "recipient has no address, skipping batch");
            self.queue
                .finalize(&ids, now, Some(SKIP_NO_ADDRESS))
                .await?;
            return Ok(DigestOutcome::Skipped);
        };

        let prefs = self.directory.prefs(recipient_id).await?;
        if prefs.cadence == Cadence::Periodic {
            if let Some(last_sent) = self.send_log.last_sent_at(recipient_id).await? {
                if now - last_sent < self.min_interval {
                    debug!(%recipient_id, %last_sent, "digest suppressed by resend interval");
                    self.queue.release(&ids).await?;
                    return Ok(DigestOutcome::Suppressed);
                }
            }
        }

        let items = collapse(events);
        let digest = self.renderer.render(&items);

        match self
            .mailer
            .send(&address, &digest.subject, &digest.text_body, &digest.html_body)
            .await
        {
            Ok(()) => {
                self.queue.finalize(&ids, now, None).await?;
                self.send_log.record_sent(recipient_id, now).await?;
                info!(%recipient_id, items = items.len(), raw = ids.len(), "digest sent");
                Ok(DigestOutcome::Sent {
                    item_count: items.len(),
                })
            }
            Err(e) => {
                // Events stay claimed; the stale-lease sweep will release
                // them for a retry on a later run
                warn!(%recipient_id, error = %e, "transport failed, batch left claimed");
                Ok(DigestOutcome::Failed)
            }
        }
    }
}
