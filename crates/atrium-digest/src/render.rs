//! Digest message rendering
//!
//! One line per collapsed event, in both plain text and a minimal HTML list.
//! The timezone only affects the human-readable timestamps; scheduling runs
//! entirely on UTC.

use chrono::{FixedOffset, Offset, Utc};

use atrium_core::{EventPayload, EventRecord};

/// A rendered digest ready for the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

/// Renders per-recipient activity summaries
#[derive(Debug, Clone)]
pub struct DigestRenderer {
    tz: FixedOffset,
}

impl DigestRenderer {
    /// Render timestamps in the given fixed offset
    pub fn new(tz: FixedOffset) -> Self {
        Self { tz }
    }

    /// Render timestamps in UTC
    pub fn utc() -> Self {
        Self { tz: Utc.fix() }
    }

    /// Render a digest from one recipient's collapsed events
    pub fn render(&self, events: &[EventRecord]) -> Digest {
        let subject = if events.len() == 1 {
            "1 new update in your projects".to_string()
        } else {
            format!("{} new updates in your projects", events.len())
        };

        let mut text_body = String::from("Here's what happened recently:\n\n");
        let mut html_body = String::from("<p>Here's what happened recently:</p>\n<ul>\n");
        for event in events {
            let line = self.line(event);
            text_body.push_str("  - ");
            text_body.push_str(&line);
            text_body.push('\n');
            html_body.push_str("  <li>");
            html_body.push_str(&escape_html(&line));
            html_body.push_str("</li>\n");
        }
        html_body.push_str("</ul>\n");

        Digest {
            subject,
            text_body,
            html_body,
        }
    }

    /// One human-readable line for a single event
    pub fn line(&self, event: &EventRecord) -> String {
        let when = event
            .created_at
            .with_timezone(&self.tz)
            .format("%b %-d, %H:%M");
        let subject_ref = short_ref(event.subject_id);

        match &event.payload {
            EventPayload::Comment { author, text } => {
                format!("[{when}] {author} commented on project {subject_ref}: \"{text}\"")
            }
            EventPayload::Status { from, to } => {
                format!("[{when}] Project {subject_ref} moved from \"{from}\" to \"{to}\"")
            }
            EventPayload::Task { title, status } => {
                format!("[{when}] New task \"{title}\" ({status}) on project {subject_ref}")
            }
        }
    }
}

/// Short reference form of a subject id for message bodies
fn short_ref(id: uuid::Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
