//! Test doubles for the outbound transport

use async_trait::async_trait;
use parking_lot::Mutex;

use atrium_core::{Mailer, NotifyError, Result};

/// One message handed to the recording mailer
#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

/// Mailer that records every send and always succeeds
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentEmail>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<()> {
        self.sent.lock().push(SentEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            text_body: text_body.to_string(),
            html_body: html_body.to_string(),
        });
        Ok(())
    }
}

/// Mailer that always fails
pub struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, _to: &str, _subject: &str, _text: &str, _html: &str) -> Result<()> {
        Err(NotifyError::transport("simulated provider outage"))
    }
}
