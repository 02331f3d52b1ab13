// HTTP client for the hosted email provider

use anyhow::{Context, Result as AnyResult};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use atrium_core::{Mailer, NotifyError, Result};

use crate::types::{SendMessageRequest, SendMessageResponse};

/// Email provider client
///
/// Posts one JSON message per digest to the provider's send endpoint with a
/// bearer key.
pub struct HttpMailer {
    client: Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl HttpMailer {
    /// Create a client from environment variables
    ///
    /// Requires MAILER_API_URL, MAILER_API_KEY, and MAILER_FROM.
    pub fn from_env() -> AnyResult<Self> {
        let api_url =
            std::env::var("MAILER_API_URL").context("MAILER_API_URL environment variable not set")?;
        let api_key =
            std::env::var("MAILER_API_KEY").context("MAILER_API_KEY environment variable not set")?;
        let from =
            std::env::var("MAILER_FROM").context("MAILER_FROM environment variable not set")?;
        Ok(Self::new(api_url, api_key, from))
    }

    /// Create a client with explicit settings
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.into(),
            api_key: api_key.into(),
            from: from.into(),
        }
    }

    fn send_url(&self) -> String {
        format!("{}/messages", self.api_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<()> {
        let request = SendMessageRequest {
            from: self.from.clone(),
            to: to.to_string(),
            subject: subject.to_string(),
            text: text_body.to_string(),
            html: html_body.to_string(),
        };

        let response = self
            .client
            .post(self.send_url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| NotifyError::transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::transport(format!(
                "provider returned {status}: {body}"
            )));
        }

        let body: SendMessageResponse = response
            .json()
            .await
            .map_err(|e| NotifyError::transport(e.to_string()))?;
        debug!(to, message_id = ?body.id, "message accepted by provider");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_send_posts_message_with_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(bearer_token("test-key"))
            .and(body_partial_json(serde_json::json!({
                "from": "updates@portal.example.com",
                "to": "client@example.com",
                "subject": "2 new updates in your projects",
            })))
            .respond_with(ResponseTemplate::new(202).set_body_json(serde_json::json!({
                "id": "msg_01"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mailer = HttpMailer::new(server.uri(), "test-key", "updates@portal.example.com");
        mailer
            .send(
                "client@example.com",
                "2 new updates in your projects",
                "text",
                "<p>html</p>",
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_provider_error_is_a_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let mailer = HttpMailer::new(server.uri(), "test-key", "updates@portal.example.com");
        let err = mailer
            .send("client@example.com", "subject", "text", "html")
            .await
            .unwrap_err();

        assert!(matches!(err, NotifyError::Transport(_)));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_missing_response_id_is_tolerated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let mailer = HttpMailer::new(server.uri(), "test-key", "updates@portal.example.com");
        mailer
            .send("client@example.com", "subject", "text", "html")
            .await
            .unwrap();
    }
}
