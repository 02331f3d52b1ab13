// Wire types for the email provider API

use serde::{Deserialize, Serialize};

/// Request body for the provider's send endpoint
#[derive(Debug, Clone, Serialize)]
pub struct SendMessageRequest {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Response body from a successful send
///
/// The provider returns a message id for its own logs; the pipeline records
/// it at debug level and otherwise ignores it (no receipt tracking).
#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageResponse {
    #[serde(default)]
    pub id: Option<String>,
}
