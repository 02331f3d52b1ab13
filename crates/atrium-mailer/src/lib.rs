// Email transport for the digest pipeline
//
// Implements the Mailer trait from atrium-core for the portal's hosted
// email provider.

pub mod client;
pub mod types;

pub use client::HttpMailer;
pub use types::{SendMessageRequest, SendMessageResponse};
