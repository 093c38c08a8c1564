//! Outbound notification transports.
//!
//! The alert dispatcher only sees the two traits below; SMTP and HTTP are the
//! production implementations, tests substitute recording fakes.

use crate::error::NotifyError;
use async_trait::async_trait;

pub mod email;
pub mod webhook;

pub use email::{DisabledMailer, SmtpMailer};
pub use webhook::HttpWebhookSender;

#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, html: &str) -> Result<(), NotifyError>;
}

#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn send_webhook(&self, url: &str, payload: &serde_json::Value)
    -> Result<(), NotifyError>;
}
