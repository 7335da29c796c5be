//! Outbound email collaborator.
//!
//! Delivery mechanics (SMTP, templating) live behind this seam; the auth
//! service only decides which message to send and with what data.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, template: &str, subject: &str, to: &str, data: Value);
}

/// Logs outbound messages instead of delivering them. Used in development
/// and as the default when no SMTP transport is configured.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, template: &str, subject: &str, to: &str, _data: Value) {
        info!(template, subject, to, "email dispatched");
    }
}
