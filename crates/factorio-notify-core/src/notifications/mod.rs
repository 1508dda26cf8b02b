//! Notification delivery.
//!
//! Provides:
//! - [`NotificationSink`], the capability the stream watcher delivers events to
//! - [`DiscordWebhook`], a sink posting JSON messages to a Discord webhook

use std::future::Future;

pub mod discord;

pub use discord::{DiscordWebhook, WebhookMessage};

/// Errors that can occur while delivering a notification.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// HTTP client could not be constructed.
    #[error("Webhook client error: {0}")]
    Client(String),

    /// HTTP request to the webhook failed.
    #[error("Webhook request error: {0}")]
    Request(String),

    /// Webhook returned a non-success status code.
    #[error("Webhook API error (status {status}): {body}")]
    ApiError {
        /// HTTP status code returned by the webhook.
        status: u16,
        /// Response body from the webhook.
        body: String,
    },
}

/// Somewhere events can be delivered to.
///
/// A failed delivery is reported to the caller and nothing else; sinks do
/// not retry.
pub trait NotificationSink: Send + Sync {
    /// Deliver `content` on behalf of `sender`.
    fn deliver(
        &self,
        sender: &str,
        content: &str,
    ) -> impl Future<Output = Result<(), NotificationError>> + Send;
}
