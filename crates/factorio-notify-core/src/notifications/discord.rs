//! Discord webhook client.
//!
//! Posts `{"username": ..., "content": ...}` to a webhook URL. Delivery is
//! attempted exactly once per call.

use serde::Serialize;
use tracing::{debug, warn};

use super::{NotificationError, NotificationSink};

/// JSON body accepted by Discord's "execute webhook" endpoint.
#[derive(Debug, Serialize)]
pub struct WebhookMessage<'a> {
    /// Display name the message is posted under.
    pub username: &'a str,

    /// Message text.
    pub content: &'a str,
}

/// Client for a single Discord webhook URL.
#[derive(Debug, Clone)]
pub struct DiscordWebhook {
    /// The reqwest HTTP client.
    http: reqwest::Client,

    /// Webhook URL, including its id and token.
    url: reqwest::Url,
}

impl DiscordWebhook {
    /// Create a webhook client for `url`.
    ///
    /// Installs the `ring` crypto provider for rustls if no provider has been
    /// installed yet.
    pub fn new(url: reqwest::Url) -> Result<Self, NotificationError> {
        // No-op if a provider is already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| NotificationError::Client(e.to_string()))?;

        Ok(Self::with_client(url, http))
    }

    /// Create a webhook client from a pre-built HTTP client.
    pub const fn with_client(url: reqwest::Url, http: reqwest::Client) -> Self {
        Self { http, url }
    }

    /// Post one message to the webhook.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError::Request` if the HTTP request fails, or
    /// `NotificationError::ApiError` if the webhook returns a non-2xx status.
    pub async fn send(&self, message: &WebhookMessage<'_>) -> Result<(), NotificationError> {
        let response = self
            .http
            .post(self.url.clone())
            .json(message)
            .send()
            .await
            .map_err(|e| NotificationError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(status = status.as_u16(), "Webhook message sent");
            Ok(())
        } else {
            let status_code = status.as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            warn!(status = status_code, body = %body, "Webhook returned error");
            Err(NotificationError::ApiError {
                status: status_code,
                body,
            })
        }
    }
}

impl NotificationSink for DiscordWebhook {
    async fn deliver(&self, sender: &str, content: &str) -> Result<(), NotificationError> {
        self.send(&WebhookMessage {
            username: sender,
            content,
        })
        .await
    }
}
