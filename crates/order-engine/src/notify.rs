//! Alert delivery.
//!
//! Sinks are fire-and-forget from the engine's point of view: callers go
//! through [`notify_quietly`], which logs a failed delivery and moves on.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

use optdesk_core::{Alert, NotificationSink, NotifierConfig, NotifyError};

/// Writes alerts to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        info!(alert = %alert, "Alert");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    chat_id: Option<&'a str>,
    text: String,
}

/// POSTs `{chat_id?, text}` JSON to a chat-bot webhook.
pub struct WebhookSink {
    client: Client,
    url: String,
    chat_id: Option<String>,
}

impl WebhookSink {
    /// # Errors
    ///
    /// Returns [`NotifyError::Transport`] if the HTTP client cannot be built.
    pub fn new(
        url: impl Into<String>,
        chat_id: Option<String>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            chat_id,
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        let body = WebhookMessage {
            chat_id: self.chat_id.as_deref(),
            text: alert.to_string(),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected {
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

/// Builds the sink described by `config`: a webhook when a URL is set,
/// otherwise the log.
///
/// # Errors
///
/// Returns [`NotifyError::Transport`] if the webhook client cannot be built.
pub fn sink_from_config(config: &NotifierConfig) -> Result<Arc<dyn NotificationSink>, NotifyError> {
    match &config.webhook_url {
        Some(url) if !url.trim().is_empty() => Ok(Arc::new(WebhookSink::new(
            url.clone(),
            config.chat_id.clone(),
            Duration::from_secs(config.timeout_secs),
        )?)),
        _ => Ok(Arc::new(LogSink)),
    }
}

/// Delivers `alert`, logging instead of failing.
pub async fn notify_quietly(sink: &dyn NotificationSink, alert: Alert) {
    if let Err(e) = sink.notify(&alert).await {
        warn!(error = %e, alert = %alert, "Notification failed");
    }
}
