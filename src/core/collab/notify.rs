use crate::core::error::TaskError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const WEBHOOK_TIMEOUT_SECS: u64 = 15;

/// Rendered message addressed to a destination (an email address, a channel, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Notification {
    pub fn new(
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Delivers notifications on behalf of terminal tasks.
#[async_trait]
pub trait NotificationSink: Send + Sync + 'static {
    async fn send(&self, notification: &Notification) -> Result<(), TaskError>;
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Default, Clone)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, notification: &Notification) -> Result<(), TaskError> {
        tracing::info!(
            to = %notification.to,
            subject = %notification.subject,
            bytes = notification.body.len(),
            "notification (log sink)"
        );
        tracing::debug!(body = %notification.body, "notification body");
        Ok(())
    }
}

/// POSTs notifications as JSON to a relay endpoint (mail gateway, chat hook, ...).
#[derive(Clone)]
pub struct WebhookSink {
    http: reqwest::Client,
    url: reqwest::Url,
    from: Option<String>,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<&'a str>,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

impl WebhookSink {
    pub fn new(url: reqwest::Url, from: Option<String>) -> Result<Self, TaskError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
            .build()?;
        Ok(Self { http, url, from })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn send(&self, notification: &Notification) -> Result<(), TaskError> {
        let payload = WebhookPayload {
            from: self.from.as_deref(),
            to: &notification.to,
            subject: &notification.subject,
            html: &notification.body,
        };
        let response = self
            .http
            .post(self.url.clone())
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(
                TaskError::new(format!("notification relay answered {}", status))
                    .with_code("NOTIFY-001")
                    .with_context("to", notification.to.clone()),
            );
        }
        tracing::info!(to = %notification.to, subject = %notification.subject, "notification delivered");
        Ok(())
    }
}

/// Records notifications in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl NotificationSink for MemorySink {
    async fn send(&self, notification: &Notification) -> Result<(), TaskError> {
        let mut guard = self
            .sent
            .lock()
            .map_err(|_| TaskError::new("memory sink poisoned").with_code("NOTIFY-002"))?;
        guard.push(notification.clone());
        Ok(())
    }
}
