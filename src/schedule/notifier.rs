//! Alarm delivery strategies.
//!
//! The scheduler only knows the [`Notifier`] trait. Which transport sits
//! behind it is picked once at start-up from configuration.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::config::{Config, NotifierKind};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("gateway rejected notification with status {0}")]
    Rejected(u16),
    #[error("dispatch did not finish within {0:?}")]
    Timeout(Duration),
    #[error("notifier misconfigured: {0}")]
    Config(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), DispatchError>;

    fn name(&self) -> &str;
}

/// Writes the alarm to the log and reports success.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), DispatchError> {
        info!(recipient, subject, body, "alarm delivered");
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

#[derive(Debug, Serialize)]
struct PushMessage<'a> {
    recipient: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// Posts alarms as JSON to a push gateway. Any non-2xx answer is a failure.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), DispatchError> {
        let response = self
            .client
            .post(&self.url)
            .json(&PushMessage {
                recipient,
                subject,
                body,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::Rejected(status.as_u16()));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

pub fn build_notifier(config: &Config) -> Result<Arc<dyn Notifier>, DispatchError> {
    match config.notifier {
        NotifierKind::Log => Ok(Arc::new(LogNotifier)),
        NotifierKind::Webhook => {
            let url = config
                .push_webhook_url
                .clone()
                .ok_or_else(|| DispatchError::Config("PUSH_WEBHOOK_URL is not set".into()))?;
            Ok(Arc::new(WebhookNotifier::new(url, config.dispatch_timeout())?))
        }
    }
}
