use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SlackRelayError {
    #[error("slack webhook is not configured")]
    NotConfigured,
    #[error("slack webhook responded with status {0}")]
    Status(u16),
    #[error("{0}")]
    Request(#[from] reqwest::Error),
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
}

/// Forwards alert text to an incoming-webhook URL.
#[derive(Clone)]
pub struct SlackRelay {
    http: Client,
    webhook_url: Option<String>,
}

impl SlackRelay {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            http: Client::new(),
            webhook_url,
        }
    }

    pub async fn send(&self, text: &str) -> Result<(), SlackRelayError> {
        let webhook_url = self
            .webhook_url
            .as_deref()
            .ok_or(SlackRelayError::NotConfigured)?;
        let response = self
            .http
            .post(webhook_url)
            .json(&WebhookPayload { text })
            .send()
            .await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(SlackRelayError::Status(status.as_u16()));
        }
        info!(chars = text.len(), "slack: message relayed");
        Ok(())
    }
}
