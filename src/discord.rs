use crate::notification::NotificationDocument;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};

#[async_trait]
pub trait WebhookApi: Send + Sync {
    /// Posts the document and reports the status the webhook answered with.
    async fn post(&self, document: &NotificationDocument) -> Result<StatusCode>;
}

#[derive(Debug, Clone)]
pub struct DiscordClient {
    client: Client,
    webhook_url: String,
}

impl DiscordClient {
    pub fn new(client: Client, webhook_url: impl Into<String>) -> Self {
        Self {
            client,
            webhook_url: webhook_url.into(),
        }
    }
}

#[async_trait]
impl WebhookApi for DiscordClient {
    async fn post(&self, document: &NotificationDocument) -> Result<StatusCode> {
        let res = self
            .client
            .post(&self.webhook_url)
            .json(document)
            .send()
            .await
            .context("Discord webhook request failed")?;
        Ok(res.status())
    }
}
