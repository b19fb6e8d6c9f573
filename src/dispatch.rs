use crate::discord::WebhookApi;
use crate::notification::NotificationDocument;
use crate::ratelimit::SlidingWindow;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

pub const DEFAULT_CALLS: usize = 5;

const ACCEPTED: [StatusCode; 2] = [StatusCode::OK, StatusCode::NO_CONTENT];

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("webhook answered {status} {reason}")]
    Rejected { status: u16, reason: String },
    #[error("webhook unreachable: {0:#}")]
    Transport(anyhow::Error),
}

/// Sends notifications under the webhook quota. Delivery is attempted once.
pub struct Dispatcher {
    webhook: Arc<dyn WebhookApi>,
    window: SlidingWindow,
}

impl Dispatcher {
    pub fn new(webhook: Arc<dyn WebhookApi>, calls: usize, period: Duration) -> Self {
        Self {
            webhook,
            window: SlidingWindow::new(calls, period),
        }
    }

    /// `calls` per `60 * calls` seconds.
    pub fn with_default_period(webhook: Arc<dyn WebhookApi>, calls: usize) -> Self {
        Self::new(webhook, calls, default_period(calls))
    }

    pub async fn send(&self, document: &NotificationDocument) -> Result<(), DeliveryError> {
        self.window.acquire().await;
        let status = match self.webhook.post(document).await {
            Ok(status) => status,
            Err(e) => {
                error!("Failed to deliver '{}': {:#}", document.title(), e);
                return Err(DeliveryError::Transport(e));
            }
        };
        if ACCEPTED.contains(&status) {
            debug!("Delivered '{}' ({})", document.title(), status);
            return Ok(());
        }
        let err = DeliveryError::Rejected {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("unknown").to_string(),
        };
        error!("Failed to deliver '{}': {}", document.title(), err);
        Err(err)
    }
}

pub fn default_period(calls: usize) -> Duration {
    Duration::from_secs(60 * calls.max(1) as u64)
}
