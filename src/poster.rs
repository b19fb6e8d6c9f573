//! Owns the single "current poster" re-hosted on the image service.
//!
//! Only one poster is kept online at a time: before a new one goes up the
//! previous upload is deleted. The slot lock is held for the whole
//! evict/fetch/upload sequence so concurrent flushes publish one at a time.
use crate::imgur::ImageHostApi;
use crate::plex::{self, MediaServerApi};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PosterSlot {
    pub current_url: Option<String>,
    pub delete_token: Option<String>,
}

pub struct PosterManager {
    media: Arc<dyn MediaServerApi>,
    images: Arc<dyn ImageHostApi>,
    slot: Mutex<PosterSlot>,
}

impl PosterManager {
    pub fn new(media: Arc<dyn MediaServerApi>, images: Arc<dyn ImageHostApi>) -> Self {
        Self {
            media,
            images,
            slot: Mutex::new(PosterSlot::default()),
        }
    }

    /// Re-hosts the artwork behind `artwork_path` and returns its public URL,
    /// or `None` when no poster could be published.
    pub async fn publish(&self, artwork_path: &str, title: &str) -> Option<String> {
        let mut slot = self.slot.lock().await;

        let previous = std::mem::take(&mut *slot);
        if let Some(hash) = previous.delete_token.as_deref() {
            match self.images.delete(hash).await {
                Ok(()) => debug!(
                    "Deleted previous poster {}",
                    previous.current_url.as_deref().unwrap_or(hash)
                ),
                Err(e) => warn!("Failed to delete previous poster, leaving it behind: {:#}", e),
            }
        }

        let path = plex::cache_busted_path(artwork_path, Utc::now().timestamp());
        let bytes = match self.media.fetch_artwork(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Failed to fetch artwork for '{}': {:#}", title, e);
                return None;
            }
        };

        let key = plex::rating_key(artwork_path).unwrap_or("poster");
        let name = format!("{key}.png");
        match self.images.upload(&bytes, title, &name).await {
            Ok(uploaded) => {
                debug!("Image '{}' ({}) uploaded to Imgur", title, key);
                *slot = PosterSlot {
                    current_url: Some(uploaded.link.clone()),
                    delete_token: Some(uploaded.delete_hash),
                };
                Some(uploaded.link)
            }
            Err(e) => {
                error!("Unable to upload image '{}' ({}): {:#}", title, key, e);
                None
            }
        }
    }

    pub async fn current(&self) -> PosterSlot {
        self.slot.lock().await.clone()
    }
}
