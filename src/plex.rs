use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;

#[async_trait]
pub trait MediaServerApi: Send + Sync {
    /// Fetches raw artwork bytes for a server-relative path.
    async fn fetch_artwork(&self, path: &str) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone)]
pub struct PlexClient {
    client: Client,
    base_url: String,
    token: String,
}

impl PlexClient {
    pub fn new(client: Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl MediaServerApi for PlexClient {
    async fn fetch_artwork(&self, path: &str) -> Result<Vec<u8>> {
        let url = format!(
            "{}{}?X-Plex-Token={}",
            self.base_url,
            path,
            urlencoding::encode(&self.token)
        );
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .context("Plex artwork request failed")?;
        let status = res.status();
        if status != reqwest::StatusCode::OK {
            return Err(anyhow!("Plex artwork HTTP error (status {})", status));
        }
        let bytes = res
            .bytes()
            .await
            .context("Failed to read Plex artwork body")?;
        Ok(bytes.to_vec())
    }
}

/// Drops a trailing numeric version segment and appends `now_secs`, so Plex
/// renders a fresh transcode instead of a cached one.
pub fn cache_busted_path(artwork_path: &str, now_secs: i64) -> String {
    let base = match artwork_path.rsplit_once('/') {
        Some((head, last)) if !last.is_empty() && last.chars().all(|c| c.is_ascii_digit()) => head,
        _ => artwork_path,
    };
    format!("{}/{}", base.trim_end_matches('/'), now_secs)
}

/// `/library/metadata/<key>/thumb/<version>` -> `<key>`
pub fn rating_key(artwork_path: &str) -> Option<&str> {
    artwork_path.split('/').nth(3).filter(|s| !s.is_empty())
}
