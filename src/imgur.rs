use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::Deserialize;

const IMGUR_BASE: &str = "https://api.imgur.com/3";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub link: String,
    pub delete_hash: String,
}

#[async_trait]
pub trait ImageHostApi: Send + Sync {
    async fn upload(&self, image: &[u8], title: &str, name: &str) -> Result<UploadedImage>;
    async fn delete(&self, delete_hash: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct ImgurClient {
    client: Client,
    client_id: String,
}

impl ImgurClient {
    pub fn new(client: Client, client_id: impl Into<String>) -> Self {
        Self {
            client,
            client_id: client_id.into(),
        }
    }

    fn authorization(&self) -> String {
        format!("Client-ID {}", self.client_id)
    }
}

#[async_trait]
impl ImageHostApi for ImgurClient {
    async fn upload(&self, image: &[u8], title: &str, name: &str) -> Result<UploadedImage> {
        #[derive(Deserialize)]
        struct UploadData {
            #[serde(default)]
            link: String,
            #[serde(default)]
            deletehash: String,
        }
        #[derive(Deserialize)]
        struct UploadResponse {
            data: UploadData,
        }

        let encoded = BASE64.encode(image);
        let form = [
            ("image", encoded.as_str()),
            ("title", title),
            ("name", name),
            ("type", "base64"),
        ];
        let res = self
            .client
            .post(format!("{IMGUR_BASE}/image"))
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .form(&form)
            .send()
            .await
            .context("Imgur upload request failed")?;

        let status = res.status();
        let bytes = res.bytes().await.context("Failed to read Imgur upload body")?;
        if status != reqwest::StatusCode::OK {
            return Err(anyhow!(
                "Imgur upload HTTP error (status {}): {}",
                status,
                String::from_utf8_lossy(&bytes)
            ));
        }
        let parsed: UploadResponse =
            serde_json::from_slice(&bytes).context("Failed to parse Imgur upload JSON")?;
        Ok(UploadedImage {
            link: force_https(&parsed.data.link),
            delete_hash: parsed.data.deletehash,
        })
    }

    async fn delete(&self, delete_hash: &str) -> Result<()> {
        let res = self
            .client
            .delete(format!("{IMGUR_BASE}/image/{delete_hash}"))
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .send()
            .await
            .context("Imgur delete request failed")?;
        let status = res.status();
        if status != reqwest::StatusCode::OK {
            return Err(anyhow!("Imgur delete HTTP error (status {})", status));
        }
        Ok(())
    }
}

fn force_https(link: &str) -> String {
    match link.strip_prefix("http://") {
        Some(rest) => format!("https://{rest}"),
        None => link.to_string(),
    }
}
