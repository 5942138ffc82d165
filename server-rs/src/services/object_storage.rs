use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};

use crate::config::StorageConfig;
use crate::ledger::{LedgerError, LedgerResult};

/// Blob store for league images. Returns the public URL of the stored object.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, bytes: Bytes, content_type: &str) -> LedgerResult<String>;
}

pub fn extension_for(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/png" => Some("png"),
        "image/jpeg" => Some("jpg"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

/// Content-addressed object name: identical uploads land on the same key.
pub fn object_key(bytes: &[u8], content_type: &str) -> Option<String> {
    let ext = extension_for(content_type)?;
    let digest = hex::encode(Sha256::digest(bytes));
    Some(format!("{digest}.{ext}"))
}

/// PUTs objects to an S3-compatible bucket endpoint with a bearer key.
#[derive(Clone)]
pub struct HttpObjectStorage {
    base_url: String,
    public_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpObjectStorage {
    pub fn new(config: &StorageConfig, timeout: Duration) -> Option<Self> {
        if config.base_url.is_empty() {
            return None;
        }
        let client = reqwest::Client::builder().timeout(timeout).build().ok()?;
        let public_url = if config.public_url.is_empty() {
            config.base_url.clone()
        } else {
            config.public_url.clone()
        };
        Some(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            public_url: public_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client,
        })
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn upload(&self, bytes: Bytes, content_type: &str) -> LedgerResult<String> {
        let key = object_key(&bytes, content_type)
            .ok_or_else(|| LedgerError::validation("Unsupported image type"))?;
        let url = format!("{}/{}", self.base_url, key);
        let size = bytes.len();

        let resp = self
            .client
            .put(&url)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| LedgerError::Internal(format!("Object storage request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(LedgerError::Internal(format!(
                "Object storage rejected upload: {status}"
            )));
        }
        tracing::info!(%key, size, "image uploaded");
        Ok(format!("{}/{}", self.public_url, key))
    }
}

/// Stand-in used when no bucket is configured.
pub struct NoopStorage;

#[async_trait]
impl ObjectStorage for NoopStorage {
    async fn upload(&self, _bytes: Bytes, _content_type: &str) -> LedgerResult<String> {
        Err(LedgerError::Unavailable("Object storage"))
    }
}
