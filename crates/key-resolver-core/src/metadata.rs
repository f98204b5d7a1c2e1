//! Account nonce lookup against the metadata service

use crate::types::{AccountNonce, AggregatedPublicKey};
use crate::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, instrument};

/// Source of the per-account nonce
#[async_trait]
pub trait MetadataClient: Send + Sync {
    /// Hex nonce stored for `public_key`; empty when none is stored
    async fn get_nonce(&self, public_key: &AggregatedPublicKey) -> Result<String>;
}

#[cfg(feature = "http")]
#[derive(Debug, serde::Serialize)]
struct NonceRequest {
    #[serde(rename = "pub_key_X")]
    pub_key_x: String,
    #[serde(rename = "pub_key_Y")]
    pub_key_y: String,
}

#[cfg(feature = "http")]
#[derive(Debug, serde::Deserialize)]
struct NonceReply {
    #[serde(default)]
    message: String,
}

/// Fetch and parse the nonce for `public_key`
#[instrument(skip(client, public_key), fields(pub_key_x = %public_key.x_hex()))]
pub async fn fetch_nonce<M: MetadataClient + ?Sized>(
    client: &M,
    public_key: &AggregatedPublicKey,
) -> Result<AccountNonce> {
    let raw = client.get_nonce(public_key).await?;
    let nonce = AccountNonce::from_hex(&raw)?;
    debug!(zero = nonce.is_zero(), "Nonce resolved");
    Ok(nonce)
}

/// Metadata service reached over HTTP
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpMetadataClient {
    url: String,
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpMetadataClient {
    pub fn new(url: impl Into<String>, request_timeout: std::time::Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| crate::Error::Metadata(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl MetadataClient for HttpMetadataClient {
    async fn get_nonce(&self, public_key: &AggregatedPublicKey) -> Result<String> {
        let body = NonceRequest {
            pub_key_x: public_key.x_hex(),
            pub_key_y: public_key.y_hex(),
        };
        let response = self
            .client
            .post(format!("{}/get", self.url.trim_end_matches('/')))
            .json(&body)
            .send()
            .await
            .map_err(|e| crate::Error::Metadata(format!("Nonce request failed: {}", e)))?;

        let reply: NonceReply = response
            .json()
            .await
            .map_err(|e| crate::Error::Metadata(format!("Failed to parse nonce reply: {}", e)))?;
        Ok(reply.message)
    }
}

/// In-memory metadata store
#[derive(Debug, Clone, Default)]
pub struct MemoryMetadata {
    nonces: Arc<DashMap<AggregatedPublicKey, String>>,
    requests: Arc<AtomicUsize>,
}

impl MemoryMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_nonce(&self, public_key: AggregatedPublicKey, nonce: impl Into<String>) {
        self.nonces.insert(public_key, nonce.into());
    }

    /// Number of nonce requests served
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataClient for MemoryMetadata {
    async fn get_nonce(&self, public_key: &AggregatedPublicKey) -> Result<String> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .nonces
            .get(public_key)
            .map(|nonce| nonce.clone())
            .unwrap_or_default())
    }
}
