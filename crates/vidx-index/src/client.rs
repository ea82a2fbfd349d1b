//! Pinecone data-plane HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use vidx_models::Namespace;

use crate::error::{IndexError, IndexResult};
use crate::types::{DeleteRequest, UpsertRequest, UpsertResponse, VectorRecord};

/// Configuration for the Pinecone client.
#[derive(Debug, Clone)]
pub struct PineconeConfig {
    /// Index data-plane host, e.g. `https://idx-abc123.svc.pinecone.io`
    pub index_host: String,
    /// API key sent in the `Api-Key` header
    pub api_key: String,
    /// Request timeout
    pub timeout: Duration,
    /// Max retries for transient failures
    pub max_retries: u32,
}

impl PineconeConfig {
    /// Create config from environment variables.
    pub fn from_env() -> IndexResult<Self> {
        Ok(Self {
            index_host: std::env::var("PINECONE_INDEX_HOST")
                .map_err(|_| IndexError::config_error("PINECONE_INDEX_HOST not set"))?,
            api_key: std::env::var("PINECONE_API_KEY")
                .map_err(|_| IndexError::config_error("PINECONE_API_KEY not set"))?,
            timeout: Duration::from_secs(
                std::env::var("PINECONE_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            max_retries: std::env::var("PINECONE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
        })
    }
}

/// Chunk-level vector storage.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Store one chunk's vector with its flattened metadata.
    async fn upsert(
        &self,
        chunk_id: &str,
        vector: &[f32],
        namespace: &Namespace,
        metadata: Map<String, Value>,
    ) -> IndexResult<()>;

    /// Remove a set of chunk vectors. An empty id list is a no-op.
    async fn delete_many(&self, chunk_ids: &[String], namespace: &Namespace) -> IndexResult<()>;
}

/// [`VectorIndex`] backed by a Pinecone index.
pub struct PineconeIndex {
    http: Client,
    config: PineconeConfig,
}

impl PineconeIndex {
    /// Create a new Pinecone client.
    pub fn new(config: PineconeConfig) -> IndexResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Api-Key",
            HeaderValue::from_str(&config.api_key)
                .map_err(|_| IndexError::config_error("invalid Pinecone API key"))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(IndexError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> IndexResult<Self> {
        Self::new(PineconeConfig::from_env()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.index_host.trim_end_matches('/'), path)
    }

    /// Execute with retry logic for transient failures.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> IndexResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = IndexResult<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(
                        "index request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(IndexError::InvalidResponse("Unknown error".to_string())))
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(
        &self,
        chunk_id: &str,
        vector: &[f32],
        namespace: &Namespace,
        metadata: Map<String, Value>,
    ) -> IndexResult<()> {
        let request = UpsertRequest {
            vectors: vec![VectorRecord {
                id: chunk_id.to_string(),
                values: vector.to_vec(),
                metadata,
            }],
            namespace: namespace.as_str().to_string(),
        };

        let url = self.endpoint("/vectors/upsert");
        debug!(chunk_id, namespace = namespace.as_str(), "upserting vector");

        let response = self
            .with_retry(|| async {
                self.http
                    .post(&url)
                    .json(&request)
                    .send()
                    .await
                    .map_err(IndexError::Network)
            })
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(IndexError::UpsertFailed(format!(
                "index returned {}: {}",
                status, body
            )));
        }

        let parsed: UpsertResponse = response.json().await?;
        if parsed.upserted_count == 0 {
            return Err(IndexError::UpsertFailed(format!(
                "index reported zero upserted vectors for {}",
                chunk_id
            )));
        }
        Ok(())
    }

    async fn delete_many(&self, chunk_ids: &[String], namespace: &Namespace) -> IndexResult<()> {
        if chunk_ids.is_empty() {
            return Ok(());
        }

        let request = DeleteRequest {
            ids: chunk_ids.to_vec(),
            namespace: namespace.as_str().to_string(),
        };

        let url = self.endpoint("/vectors/delete");
        debug!(
            ids = chunk_ids.len(),
            namespace = namespace.as_str(),
            "deleting vectors"
        );

        let response = self
            .with_retry(|| async {
                self.http
                    .post(&url)
                    .json(&request)
                    .send()
                    .await
                    .map_err(IndexError::Network)
            })
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(IndexError::DeleteFailed(format!(
                "index returned {}: {}",
                status, body
            )));
        }
        Ok(())
    }
}
