//! Embedding service HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};
use vidx_media::Frame;

use crate::error::{EmbedError, EmbedResult};
use crate::types::{EmbedFrame, EmbedRequest, EmbedResponse, HealthResponse};

/// Configuration for the embedding client.
#[derive(Debug, Clone)]
pub struct EmbedConfig {
    /// Base URL of the embedding service
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Max retries for transient failures
    pub max_retries: u32,
    /// Frames sent per chunk; extra frames are dropped evenly
    pub max_frames: usize,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            timeout: Duration::from_secs(120),
            max_retries: 2,
            max_frames: 8,
        }
    }
}

impl EmbedConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("EMBED_SERVICE_URL").unwrap_or(defaults.base_url),
            timeout: Duration::from_secs(
                std::env::var("EMBED_SERVICE_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
            max_retries: std::env::var("EMBED_SERVICE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            max_frames: std::env::var("EMBED_MAX_FRAMES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_frames),
        }
    }
}

/// Turns a chunk's frames into one embedding vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a set of frames into a single vector. Fails on empty input
    /// or service error; partial results are never returned.
    async fn embed(&self, frames: &[Frame]) -> EmbedResult<Vec<f32>>;
}

/// [`Embedder`] backed by the HTTP embedding service.
pub struct HttpEmbedder {
    http: Client,
    config: EmbedConfig,
}

impl HttpEmbedder {
    /// Create a new embedding client.
    pub fn new(config: EmbedConfig) -> EmbedResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(EmbedError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> EmbedResult<Self> {
        Self::new(EmbedConfig::from_env())
    }

    /// Check if the embedding service is healthy.
    pub async fn health_check(&self) -> EmbedResult<bool> {
        let url = format!("{}/health", self.config.base_url);

        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                let health: HealthResponse = response.json().await?;
                Ok(health.status == "healthy" || health.status == "ok")
            }
            Ok(response) => {
                warn!("embedding service health check failed: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("embedding service health check error: {}", e);
                Ok(false)
            }
        }
    }

    /// Execute with retry logic for transient failures.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> EmbedResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = EmbedResult<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(
                        "embed request failed (attempt {}), retrying in {:?}: {}",
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

        Err(last_error.unwrap_or(EmbedError::RequestFailed("Unknown error".to_string())))
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, frames: &[Frame]) -> EmbedResult<Vec<f32>> {
        if frames.is_empty() {
            return Err(EmbedError::RequestFailed("no frames to embed".to_string()));
        }

        let selected = select_evenly(frames, self.config.max_frames);
        let request = EmbedRequest {
            frames: selected.iter().map(|f| EmbedFrame::from_frame(f)).collect(),
        };

        let url = format!("{}/embed", self.config.base_url);
        debug!(frames = selected.len(), "requesting embedding");

        let response = self
            .with_retry(|| async {
                self.http
                    .post(&url)
                    .json(&request)
                    .send()
                    .await
                    .map_err(EmbedError::Network)
            })
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbedError::RequestFailed(format!(
                "embedding service returned {}: {}",
                status, body
            )));
        }

        let parsed: EmbedResponse = response.json().await?;
        if parsed.embedding.is_empty() {
            return Err(EmbedError::InvalidResponse(
                "empty embedding vector".to_string(),
            ));
        }
        Ok(parsed.embedding)
    }
}

/// Pick up to `max` frames spread evenly across the input.
fn select_evenly(frames: &[Frame], max: usize) -> Vec<&Frame> {
    let count = max.max(1).min(frames.len());
    if count == frames.len() {
        return frames.iter().collect();
    }

    (0..count)
        .map(|i| {
            let idx = (i * (frames.len() - 1)) as f64 / (count - 1) as f64;
            &frames[idx as usize]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn frame(value: u8) -> Frame {
        Frame::from_rgb24(2, 2, vec![value; 12]).unwrap()
    }

    fn client_for(server: &MockServer, max_retries: u32) -> HttpEmbedder {
        HttpEmbedder::new(EmbedConfig {
            base_url: server.uri(),
            timeout: Duration::from_secs(5),
            max_retries,
            max_frames: 8,
        })
        .unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = EmbedConfig::default();
        assert_eq!(config.base_url, "http://localhost:8001");
        assert_eq!(config.max_frames, 8);
    }

    #[test]
    fn test_select_evenly_keeps_all_when_under_limit() {
        let frames: Vec<Frame> = (0..5).map(frame).collect();
        assert_eq!(select_evenly(&frames, 8).len(), 5);
    }

    #[test]
    fn test_select_evenly_spans_first_to_last() {
        let frames: Vec<Frame> = (0..20).map(frame).collect();
        let selected = select_evenly(&frames, 8);

        assert_eq!(selected.len(), 8);
        assert_eq!(selected[0].data[0], 0);
        assert_eq!(selected[7].data[0], 19);
    }

    #[tokio::test]
    async fn test_embed_returns_vector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "embedding": [0.1, 0.2, 0.3] })),
            )
            .mount(&server)
            .await;

        let embedder = client_for(&server, 0);
        let vector = embedder.embed(&[frame(1)]).await.unwrap();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_embed_rejects_empty_input() {
        let server = MockServer::start().await;
        let embedder = client_for(&server, 0);
        assert!(embedder.embed(&[]).await.is_err());
    }

    #[tokio::test]
    async fn test_embed_fails_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let embedder = client_for(&server, 0);
        let err = embedder.embed(&[frame(1)]).await.unwrap_err();
        assert!(matches!(err, EmbedError::RequestFailed(_)));
    }

    #[tokio::test]
    async fn test_embed_rejects_empty_embedding() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "embedding": [] })))
            .mount(&server)
            .await;

        let embedder = client_for(&server, 0);
        let err = embedder.embed(&[frame(1)]).await.unwrap_err();
        assert!(matches!(err, EmbedError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "healthy" })))
            .mount(&server)
            .await;

        let embedder = client_for(&server, 0);
        assert!(embedder.health_check().await.unwrap());
    }
}
