//! Local semantic embedding provider (`smart` tier).
//!
//! Talks to an adjacent inference process (a sidecar running a local
//! sentence-embedding model) over loopback HTTP. The sidecar contract is
//! two routes: `GET /health` answering `{model, dimension}` and
//! `POST /embed` accepting `{input: [..]}` and answering
//! `{embeddings: [[..]]}`. Availability is established by a timed
//! [`probe`](super::Embedder::probe) handshake; an absent sidecar is
//! non-fatal and simply excludes this tier from selection.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    Embedder, Embedding, EmbeddingError, ProbeReport, approx_token_count, l2_normalize,
    validate_input,
};
use crate::constants::LOCAL_PROBE_BUDGET_SECS;

const PROVIDER: &str = "local";

/// Configuration for the local sidecar provider.
#[derive(Debug, Clone)]
pub struct LocalConfig {
    /// Sidecar base URL, usually on loopback.
    pub url: String,
    /// Expected vector dimension.
    pub dimension: usize,
    /// Handshake budget for `probe`.
    pub probe_timeout: Duration,
    /// Per-request timeout for `embed`.
    pub request_timeout: Duration,
}

impl LocalConfig {
    /// Creates a configuration for `url` with defaults.
    pub fn new(url: impl Into<String>, dimension: usize) -> Self {
        Self {
            url: url.into(),
            dimension,
            probe_timeout: Duration::from_secs(LOCAL_PROBE_BUDGET_SECS),
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Deserialize)]
struct HealthResponse {
    model: String,
    dimension: usize,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Client for the local embedding sidecar.
pub struct LocalEmbedder {
    client: reqwest::Client,
    config: LocalConfig,
    model_tag: parking_lot::RwLock<String>,
}

impl std::fmt::Debug for LocalEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEmbedder")
            .field("url", &self.config.url)
            .field("dimension", &self.config.dimension)
            .finish()
    }
}

impl LocalEmbedder {
    /// Creates a client for the configured sidecar.
    pub fn new(config: LocalConfig) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| EmbeddingError::Unavailable {
                provider: PROVIDER,
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            config,
            model_tag: parking_lot::RwLock::new("local".to_string()),
        })
    }

    fn route(&self, path: &str) -> String {
        format!("{}/{}", self.config.url.trim_end_matches('/'), path)
    }

    async fn request_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let response = self
            .client
            .post(self.route("embed"))
            .json(&EmbedRequest { input: texts })
            .send()
            .await
            .map_err(|e| EmbeddingError::Unavailable {
                provider: PROVIDER,
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(EmbeddingError::Unavailable {
                provider: PROVIDER,
                reason: format!("sidecar status {}", response.status()),
            });
        }

        let parsed: EmbedResponse =
            response
                .json()
                .await
                .map_err(|e| EmbeddingError::MalformedResponse {
                    provider: PROVIDER,
                    reason: e.to_string(),
                })?;

        if parsed.embeddings.len() != texts.len() {
            return Err(EmbeddingError::MalformedResponse {
                provider: PROVIDER,
                reason: format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    parsed.embeddings.len()
                ),
            });
        }
        for vector in &parsed.embeddings {
            if vector.len() != self.config.dimension {
                return Err(EmbeddingError::MalformedResponse {
                    provider: PROVIDER,
                    reason: format!(
                        "dimension mismatch: expected {}, got {}",
                        self.config.dimension,
                        vector.len()
                    ),
                });
            }
        }
        Ok(parsed.embeddings)
    }
}

#[async_trait::async_trait]
impl Embedder for LocalEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        validate_input(text)?;
        let input = [text.to_string()];
        let mut vectors = self.request_embeddings(&input).await?;
        let mut vector = vectors.pop().ok_or_else(|| EmbeddingError::MalformedResponse {
            provider: PROVIDER,
            reason: "empty embeddings array".to_string(),
        })?;
        l2_normalize(&mut vector);
        Ok(Embedding {
            vector,
            token_estimate: approx_token_count(text),
            model_tag: self.model_tag.read().clone(),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        for text in texts {
            validate_input(text)?;
        }
        let vectors = self.request_embeddings(texts).await?;
        let model_tag = self.model_tag.read().clone();
        Ok(texts
            .iter()
            .zip(vectors)
            .map(|(text, mut vector)| {
                l2_normalize(&mut vector);
                Embedding {
                    vector,
                    token_estimate: approx_token_count(text),
                    model_tag: model_tag.clone(),
                }
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn probe(&self) -> Result<ProbeReport, EmbeddingError> {
        let handshake = self.client.get(self.route("health")).send();

        let response = tokio::time::timeout(self.config.probe_timeout, handshake)
            .await
            .map_err(|_| EmbeddingError::Timeout {
                provider: PROVIDER,
                budget_ms: self.config.probe_timeout.as_millis() as u64,
            })?
            .map_err(|e| EmbeddingError::Unavailable {
                provider: PROVIDER,
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(EmbeddingError::Unavailable {
                provider: PROVIDER,
                reason: format!("sidecar status {}", response.status()),
            });
        }

        let health: HealthResponse =
            response
                .json()
                .await
                .map_err(|e| EmbeddingError::MalformedResponse {
                    provider: PROVIDER,
                    reason: e.to_string(),
                })?;

        if health.dimension != self.config.dimension {
            return Err(EmbeddingError::Unavailable {
                provider: PROVIDER,
                reason: format!(
                    "sidecar serves dimension {}, expected {}",
                    health.dimension, self.config.dimension
                ),
            });
        }

        debug!(model = %health.model, dimension = health.dimension, "Local sidecar handshake ok");
        *self.model_tag.write() = health.model.clone();

        Ok(ProbeReport {
            model_tag: health.model,
            dimension: health.dimension,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_times_out_against_dead_sidecar() {
        let mut config = LocalConfig::new("http://127.0.0.1:1", 8);
        config.probe_timeout = Duration::from_millis(200);
        config.request_timeout = Duration::from_millis(200);
        let embedder = LocalEmbedder::new(config).unwrap();
        let err = embedder.probe().await.unwrap_err();
        assert!(err.is_retryable(), "probe failure should be retryable: {err}");
    }

    #[tokio::test]
    async fn test_embed_rejects_empty_input() {
        let embedder = LocalEmbedder::new(LocalConfig::new("http://127.0.0.1:1", 8)).unwrap();
        let err = embedder.embed("").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidInput { .. }));
    }
}
