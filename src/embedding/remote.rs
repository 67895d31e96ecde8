//! Remote semantic embedding provider (`advanced` tier).
//!
//! Speaks the OpenAI-compatible embeddings wire format in two dialects:
//! [`RemoteDialect::Direct`] (bearer key, model named in the body) and
//! [`RemoteDialect::Deployment`] (deployment-keyed path with an `api-key`
//! header). Transport faults map to `Unavailable`, credential rejections to
//! `AuthFailed`, and rate/quota pressure to `Transient`; retryable failures
//! are retried with exponential backoff up to `max_retries`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    Embedder, Embedding, EmbeddingError, ProbeReport, approx_token_count, l2_normalize,
    validate_input,
};
use crate::constants::DEFAULT_EMBEDDING_DIM;

const PROVIDER: &str = "remote";

const DEFAULT_API_VERSION: &str = "2023-05-15";

/// Which wire dialect the endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteDialect {
    /// `POST {endpoint}/embeddings` with `Authorization: Bearer`.
    Direct,
    /// `POST {endpoint}/openai/deployments/{deployment}/embeddings` with `api-key`.
    Deployment,
}

/// Configuration for the remote provider.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base endpoint URL (no trailing `/embeddings`).
    pub endpoint: String,
    /// API key.
    pub api_key: String,
    /// Model name (direct dialect) or a tag for logs (deployment dialect).
    pub model: String,
    /// Deployment name; presence selects the deployment dialect.
    pub deployment: Option<String>,
    /// Expected vector dimension.
    pub dimension: usize,
    /// Maximum retry attempts for retryable failures.
    pub max_retries: u32,
    /// Base backoff delay; doubles per attempt.
    pub base_delay: Duration,
    /// Maximum texts per batch request.
    pub max_batch: usize,
    /// HTTP request timeout.
    pub request_timeout: Duration,
}

impl RemoteConfig {
    /// Creates a direct-dialect configuration with defaults.
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: "text-embedding-3-small".to_string(),
            deployment: None,
            dimension: DEFAULT_EMBEDDING_DIM,
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_batch: 64,
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Sets the model name.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Switches to the deployment-keyed dialect.
    pub fn deployment(mut self, deployment: impl Into<String>) -> Self {
        self.deployment = Some(deployment.into());
        self
    }

    /// Sets the expected dimension.
    pub fn dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Sets the retry budget.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the base backoff delay.
    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Returns the active dialect.
    pub fn dialect(&self) -> RemoteDialect {
        if self.deployment.is_some() {
            RemoteDialect::Deployment
        } else {
            RemoteDialect::Direct
        }
    }

    /// Builds the request URL for the active dialect.
    pub fn request_url(&self) -> String {
        let base = self.endpoint.trim_end_matches('/');
        match &self.deployment {
            Some(deployment) => format!(
                "{}/openai/deployments/{}/embeddings?api-version={}",
                base, deployment, DEFAULT_API_VERSION
            ),
            None => format!("{}/embeddings", base),
        }
    }
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

/// Remote embedding client.
pub struct RemoteEmbedder {
    client: reqwest::Client,
    config: RemoteConfig,
}

impl std::fmt::Debug for RemoteEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteEmbedder")
            .field("endpoint", &self.config.endpoint)
            .field("dialect", &self.config.dialect())
            .field("model", &self.config.model)
            .field("dimension", &self.config.dimension)
            .finish()
    }
}

impl RemoteEmbedder {
    /// Creates a client for the configured endpoint.
    pub fn new(config: RemoteConfig) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| EmbeddingError::Unavailable {
                provider: PROVIDER,
                reason: e.to_string(),
            })?;
        Ok(Self { client, config })
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    async fn request_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = self.config.request_url();
        let body = EmbeddingsRequest {
            model: match self.config.dialect() {
                RemoteDialect::Direct => Some(self.config.model.as_str()),
                RemoteDialect::Deployment => None,
            },
            input: texts,
        };

        let mut request = self.client.post(&url).json(&body);
        request = match self.config.dialect() {
            RemoteDialect::Direct => request.bearer_auth(&self.config.api_key),
            RemoteDialect::Deployment => request.header("api-key", &self.config.api_key),
        };

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                EmbeddingError::Timeout {
                    provider: PROVIDER,
                    budget_ms: self.config.request_timeout.as_millis() as u64,
                }
            } else {
                EmbeddingError::Unavailable {
                    provider: PROVIDER,
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(EmbeddingError::AuthFailed { provider: PROVIDER });
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(EmbeddingError::Transient {
                provider: PROVIDER,
                reason: "rate limited by provider".to_string(),
            });
        }
        if !status.is_success() {
            return Err(EmbeddingError::Unavailable {
                provider: PROVIDER,
                reason: format!("status {}", status),
            });
        }

        let parsed: EmbeddingsResponse =
            response
                .json()
                .await
                .map_err(|e| EmbeddingError::MalformedResponse {
                    provider: PROVIDER,
                    reason: e.to_string(),
                })?;

        if parsed.data.len() != texts.len() {
            return Err(EmbeddingError::MalformedResponse {
                provider: PROVIDER,
                reason: format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    parsed.data.len()
                ),
            });
        }

        debug!(
            model = parsed.model.as_deref().unwrap_or(&self.config.model),
            count = parsed.data.len(),
            "Remote embeddings received"
        );

        // The API may return data out of order; `index` restores input order.
        let mut vectors: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        for datum in parsed.data {
            if datum.embedding.len() != self.config.dimension {
                return Err(EmbeddingError::MalformedResponse {
                    provider: PROVIDER,
                    reason: format!(
                        "dimension mismatch: expected {}, got {}",
                        self.config.dimension,
                        datum.embedding.len()
                    ),
                });
            }
            let slot = vectors
                .get_mut(datum.index)
                .ok_or_else(|| EmbeddingError::MalformedResponse {
                    provider: PROVIDER,
                    reason: format!("embedding index {} out of range", datum.index),
                })?;
            *slot = Some(datum.embedding);
        }

        vectors
            .into_iter()
            .map(|v| {
                v.ok_or_else(|| EmbeddingError::MalformedResponse {
                    provider: PROVIDER,
                    reason: "missing embedding index in response".to_string(),
                })
            })
            .collect()
    }

    async fn request_batch_with_retry(
        &self,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut delay = self.config.base_delay;
        let mut attempt = 0u32;
        loop {
            match self.request_batch(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        attempt,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Remote embedding failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait::async_trait]
impl Embedder for RemoteEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        validate_input(text)?;
        let input = [text.to_string()];
        let mut vectors = self.request_batch_with_retry(&input).await?;
        let mut vector = vectors.pop().ok_or_else(|| EmbeddingError::MalformedResponse {
            provider: PROVIDER,
            reason: "empty response data".to_string(),
        })?;
        l2_normalize(&mut vector);
        Ok(Embedding {
            vector,
            token_estimate: approx_token_count(text),
            model_tag: self.config.model.clone(),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        for text in texts {
            validate_input(text)?;
        }

        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.config.max_batch.max(1)) {
            let vectors = self.request_batch_with_retry(chunk).await?;
            for (text, mut vector) in chunk.iter().zip(vectors) {
                l2_normalize(&mut vector);
                out.push(Embedding {
                    vector,
                    token_estimate: approx_token_count(text),
                    model_tag: self.config.model.clone(),
                });
            }
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn probe(&self) -> Result<ProbeReport, EmbeddingError> {
        // Availability for the remote tier means the credentials work.
        self.embed("ping").await?;
        Ok(ProbeReport {
            model_tag: self.config.model.clone(),
            dimension: self.config.dimension,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_dialect_url() {
        let config = RemoteConfig::new("https://api.example.com/v1", "sk-test");
        assert_eq!(config.dialect(), RemoteDialect::Direct);
        assert_eq!(config.request_url(), "https://api.example.com/v1/embeddings");
    }

    #[test]
    fn test_deployment_dialect_url() {
        let config =
            RemoteConfig::new("https://unit.openai.azure.com/", "key").deployment("embed-prod");
        assert_eq!(config.dialect(), RemoteDialect::Deployment);
        assert_eq!(
            config.request_url(),
            "https://unit.openai.azure.com/openai/deployments/embed-prod/embeddings?api-version=2023-05-15"
        );
    }

    #[tokio::test]
    async fn test_embed_rejects_empty_input_without_network() {
        let embedder = RemoteEmbedder::new(RemoteConfig::new("http://127.0.0.1:1", "key")).unwrap();
        let err = embedder.embed("   ").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_maps_to_unavailable() {
        let config = RemoteConfig::new("http://127.0.0.1:1", "key")
            .max_retries(0)
            .base_delay(Duration::from_millis(1));
        let embedder = RemoteEmbedder::new(config).unwrap();
        let err = embedder.embed("hello").await.unwrap_err();
        assert!(err.is_retryable(), "got non-retryable error: {err}");
    }
}
