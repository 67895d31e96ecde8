//! Embedding providers.
//!
//! Four providers implement [`Embedder`], one per capability tier:
//!
//! - [`RemoteEmbedder`]: remote semantic endpoint (`advanced`),
//! - [`LocalEmbedder`]: adjacent local inference process (`smart`),
//! - [`LexicalEmbedder`]: deterministic token hashing (`basic`),
//! - [`MockEmbedder`]: seeded test vectors (`mock`).
//!
//! All providers produce unit-norm vectors of a fixed dimension. Selection
//! and fallback between them belong to [`crate::tier`].

mod error;
pub mod lexical;
pub mod local;
pub mod mock;
pub mod remote;


pub use error::EmbeddingError;
pub use lexical::LexicalEmbedder;
pub use local::{LocalConfig, LocalEmbedder};
pub use mock::MockEmbedder;
pub use remote::{RemoteConfig, RemoteDialect, RemoteEmbedder};

use async_trait::async_trait;

/// The result of embedding one text.
#[derive(Debug, Clone)]
pub struct Embedding {
    /// Unit-norm vector of the provider's dimension.
    pub vector: Vec<f32>,
    /// Rough token count of the input (chars / 4, minimum 1).
    pub token_estimate: usize,
    /// Identifies the model that produced the vector.
    pub model_tag: String,
}

/// Capability report returned by a provider probe.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    /// Model identifier the provider will serve.
    pub model_tag: String,
    /// Vector dimension the provider will serve.
    pub dimension: usize,
}

/// Maps text to fixed-dimension unit-norm vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds a single text. Fails with `InvalidInput` on empty/whitespace.
    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError>;

    /// Embeds a batch, preserving input order.
    ///
    /// The default implementation embeds sequentially; providers with a
    /// native batch API override it.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// The fixed vector dimension.
    fn dimension(&self) -> usize;

    /// Short provider name for logs and tier messages.
    fn name(&self) -> &'static str;

    /// Checks availability and reports capabilities.
    ///
    /// Implementations bound their own I/O; the tier controller additionally
    /// wraps probes in a strict timeout.
    async fn probe(&self) -> Result<ProbeReport, EmbeddingError>;
}

/// Rejects empty or whitespace-only input.
pub(crate) fn validate_input(text: &str) -> Result<(), EmbeddingError> {
    if text.trim().is_empty() {
        return Err(EmbeddingError::InvalidInput {
            reason: "text is empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

/// Scales a vector to unit L2 norm in place. Zero vectors are left as-is.
pub(crate) fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Rough token estimate: one token per four characters, minimum one.
pub(crate) fn approx_token_count(text: &str) -> usize {
    text.chars().count().div_ceil(4).max(1)
}
