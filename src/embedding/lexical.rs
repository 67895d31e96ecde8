//! Lexical-hash embedding provider (`basic` tier).
//!
//! Tokens map through a stable FNV-1a 32-bit hash into signed buckets of a
//! fixed-dimension vector, weighted by term frequency, then L2-normalized.
//! Fully deterministic, no external dependency, never fails outside of
//! empty-input validation. The quality ceiling is lexical overlap rather
//! than meaning, which is exactly what the `basic` tier promises.

use super::{
    Embedder, Embedding, EmbeddingError, ProbeReport, approx_token_count, l2_normalize,
    validate_input,
};
use crate::hashing::hash_token32;

const PROVIDER: &str = "lexical";

const MODEL_TAG: &str = "lexical-hash-v1";

/// Deterministic token-hash embedder.
#[derive(Debug, Clone)]
pub struct LexicalEmbedder {
    dimension: usize,
}

impl LexicalEmbedder {
    /// Creates an embedder producing vectors of `dimension`.
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in tokenize(text) {
            let hash = hash_token32(&token);
            let bucket = (hash as usize) % self.dimension;
            // The top hash bit picks the sign, turning tf accumulation into
            // a signed random projection; distinct token sets then disagree
            // in direction, not just magnitude.
            let sign = if hash & 0x8000_0000 != 0 { -1.0 } else { 1.0 };
            vector[bucket] += sign;
        }

        l2_normalize(&mut vector);
        vector
    }
}

/// Splits on non-alphanumeric boundaries and lowercases.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

#[async_trait::async_trait]
impl Embedder for LexicalEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        validate_input(text)?;
        Ok(Embedding {
            vector: self.embed_sync(text),
            token_estimate: approx_token_count(text),
            model_tag: MODEL_TAG.to_string(),
        })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn probe(&self) -> Result<ProbeReport, EmbeddingError> {
        Ok(ProbeReport {
            model_tag: MODEL_TAG.to_string(),
            dimension: self.dimension,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_deterministic() {
        let embedder = LexicalEmbedder::new(256);
        let a = embedder.embed("User prefers dark mode").await.unwrap();
        let b = embedder.embed("User prefers dark mode").await.unwrap();
        assert_eq!(a.vector, b.vector);
    }

    #[tokio::test]
    async fn test_unit_norm() {
        let embedder = LexicalEmbedder::new(256);
        let e = embedder.embed("the quick brown fox").await.unwrap();
        let norm: f32 = e.vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_overlapping_text_scores_higher_than_disjoint() {
        let embedder = LexicalEmbedder::new(256);
        let stored = embedder.embed("User prefers dark mode").await.unwrap();
        let close = embedder.embed("dark mode preferences").await.unwrap();
        let far = embedder.embed("quarterly revenue spreadsheet").await.unwrap();

        assert!(cosine(&stored.vector, &close.vector) > cosine(&stored.vector, &far.vector));
    }

    #[tokio::test]
    async fn test_case_and_punctuation_insensitive() {
        let embedder = LexicalEmbedder::new(256);
        let a = embedder.embed("Dark-Mode: enabled!").await.unwrap();
        let b = embedder.embed("dark mode enabled").await.unwrap();
        assert!(cosine(&a.vector, &b.vector) > 0.99);
    }

    #[tokio::test]
    async fn test_rejects_empty() {
        let embedder = LexicalEmbedder::new(256);
        assert!(matches!(
            embedder.embed(" \t ").await.unwrap_err(),
            EmbeddingError::InvalidInput { .. }
        ));
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let embedder = LexicalEmbedder::new(64);
        let texts = vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()];
        let batch = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(batch.len(), 3);
        for (text, embedding) in texts.iter().zip(&batch) {
            let single = embedder.embed(text).await.unwrap();
            assert_eq!(single.vector, embedding.vector);
        }
    }
}
