//! Mock embedding provider (`mock` tier and tests).
//!
//! Vectors are pseudo-random but fully determined by the input text: the
//! BLAKE3 hash of the content seeds an xorshift generator. Identical text
//! always embeds identically, distinct texts are near-orthogonal in
//! expectation, which is all the mock tier promises.

use super::{
    Embedder, Embedding, EmbeddingError, ProbeReport, approx_token_count, l2_normalize,
    validate_input,
};
use crate::hashing::hash_to_u64;

const PROVIDER: &str = "mock";

const MODEL_TAG: &str = "mock-deterministic";

/// Deterministic seeded-vector embedder.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    /// Creates an embedder producing vectors of `dimension`.
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut state = hash_to_u64(text.as_bytes()) | 1;
        let mut vector = Vec::with_capacity(self.dimension);
        for _ in 0..self.dimension {
            state = xorshift64star(state);
            // Map the top 24 bits into [-1, 1).
            let unit = (state >> 40) as f32 / (1u64 << 23) as f32 - 1.0;
            vector.push(unit);
        }
        l2_normalize(&mut vector);
        vector
    }
}

fn xorshift64star(mut x: u64) -> u64 {
    x ^= x >> 12;
    x ^= x << 25;
    x ^= x >> 27;
    x.wrapping_mul(0x2545_f491_4f6c_dd1d)
}

#[async_trait::async_trait]
impl Embedder for MockEmbedder {
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
