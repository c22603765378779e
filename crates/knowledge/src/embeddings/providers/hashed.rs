//! Hashed bag-of-words embedding provider.

use crate::embeddings::provider::EmbeddingProvider;
use ark_core::AppResult;
use sha2::{Digest, Sha256};

/// Local, offline provider based on feature hashing.
///
/// Every lowercased whitespace-delimited token adds 1.0 to the bucket picked
/// by its SHA-256 digest modulo the dimension; the result is L2-normalized.
/// Deterministic, but carries no semantics beyond shared words.
#[derive(Debug, Clone)]
pub struct HashedProvider {
    dimensions: usize,
}

impl HashedProvider {
    /// Create a new hashed provider with specified dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

/// Embed `text` into `dim` buckets.
///
/// Empty text (or `dim == 0`) yields an all-zero vector.
pub fn hashed_embedding(text: &str, dim: usize) -> Vec<f32> {
    let mut embedding = vec![0.0f32; dim];
    if dim == 0 {
        return embedding;
    }

    for token in text.to_lowercase().split_whitespace() {
        let digest = Sha256::digest(token.as_bytes());
        embedding[bucket(&digest, dim)] += 1.0;
    }

    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut embedding {
            *v /= norm;
        }
    }

    embedding
}

/// Reduce a big-endian 256-bit digest modulo `dim`.
fn bucket(digest: &[u8], dim: usize) -> usize {
    let modulus = dim as u128;
    let rem = digest
        .iter()
        .fold(0u128, |acc, &b| (acc * 256 + b as u128) % modulus);
    rem as usize
}

#[async_trait::async_trait]
impl EmbeddingProvider for HashedProvider {
    fn provider_name(&self) -> &str {
        "hashed"
    }

    fn model_name(&self) -> &str {
        "sha256-bow"
    }

    fn dimensions(&self) -> Option<usize> {
        Some(self.dimensions)
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| hashed_embedding(text, self.dimensions))
            .collect())
    }
}
