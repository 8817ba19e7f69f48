//! Deterministic feature-hashing embedder
//!
//! Tokens are hashed with xxhash into a fixed number of signed buckets and the
//! result is L2-normalised. No model download, identical output on every
//! machine, which makes it the offline default.

use crate::embedding::Embedder;
use crate::errors::Result;
use std::hash::Hasher;
use twox_hash::XxHash64;

/// Default dimension, matching the MiniLM collections
pub const DEFAULT_DIMENSION: usize = 384;

const NAME: &str = "hashing-xxh64";

/// Bag-of-words embedder over hashed token buckets
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        NAME
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0f32; self.dimension];

        for token in Self::tokens(text) {
            let mut hasher = XxHash64::with_seed(0);
            hasher.write(token.as_bytes());
            let hash = hasher.finish();

            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }

        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[test]
    fn test_dimension() {
        let embedder = HashingEmbedder::new(64);
        assert_eq!(embedder.embed("hello world").unwrap().len(), 64);
    }

    #[test]
    fn test_deterministic() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed("SEER rating measures cooling efficiency").unwrap();
        let b = embedder.embed("SEER rating measures cooling efficiency").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed("Heat pump, defrost cycle!").unwrap();
        let b = embedder.embed("heat pump defrost cycle").unwrap();
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_related_text_scores_higher() {
        let embedder = HashingEmbedder::default();
        let query = embedder.embed("refrigerant charge").unwrap();
        let related = embedder.embed("checking refrigerant charge with gauges").unwrap();
        let unrelated = embedder.embed("patient vital signs assessment").unwrap();
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(8);
        assert!(embedder.embed("  ...  ").unwrap().iter().all(|x| *x == 0.0));
    }
}
