//! Embedding functions
//!
//! The knowledge store computes every embedding itself, at insertion and at
//! query time, through one `Embedder`. The embedder's name and dimension are
//! recorded with each collection so a reopened collection can be checked
//! against the embedder configured for this process.

pub mod engine;
pub mod hashing;

pub use engine::MiniLmEmbedder;
pub use hashing::HashingEmbedder;

use crate::errors::Result;

/// Text to fixed-dimensionality vector
pub trait Embedder: Send + Sync {
    /// Stable identity of the embedding function
    fn name(&self) -> &str;

    /// Length of every vector this embedder produces
    fn dimension(&self) -> usize;

    /// Embed a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Cosine similarity; 0.0 when either vector has zero norm
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
