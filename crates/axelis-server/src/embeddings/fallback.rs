// crates/axelis-server/src/embeddings/fallback.rs
// Deterministic fallback embeddings
//
// Last-resort backend when no remote or local provider is configured. Each
// vector is seeded from the SHA-256 of its input text, so identical text
// always produces the identical unit vector. Semantic quality is gone, but
// re-ingestion stays idempotent and exact-duplicate lookups still rank
// first.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

/// Default dimension for fallback vectors
const DEFAULT_DIMENSIONS: usize = 384;

pub struct FallbackEmbeddings {
    dimensions: usize,
}

impl FallbackEmbeddings {
    pub fn new(dimensions: Option<usize>) -> Self {
        Self {
            dimensions: dimensions.unwrap_or(DEFAULT_DIMENSIONS),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Unit-normalized pseudo-random vector seeded from the text content.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let digest = Sha256::digest(text.as_bytes());
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&digest);
        let mut rng = StdRng::from_seed(seed);

        let mut vector: Vec<f32> = (0..self.dimensions)
            .map(|_| rng.random_range(-1.0f32..1.0f32))
            .collect();

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::cosine_similarity;

    #[test]
    fn test_deterministic_per_text() {
        let backend = FallbackEmbeddings::new(None);
        let a = backend.embed("comment consulter mon solde");
        let b = backend.embed("comment consulter mon solde");
        assert_eq!(a, b);
        assert_eq!(a.len(), DEFAULT_DIMENSIONS);
    }

    #[test]
    fn test_distinct_texts_diverge() {
        let backend = FallbackEmbeddings::new(None);
        let a = backend.embed("solde");
        let b = backend.embed("transfert");
        assert_ne!(a, b);
        // Pseudo-random unit vectors are near-orthogonal in high dimension
        assert!(cosine_similarity(&a, &b).abs() < 0.5);
    }

    #[test]
    fn test_unit_norm() {
        let backend = FallbackEmbeddings::new(Some(64));
        let v = backend.embed("bonjour");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
