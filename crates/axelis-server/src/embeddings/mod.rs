// crates/axelis-server/src/embeddings/mod.rs
// Embedding provider module

mod fallback;
mod ollama;
mod openai;

pub use self::fallback::FallbackEmbeddings;
pub use self::ollama::OllamaEmbeddings;
pub use self::openai::OpenAiEmbeddings;

use crate::config::{ApiKeys, EmbeddingsConfig};
use anyhow::Result;
use serde_json::{Value, json};
use tracing::{info, warn};

/// Preprocessing contract: inputs are trimmed and hard-capped at this many
/// characters before any backend sees them.
pub const MAX_TEXT_CHARS: usize = 8000;

/// Backend-specific embedding implementation
enum EmbeddingBackend {
    OpenAi(OpenAiEmbeddings),
    Ollama(OllamaEmbeddings),
    Fallback(FallbackEmbeddings),
}

/// Embedding client with automatic provider selection
///
/// Priority: OpenAI (highest quality) > Ollama (local, no key needed) >
/// deterministic fallback (degraded search quality, but the system always
/// boots).
pub struct EmbeddingClient {
    backend: EmbeddingBackend,
}

impl EmbeddingClient {
    /// Create a new embedding client from pre-loaded configuration.
    /// Selection happens once; the chosen backend is observable via
    /// [`provider_info`](Self::provider_info).
    pub fn from_config(api_keys: &ApiKeys, config: &EmbeddingsConfig) -> Self {
        if let Some(api_key) = api_keys.openai.as_ref() {
            info!("Using OpenAI embeddings (text-embedding-3-small)");
            return Self {
                backend: EmbeddingBackend::OpenAi(OpenAiEmbeddings::new(
                    api_key.clone(),
                    config.dimensions,
                )),
            };
        }

        if let Some(host) = api_keys.ollama.as_ref() {
            let client = OllamaEmbeddings::new(
                host.clone(),
                config.ollama_embedding_model.clone(),
                config.dimensions,
            );
            info!(
                model = client.model_name(),
                dimensions = client.dimensions(),
                "Using Ollama embeddings"
            );
            return Self {
                backend: EmbeddingBackend::Ollama(client),
            };
        }

        warn!("No embedding provider configured - using deterministic fallback vectors, search quality will be limited");
        Self {
            backend: EmbeddingBackend::Fallback(FallbackEmbeddings::new(config.dimensions)),
        }
    }

    /// Create a new embedding client from environment configuration.
    pub fn from_env() -> Self {
        Self::from_config(&ApiKeys::from_env(), &EmbeddingsConfig::from_env())
    }

    /// Provider identifier for change detection
    pub fn provider_id(&self) -> &'static str {
        match &self.backend {
            EmbeddingBackend::OpenAi(_) => "openai",
            EmbeddingBackend::Ollama(_) => "ollama",
            EmbeddingBackend::Fallback(_) => "fallback",
        }
    }

    /// Get embedding dimensions
    pub fn dimensions(&self) -> usize {
        match &self.backend {
            EmbeddingBackend::OpenAi(c) => c.dimensions(),
            EmbeddingBackend::Ollama(c) => c.dimensions(),
            EmbeddingBackend::Fallback(c) => c.dimensions(),
        }
    }

    /// Active provider description for health/monitoring surfaces.
    pub fn provider_info(&self) -> Value {
        let model = match &self.backend {
            EmbeddingBackend::OpenAi(c) => c.model_name().to_string(),
            EmbeddingBackend::Ollama(c) => c.model_name().to_string(),
            EmbeddingBackend::Fallback(_) => "deterministic".to_string(),
        };
        json!({
            "provider": self.provider_id(),
            "model": model,
            "dimensions": self.dimensions(),
        })
    }

    /// Embed a query text.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let text = preprocess(text);
        if text.is_empty() {
            anyhow::bail!("Query cannot be empty");
        }
        match &self.backend {
            EmbeddingBackend::OpenAi(c) => c.embed(&text).await,
            EmbeddingBackend::Ollama(c) => c.embed(&text).await,
            EmbeddingBackend::Fallback(c) => Ok(c.embed(&text)),
        }
    }

    /// Embed a batch of documents, preserving order.
    pub async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let processed: Vec<String> = texts.iter().map(|t| preprocess(t)).collect();
        match &self.backend {
            EmbeddingBackend::OpenAi(c) => c.embed_batch(&processed).await,
            EmbeddingBackend::Ollama(c) => c.embed_batch(&processed).await,
            EmbeddingBackend::Fallback(c) => {
                Ok(processed.iter().map(|t| c.embed(t)).collect())
            }
        }
    }
}

/// Trim and hard-cap input text at [`MAX_TEXT_CHARS`], respecting char
/// boundaries.
fn preprocess(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= MAX_TEXT_CHARS {
        return text.to_string();
    }
    text.chars().take(MAX_TEXT_CHARS).collect()
}

/// Cosine similarity between two vectors (0.0 when either has zero norm).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_trims_and_caps() {
        assert_eq!(preprocess("  bonjour  "), "bonjour");

        let long = "é".repeat(MAX_TEXT_CHARS + 100);
        let capped = preprocess(&long);
        assert_eq!(capped.chars().count(), MAX_TEXT_CHARS);
    }

    #[test]
    fn test_cosine_similarity() {
        let a = [1.0, 0.0];
        let b = [1.0, 0.0];
        let c = [0.0, 1.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&a, &c).abs() < 1e-6);
        assert_eq!(cosine_similarity(&a, &[0.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_fallback_selection_without_keys() {
        let client = EmbeddingClient::from_config(
            &ApiKeys::default(),
            &EmbeddingsConfig::default(),
        );
        assert_eq!(client.provider_id(), "fallback");
        assert_eq!(client.dimensions(), 384);

        let info = client.provider_info();
        assert_eq!(info["provider"], "fallback");

        let vector = client.embed_query("bonjour").await.unwrap();
        assert_eq!(vector.len(), 384);
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let client = EmbeddingClient::from_config(
            &ApiKeys::default(),
            &EmbeddingsConfig::default(),
        );
        assert!(client.embed_query("   ").await.is_err());
    }

    #[tokio::test]
    async fn test_embed_documents_preserves_order_and_length() {
        let client = EmbeddingClient::from_config(
            &ApiKeys::default(),
            &EmbeddingsConfig::default(),
        );
        let texts = vec!["un".to_string(), "deux".to_string(), "trois".to_string()];
        let vectors = client.embed_documents(&texts).await.unwrap();
        assert_eq!(vectors.len(), 3);

        // Deterministic backend: same text, same vector
        let again = client.embed_documents(&texts).await.unwrap();
        assert_eq!(vectors, again);
    }
}
