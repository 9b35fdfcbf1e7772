// crates/axelis-server/src/embeddings/ollama.rs
// Ollama embeddings via OpenAI-compatible /v1/embeddings endpoint

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Default Ollama embedding model
const DEFAULT_MODEL: &str = "nomic-embed-text";

/// Default dimensions for nomic-embed-text
const DEFAULT_DIMENSIONS: usize = 768;

/// Max texts per batch request
const MAX_BATCH_SIZE: usize = 64;

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Ollama embeddings client (OpenAI-compatible endpoint, no auth required)
pub struct OllamaEmbeddings {
    base_url: String,
    model: String,
    dimensions: usize,
    http_client: reqwest::Client,
}

impl OllamaEmbeddings {
    pub fn new(base_url: String, model: Option<String>, dimensions: Option<usize>) -> Self {
        let model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let dimensions = dimensions.unwrap_or(DEFAULT_DIMENSIONS);
        let base_url = base_url.trim_end_matches('/').to_string();

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url,
            model,
            dimensions,
            http_client,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// Embed a single text
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_texts(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response from Ollama"))
    }

    /// Embed multiple texts in batch
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut all_results = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(MAX_BATCH_SIZE) {
            all_results.extend(self.embed_texts(chunk).await?);
        }
        Ok(all_results)
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Ollama embedding request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama API error {}: {}", status, text);
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .context("Invalid Ollama embedding response")?;

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}
