// crates/axelis-server/src/embeddings/openai.rs
// OpenAI embeddings API client

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::debug;

/// Default embedding dimensions (OpenAI text-embedding-3-small)
pub const DEFAULT_DIMENSIONS: usize = 1536;

/// Model to use
const MODEL: &str = "text-embedding-3-small";

/// API endpoint
const API_URL: &str = "https://api.openai.com/v1/embeddings";

/// Max batch size per request (OpenAI supports up to 2048)
const MAX_BATCH_SIZE: usize = 100;

/// HTTP timeout
const TIMEOUT_SECS: u64 = 30;

/// Retry attempts
const RETRY_ATTEMPTS: usize = 2;

/// OpenAI embeddings client
pub struct OpenAiEmbeddings {
    api_key: String,
    dimensions: usize,
    http_client: reqwest::Client,
}

impl OpenAiEmbeddings {
    pub fn new(api_key: String, dimensions: Option<usize>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            api_key,
            dimensions: dimensions.unwrap_or(DEFAULT_DIMENSIONS),
            http_client,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn model_name(&self) -> &'static str {
        MODEL
    }

    /// Embed a single text
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": MODEL,
            "input": text,
            "dimensions": self.dimensions,
        });

        // Retry loop: transient API failures get a short pause then one more try
        let mut last_error = None;
        for attempt in 0..=RETRY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }

            match self
                .http_client
                .post(API_URL)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await
            {
                Ok(response) => {
                    if response.status().is_success() {
                        let json: serde_json::Value = response.json().await?;
                        if let Some(values) = json["data"][0]["embedding"].as_array() {
                            let embedding: Vec<f32> = values
                                .iter()
                                .filter_map(|v| v.as_f64().map(|f| f as f32))
                                .collect();
                            if embedding.len() == self.dimensions {
                                return Ok(embedding);
                            }
                        }
                        anyhow::bail!("Invalid embedding response");
                    } else {
                        let status = response.status();
                        let text = response.text().await.unwrap_or_default();
                        last_error = Some(anyhow::anyhow!("API error {}: {}", status, text));
                    }
                }
                Err(e) => {
                    last_error = Some(e.into());
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Unknown error")))
    }

    /// Embed multiple texts in batch, preserving input order. Chunks beyond
    /// one request run in parallel.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let chunks: Vec<&[String]> = texts.chunks(MAX_BATCH_SIZE).collect();
        if chunks.len() == 1 {
            return self.embed_batch_inner(chunks[0]).await;
        }

        debug!(
            "Embedding {} texts in {} parallel batches",
            texts.len(),
            chunks.len()
        );
        let futures: Vec<_> = chunks
            .iter()
            .map(|chunk| self.embed_batch_inner(chunk))
            .collect();
        let results = futures::future::join_all(futures).await;

        let mut all_results = Vec::with_capacity(texts.len());
        for result in results {
            all_results.extend(result?);
        }
        Ok(all_results)
    }

    async fn embed_batch_inner(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        debug!("Embedding batch of {} texts", texts.len());

        let body = serde_json::json!({
            "model": MODEL,
            "input": texts,
            "dimensions": self.dimensions,
        });

        let response = self
            .http_client
            .post(API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .context("Batch embed request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Batch API error {}: {}", status, text);
        }

        let json: serde_json::Value = response.json().await?;
        let data = json["data"]
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("Invalid batch response"))?;

        // Results carry an index field; sort by it to keep input order
        let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
        for item in data {
            let index = item["index"].as_u64().unwrap_or(0) as usize;
            if let Some(values) = item["embedding"].as_array() {
                let vec: Vec<f32> = values
                    .iter()
                    .filter_map(|v| v.as_f64().map(|f| f as f32))
                    .collect();
                indexed.push((index, vec));
            }
        }
        indexed.sort_by_key(|(i, _)| *i);

        Ok(indexed.into_iter().map(|(_, v)| v).collect())
    }
}
