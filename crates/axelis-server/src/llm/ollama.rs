// crates/axelis-server/src/llm/ollama.rs
// Ollama chat client via the OpenAI-compatible endpoint

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};

use super::provider::{LlmClient, Provider};
use super::types::{ChatResult, Message, Usage};

const TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Local Ollama chat client (no auth required)
pub struct OllamaClient {
    base_url: String,
    model: String,
    http_client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(base_url: String, model: Option<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.unwrap_or_else(|| Provider::Ollama.default_model().to_string()),
            http_client,
        }
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn chat(&self, messages: Vec<Message>) -> Result<ChatResult> {
        let start = Instant::now();
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.3,
        });

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Ollama chat request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama API error {}: {}", status, text);
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .context("Invalid Ollama chat response")?;

        let content = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| anyhow::anyhow!("Empty chat completion"))?;

        Ok(ChatResult {
            content,
            usage: parsed.usage,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn provider_type(&self) -> Provider {
        Provider::Ollama
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }
}
