// crates/axelis-server/src/llm/openai.rs
// OpenAI chat completions client (non-streaming)

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::debug;

use super::provider::{LlmClient, Provider};
use super::types::{ChatResult, Message, Usage};

const API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Outbound call deadline. The orchestrator layers its own tier timeout on
/// top of this.
const TIMEOUT_SECS: u64 = 60;

/// Retry attempts on transient failures
const RETRY_ATTEMPTS: usize = 1;

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

/// OpenAI API client
pub struct OpenAiClient {
    api_key: String,
    model: String,
    http_client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(api_key: String) -> Self {
        Self::with_model(api_key, Provider::OpenAi.default_model().to_string())
    }

    pub fn with_model(api_key: String, model: String) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            api_key,
            model,
            http_client,
        }
    }

    async fn chat_inner(&self, messages: &[Message]) -> Result<ChatResult> {
        let start = Instant::now();
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.3,
        });

        let mut last_error = None;
        for attempt in 0..=RETRY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }

            let response = match self
                .http_client
                .post(API_URL)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    last_error = Some(anyhow::Error::from(e));
                    continue;
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                last_error = Some(anyhow::anyhow!("OpenAI API error {}: {}", status, text));
                continue;
            }

            let parsed: ChatCompletionResponse = response
                .json()
                .await
                .context("Invalid chat completion response")?;

            let content = parsed
                .choices
                .first()
                .and_then(|c| c.message.content.clone())
                .ok_or_else(|| anyhow::anyhow!("Empty chat completion"))?;

            let duration_ms = start.elapsed().as_millis() as u64;
            debug!(model = %self.model, duration_ms, "Chat completion");

            if let Some(ref usage) = parsed.usage {
                crate::metrics::record_tokens(
                    &self.model,
                    usage.prompt_tokens as u64,
                    usage.completion_tokens as u64,
                );
            }

            return Ok(ChatResult {
                content,
                usage: parsed.usage,
                duration_ms,
            });
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Unknown error")))
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(&self, messages: Vec<Message>) -> Result<ChatResult> {
        self.chat_inner(&messages).await
    }

    fn provider_type(&self) -> Provider {
        Provider::OpenAi
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }
}
