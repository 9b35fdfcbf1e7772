// crates/axelis-server/src/llm/factory.rs
// Build the LLM client from loaded configuration

use std::sync::Arc;
use tracing::info;

use super::ollama::OllamaClient;
use super::openai::OpenAiClient;
use super::provider::LlmClient;
use crate::config::EnvConfig;

/// Create the LLM client for this process.
///
/// Priority: OpenAI key > Ollama host > none. `None` pins the orchestrator
/// to its canned fallback tier — the product still answers every turn.
pub fn create_client(config: &EnvConfig) -> Option<Arc<dyn LlmClient>> {
    if let Some(api_key) = config.api.openai.as_ref() {
        let client = match &config.llm_model {
            Some(model) => OpenAiClient::with_model(api_key.clone(), model.clone()),
            None => OpenAiClient::new(api_key.clone()),
        };
        info!(model = %client.model_name(), "Using OpenAI LLM provider");
        return Some(Arc::new(client));
    }

    if let Some(host) = config.api.ollama.as_ref() {
        let client = OllamaClient::new(host.clone(), config.llm_model.clone());
        info!(model = %client.model_name(), "Using Ollama LLM provider");
        return Some(Arc::new(client));
    }

    info!("No LLM provider configured - orchestrator will use the fallback tier");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiKeys, EmbeddingsConfig};
    use std::path::PathBuf;

    fn config_with(api: ApiKeys) -> EnvConfig {
        EnvConfig {
            host: "127.0.0.1".into(),
            port: 8000,
            data_dir: PathBuf::from("./data"),
            config_dir: PathBuf::from("./config"),
            api_keys_table: "test-key:basic".into(),
            environment: "test".into(),
            llm_model: None,
            banking_api_url: None,
            push_relay_url: None,
            api,
            embeddings: EmbeddingsConfig::default(),
        }
    }

    #[test]
    fn test_no_provider_without_keys() {
        let config = config_with(ApiKeys::default());
        assert!(create_client(&config).is_none());
    }

    #[test]
    fn test_openai_preferred_over_ollama() {
        let config = config_with(ApiKeys {
            openai: Some("sk-test".into()),
            ollama: Some("http://localhost:11434".into()),
            banking: None,
        });
        let client = create_client(&config).unwrap();
        assert_eq!(client.provider_type(), super::super::Provider::OpenAi);
    }
}
