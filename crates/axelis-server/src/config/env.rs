// crates/axelis-server/src/config/env.rs
// Environment-based configuration - single source of truth for all env vars

use std::path::PathBuf;
use tracing::{debug, warn};

/// API keys and provider endpoints loaded from environment variables
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// OpenAI API key (OPENAI_API_KEY) — LLM reasoning + embeddings
    pub openai: Option<String>,
    /// Ollama host (OLLAMA_HOST) — local models, no key needed
    pub ollama: Option<String>,
    /// Banking API bearer token (BANKING_API_KEY)
    pub banking: Option<String>,
}

impl ApiKeys {
    /// Load API keys from environment variables (single source of truth)
    ///
    /// Set `AXELIS_DISABLE_LLM=1` to suppress all LLM keys (forces the
    /// fallback reasoning tier everywhere)
    pub fn from_env() -> Self {
        if parse_bool_env("AXELIS_DISABLE_LLM").unwrap_or(false) {
            debug!("AXELIS_DISABLE_LLM is set — LLM providers disabled, using fallbacks");
            return Self {
                openai: None,
                ollama: None,
                banking: Self::read_key("BANKING_API_KEY"),
            };
        }

        let keys = Self {
            openai: Self::read_key("OPENAI_API_KEY"),
            ollama: Self::read_key("OLLAMA_HOST"),
            banking: Self::read_key("BANKING_API_KEY"),
        };
        keys.log_status();
        keys
    }

    /// Read a single API key from environment, filtering empty values
    fn read_key(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|k| !k.trim().is_empty())
    }

    /// Check if any LLM provider is available
    pub fn has_llm_provider(&self) -> bool {
        self.openai.is_some() || self.ollama.is_some()
    }

    /// Log which API keys are available (without exposing values)
    fn log_status(&self) {
        let mut available = Vec::new();
        if self.openai.is_some() {
            available.push("OpenAI");
        }
        if self.ollama.is_some() {
            available.push("Ollama");
        }
        if self.banking.is_some() {
            available.push("Banking API");
        }

        if available.is_empty() {
            warn!("No API keys configured - reasoning will run in fallback mode");
        } else {
            debug!(keys = ?available, "API keys loaded");
        }
    }
}

/// Embeddings configuration from environment variables
#[derive(Debug, Clone, Default)]
pub struct EmbeddingsConfig {
    /// Custom embedding dimensions (AXELIS_EMBEDDING_DIMENSIONS)
    pub dimensions: Option<usize>,
    /// Ollama embedding model override (AXELIS_OLLAMA_EMBEDDING_MODEL)
    pub ollama_embedding_model: Option<String>,
}

impl EmbeddingsConfig {
    pub fn from_env() -> Self {
        let dimensions = std::env::var("AXELIS_EMBEDDING_DIMENSIONS")
            .ok()
            .and_then(|d| d.parse().ok());

        if let Some(dims) = dimensions {
            debug!(dimensions = dims, "Custom embedding dimensions configured");
        }

        Self {
            dimensions,
            ollama_embedding_model: std::env::var("AXELIS_OLLAMA_EMBEDDING_MODEL").ok(),
        }
    }
}

/// Full server configuration assembled at startup
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding the SQLite databases
    pub data_dir: PathBuf,
    /// Directory holding the YAML pack/agent/tenant configuration
    pub config_dir: PathBuf,
    /// Raw `key:role` pairs for the API-key table (API_KEYS)
    pub api_keys_table: String,
    /// Deployment tag surfaced in health/metrics (AXELIS_ENV)
    pub environment: String,
    /// LLM chat model override (AXELIS_LLM_MODEL)
    pub llm_model: Option<String>,
    /// External banking API base URL (BANKING_API_URL)
    pub banking_api_url: Option<String>,
    /// Push-notification relay URL for webhook fanout (PUSH_RELAY_URL)
    pub push_relay_url: Option<String>,
    pub api: ApiKeys,
    pub embeddings: EmbeddingsConfig,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("AXELIS_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("AXELIS_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),
            data_dir: std::env::var("AXELIS_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            config_dir: std::env::var("AXELIS_CONFIG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./config")),
            api_keys_table: std::env::var("API_KEYS")
                .unwrap_or_else(|_| "test-key:basic,admin-key:admin".to_string()),
            environment: std::env::var("AXELIS_ENV").unwrap_or_else(|_| "development".to_string()),
            llm_model: std::env::var("AXELIS_LLM_MODEL").ok(),
            banking_api_url: std::env::var("BANKING_API_URL").ok(),
            push_relay_url: std::env::var("PUSH_RELAY_URL").ok(),
            api: ApiKeys::from_env(),
            embeddings: EmbeddingsConfig::from_env(),
        }
    }
}

/// Parse a boolean environment variable ("1", "true", "yes" are truthy)
pub fn parse_bool_env(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
}
