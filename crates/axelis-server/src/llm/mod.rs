// crates/axelis-server/src/llm/mod.rs
// LLM provider layer

mod factory;
mod ollama;
mod openai;
mod provider;
mod types;

pub use factory::create_client;
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
pub use provider::{LlmClient, Provider};
pub use types::{ChatResult, Message, Usage};
