pub mod anthropic;
pub mod client;
pub mod ollama;

use std::sync::Arc;

use anyhow::Result;

use crate::config::LlmConfig;

pub use anthropic::AnthropicClient;
pub use client::{LlmClient, LlmResponse, Message, OfflineClient};
pub use ollama::OllamaClient;

/// Builds the client named by `[llm] provider`.
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    let client: Arc<dyn LlmClient> = match config.provider.as_str() {
        "anthropic" => Arc::new(AnthropicClient::new(config.clone())?),
        "ollama" => Arc::new(OllamaClient::new(config.clone())?),
        "offline" => Arc::new(OfflineClient),
        other => anyhow::bail!("Unknown LLM provider '{other}'"),
    };
    Ok(client)
}
