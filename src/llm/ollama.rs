//! Ollama API provider.
//!
//! Calls `POST {host}/api/chat` with an Ollama-native request format.
//!
//! Key differences from Anthropic:
//! - System prompt is sent as a `role: "system"` message (not a top-level field).
//! - Token usage: `prompt_eval_count` / `eval_count` (may be absent).
//! - Must set `stream: false` for synchronous responses.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::client::{LlmClient, LlmResponse, Message};
use crate::config::LlmConfig;

/// Default Ollama API base URL.
const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

// ── Ollama API types ─────────────────────────────────────

/// Ollama `/api/chat` request body.
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
    options: OllamaOptions,
}

/// Ollama generation options.
#[derive(Debug, Serialize)]
struct OllamaOptions {
    num_predict: u32,
}

/// Ollama `/api/chat` response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    content: String,
}

// ── OllamaClient ────────────────────────────────────────

/// Client for the Ollama API.
pub struct OllamaClient {
    client: Client,
    config: LlmConfig,
    host: String,
}

impl OllamaClient {
    /// Creates a new Ollama client from configuration.
    ///
    /// If `config.host` is `None`, defaults to `http://localhost:11434`.
    pub fn new(config: LlmConfig) -> Result<Self> {
        let host = config
            .host
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_HOST.to_string());
        // Strip trailing slash for consistent URL construction
        let host = host.trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            config,
            host,
        })
    }
}

/// Puts the system prompt in front of the conversation as a system turn.
fn build_messages(system_prompt: &str, messages: &[Message]) -> Vec<Message> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if !system_prompt.is_empty() {
        out.push(Message {
            role: "system".to_string(),
            content: system_prompt.to_string(),
        });
    }
    out.extend_from_slice(messages);
    out
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, system_prompt: &str, messages: &[Message]) -> Result<LlmResponse> {
        let request = OllamaChatRequest {
            model: self.config.model.clone(),
            messages: build_messages(system_prompt, messages),
            stream: false,
            options: OllamaOptions {
                num_predict: self.config.max_tokens_per_request,
            },
        };

        let url = format!("{}/api/chat", self.host);

        debug!(
            "Calling Ollama API ({}) with {} messages",
            self.config.model,
            messages.len()
        );

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama API error ({status}): {body}");
        }

        let resp: OllamaChatResponse = response.json().await?;

        let input_tokens = resp.prompt_eval_count.unwrap_or(0);
        let output_tokens = resp.eval_count.unwrap_or(0);

        info!("LLM response: {input_tokens} in / {output_tokens} out tokens");

        Ok(LlmResponse {
            text: resp.message.content,
            input_tokens,
            output_tokens,
        })
    }

    fn description(&self) -> String {
        self.config.description()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(host: Option<&str>) -> LlmConfig {
        LlmConfig {
            provider: "ollama".to_string(),
            model: "llama3.2".to_string(),
            api_key: String::new(),
            max_tokens_per_request: 4096,
            host: host.map(String::from),
            timeout_secs: 30,
        }
    }

    #[test]
    fn test_description() {
        let client = OllamaClient::new(config(None)).unwrap();
        assert_eq!(client.description(), "ollama (llama3.2)");
    }

    #[test]
    fn test_default_host() {
        let client = OllamaClient::new(config(None)).unwrap();
        assert_eq!(client.host, "http://localhost:11434");
    }

    #[test]
    fn test_custom_host() {
        let client = OllamaClient::new(config(Some("http://myserver:11434/"))).unwrap();
        // Trailing slash should be stripped
        assert_eq!(client.host, "http://myserver:11434");
    }

    #[test]
    fn test_system_prompt_becomes_first_message() {
        let messages = build_messages("Be Socratic.", &[Message::user("Hi")]);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[0].content, "Be Socratic.");
        assert_eq!(messages[1].role, "user");
    }

    #[test]
    fn test_empty_system_prompt_omitted() {
        let messages = build_messages("", &[Message::user("Hi")]);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
    }

    #[test]
    fn test_request_serialization() {
        let request = OllamaChatRequest {
            model: "llama3.2".to_string(),
            messages: vec![Message::user("Hello")],
            stream: false,
            options: OllamaOptions { num_predict: 4096 },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "llama3.2");
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["num_predict"], 4096);
        assert_eq!(json["messages"][0]["content"], "Hello");
    }

    #[test]
    fn test_response_parsing() {
        let json = r#"{
            "message": {"role": "assistant", "content": "Hello!"},
            "done_reason": "stop",
            "prompt_eval_count": 100,
            "eval_count": 50
        }"#;
        let resp: OllamaChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.message.content, "Hello!");
        assert_eq!(resp.prompt_eval_count, Some(100));
        assert_eq!(resp.eval_count, Some(50));
    }

    #[test]
    fn test_response_parsing_missing_optional_fields() {
        let json = r#"{"message": {"role": "assistant", "content": "Hi!"}}"#;
        let resp: OllamaChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.message.content, "Hi!");
        assert!(resp.prompt_eval_count.is_none());
        assert!(resp.eval_count.is_none());
    }
}
