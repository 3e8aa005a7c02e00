//! `LlmClient` trait — abstraction over LLM backends.
//!
//! Providers (Anthropic, Ollama, offline) implement this trait so the
//! tutor can be configured to use any supported backend via the
//! `[llm] provider` config field.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A single conversation turn sent to the provider.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// LLM response with metadata
#[derive(Debug)]
pub struct LlmResponse {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmResponse {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Abstraction over LLM backends.
///
/// Each provider translates the shared message type into its own
/// wire format and normalizes responses back into [`LlmResponse`].
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Sends a conversation to the LLM and returns the response.
    async fn complete(&self, system_prompt: &str, messages: &[Message]) -> Result<LlmResponse>;

    /// Human-readable description of the provider and model.
    ///
    /// Used in status output, e.g. `"anthropic (claude-haiku-4-5)"`.
    fn description(&self) -> String;

    /// One-shot generation: `prompt` becomes the single user turn and
    /// `instruction` the system prompt. Empty completions are errors.
    async fn generate(&self, prompt: &str, instruction: &str) -> Result<String> {
        let response = self.complete(instruction, &[Message::user(prompt)]).await?;
        debug!(
            "{}: {} tokens ({} in / {} out)",
            self.description(),
            response.total_tokens(),
            response.input_tokens,
            response.output_tokens
        );
        let text = response.text.trim();
        if text.is_empty() {
            anyhow::bail!("{} returned an empty completion", self.description());
        }
        Ok(text.to_string())
    }
}

/// Provider used when no LLM is reachable. Every call fails, so each
/// teaching strategy falls back to its canned message.
pub struct OfflineClient;

#[async_trait]
impl LlmClient for OfflineClient {
    async fn complete(&self, _system_prompt: &str, _messages: &[Message]) -> Result<LlmResponse> {
        anyhow::bail!("LLM provider is offline")
    }

    fn description(&self) -> String {
        "offline".to_string()
    }
}
