//! `LlmClient` trait: abstraction over LLM backends.
//!
//! Providers (OpenAI-compatible, Anthropic) implement this trait so the
//! command synthesizer can be configured to use any supported backend via
//! the `[llm] provider` config field.

use anyhow::Result;
use async_trait::async_trait;

use super::LlmResponse;

/// Text in, text out. May fail; may return something unexecutable.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Sends one system prompt and one user message, returns the reply text.
    async fn complete(&self, system_prompt: &str, user_message: &str) -> Result<LlmResponse>;

    /// Human-readable description of the provider and model.
    ///
    /// Used in startup logs, e.g. `"openai (gpt-4o-mini)"`.
    fn description(&self) -> String;
}
