//! OpenAI-compatible chat completions provider.
//!
//! Calls `POST {base_url}/chat/completions`. Works with the OpenAI API and
//! with proxies that mirror it (the default base URL is an AI proxy that
//! accepts the `AIPROXY_TOKEN` bearer token).
//!
//! Differences from Anthropic:
//! - System prompt is sent as a `role: "system"` message.
//! - Reply text lives in `choices[0].message.content`.
//! - Token usage is `prompt_tokens` / `completion_tokens`.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::client::LlmClient;
use super::{LlmResponse, Message};
use crate::config::LlmConfig;

/// Default API base URL.
const DEFAULT_OPENAI_URL: &str = "https://aiproxy.sanand.workers.dev/openai/v1";

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
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

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// Client for OpenAI-compatible chat completion endpoints.
pub struct OpenAiClient {
    client: Client,
    config: LlmConfig,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(config: LlmConfig) -> Self {
        let client = super::http_client(&config);
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Self {
            client,
            config,
            base_url,
        }
    }
}

/// Extracts the first choice's text and token usage.
fn parse_response(resp: ChatResponse) -> Result<LlmResponse> {
    let text = resp
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| anyhow!("Chat completion returned no content"))?;

    let (input_tokens, output_tokens) = resp
        .usage
        .map(|u| (u.prompt_tokens, u.completion_tokens))
        .unwrap_or((0, 0));

    Ok(LlmResponse {
        text,
        input_tokens,
        output_tokens,
    })
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, system_prompt: &str, user_message: &str) -> Result<LlmResponse> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![Message::system(system_prompt), Message::user(user_message)],
            max_tokens: self.config.max_tokens_per_request,
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!("Calling chat completions ({}) at {url}", self.config.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            anyhow::bail!("Chat completions API error ({status}): {body}");
        }

        let resp = parse_response(response.json().await?)?;
        info!(
            "LLM response: {} in / {} out tokens",
            resp.input_tokens, resp.output_tokens
        );
        Ok(resp)
    }

    fn description(&self) -> String {
        format!("openai ({})", self.config.model)
    }
}
