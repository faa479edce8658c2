use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::client::LlmClient;
use super::{LlmResponse, Message};
use crate::config::LlmConfig;

const DEFAULT_ANTHROPIC_URL: &str = "https://api.anthropic.com";

/// Client for Anthropic Messages API
pub struct AnthropicClient {
    client: Client,
    config: LlmConfig,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

impl AnthropicClient {
    pub fn new(config: LlmConfig) -> Self {
        let client = super::http_client(&config);
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_ANTHROPIC_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Self {
            client,
            config,
            base_url,
        }
    }
}

/// Concatenates the text blocks of a Messages API response.
fn collect_text(resp: &MessagesResponse) -> String {
    resp.content
        .iter()
        .filter_map(|block| {
            if block.block_type == "text" {
                block.text.clone()
            } else {
                None
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, system_prompt: &str, user_message: &str) -> Result<LlmResponse> {
        let request = MessagesRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens_per_request,
            system: system_prompt.to_string(),
            messages: vec![Message::user(user_message)],
        };

        debug!("Calling Anthropic API ({})", self.config.model);

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            anyhow::bail!("Claude API error ({status}): {body}");
        }

        let resp: MessagesResponse = response.json().await?;
        let text = collect_text(&resp);

        let (input_tokens, output_tokens) = resp
            .usage
            .map(|u| (u.input_tokens, u.output_tokens))
            .unwrap_or((0, 0));

        info!("LLM response: {input_tokens} in / {output_tokens} out tokens");

        Ok(LlmResponse {
            text,
            input_tokens,
            output_tokens,
        })
    }

    fn description(&self) -> String {
        format!("anthropic ({})", self.config.model)
    }
}
