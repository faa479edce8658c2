pub mod anthropic;
pub mod client;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;

pub use anthropic::AnthropicClient;
pub use client::LlmClient;
pub use openai::OpenAiClient;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: content.to_string(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
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

fn http_client(config: &LlmConfig) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Builds the configured provider, or `None` when no API key is set.
pub fn build_client(config: &LlmConfig) -> anyhow::Result<Option<Arc<dyn LlmClient>>> {
    if !config.has_api_key() {
        return Ok(None);
    }

    let client: Arc<dyn LlmClient> = match config.provider.as_str() {
        "openai" => Arc::new(OpenAiClient::new(config.clone())),
        "anthropic" => Arc::new(AnthropicClient::new(config.clone())),
        other => bail!("Unsupported LLM provider: '{other}'. Supported: 'openai', 'anthropic'."),
    };
    Ok(Some(client))
}
