//! Shared fixtures for unit tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;

use crate::config::SandboxConfig;
use crate::llm::{LlmClient, LlmResponse};
use crate::sandbox::PathSandbox;

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// A lexical sandbox rooted at `dir`.
pub fn sandbox_in(dir: &Path) -> PathSandbox {
    PathSandbox::new(&SandboxConfig {
        root: format!("{}/", dir.display()),
        ..SandboxConfig::default()
    })
}

/// Scripted LLM that records how it was called.
pub struct StubLlm {
    reply: Result<String, String>,
    calls: AtomicUsize,
    last_user_message: Mutex<String>,
}

impl StubLlm {
    pub fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
            last_user_message: Mutex::new(String::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(message.to_string()),
            calls: AtomicUsize::new(0),
            last_user_message: Mutex::new(String::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_user_message(&self) -> String {
        self.last_user_message.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for StubLlm {
    async fn complete(&self, _system_prompt: &str, user_message: &str) -> anyhow::Result<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_user_message.lock().unwrap() = user_message.to_string();
        match &self.reply {
            Ok(text) => Ok(LlmResponse {
                text: text.clone(),
                input_tokens: 0,
                output_tokens: 0,
            }),
            Err(message) => Err(anyhow::anyhow!("{message}")),
        }
    }

    fn description(&self) -> String {
        "stub".to_string()
    }
}
