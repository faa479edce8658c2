//! Builtin operation: extract the sender address of an email with the LLM.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tracing::{info, warn};

use super::write_output;
use crate::error::DispatchError;
use crate::llm::LlmClient;
use crate::operations::{Operation, OperationContext};

const SYSTEM_PROMPT: &str = "Extract the sender's email from this email message.";

pub struct EmailSenderOperation {
    llm: Option<Arc<dyn LlmClient>>,
    input: String,
    output: String,
}

impl EmailSenderOperation {
    /// Without an LLM the operation still routes, but fails with `ModelUnavailable`.
    pub fn new(
        llm: Option<Arc<dyn LlmClient>>,
        input: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            input: input.into(),
            output: output.into(),
        }
    }
}

#[async_trait]
impl Operation for EmailSenderOperation {
    fn name(&self) -> &str {
        "email_sender"
    }

    fn keyword(&self) -> &str {
        "email sender"
    }

    fn description(&self) -> &str {
        "Extract the sender's address from the configured email with the LLM."
    }

    async fn execute(&self, context: &OperationContext<'_>) -> anyhow::Result<String> {
        context.sandbox.validate_all(&[self.input.as_str(), self.output.as_str()])?;

        let llm = self.llm.as_ref().ok_or_else(|| {
            DispatchError::ModelUnavailable("no LLM API key configured".to_string())
        })?;

        let email = tokio::fs::read_to_string(&self.input)
            .await
            .with_context(|| format!("Cannot read {}", self.input))?;

        let response = llm.complete(SYSTEM_PROMPT, &email).await.map_err(|e| {
            warn!("LLM call failed: {e:#}");
            DispatchError::Model(format!("{e:#}"))
        })?;
        let sender = response.text.trim();
        if sender.is_empty() {
            return Err(DispatchError::Model("model returned no sender".to_string()).into());
        }

        write_output(&self.output, sender.as_bytes()).await?;
        info!("Extracted sender {sender} from {}", self.input);
        Ok(format!("Sender extracted: {sender}"))
    }
}
