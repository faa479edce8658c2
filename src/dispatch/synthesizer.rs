//! Turns unmatched task text into a command line via the LLM.
//!
//! The model reply is untrusted. It is trimmed and classified, never
//! rewritten: a reply that reads as a plain program invocation becomes
//! `SynthesizedCommand::Program`, anything needing shell interpretation
//! becomes `SynthesizedCommand::RawShell`. The executor decides what each
//! variant is allowed to do; with the default policy both run via the shell.
//!
//! An empty reply is refused as a `Model` error instead of running
//! `sh -c ""`, which would succeed with no output.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::error::{DispatchError, Result};
use crate::llm::LlmClient;

pub const SYSTEM_PROMPT: &str =
    "You are an AI assistant that converts natural language tasks into command-line actions.";

/// Characters that make a line depend on shell parsing.
const SHELL_METACHARACTERS: &[char] = &[
    '|', '&', ';', '<', '>', '(', ')', '$', '`', '\\', '"', '\'', '*', '?', '[', ']', '#', '~',
    '{', '}', '\n', '\r',
];

/// A command produced by the model.
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesizedCommand {
    /// A single program invocation with whitespace-separated arguments.
    Program { program: String, args: Vec<String> },
    /// A line that needs a shell to interpret it.
    RawShell(String),
}

impl SynthesizedCommand {
    /// Classifies an already-trimmed, non-empty model reply.
    pub fn classify(reply: &str) -> Self {
        if reply.contains(SHELL_METACHARACTERS) {
            return SynthesizedCommand::RawShell(reply.to_string());
        }

        let mut words = reply.split_whitespace().map(str::to_string);
        match words.next() {
            Some(program) => SynthesizedCommand::Program {
                program,
                args: words.collect(),
            },
            None => SynthesizedCommand::RawShell(reply.to_string()),
        }
    }

    /// The command as a single line, for logs and error messages.
    pub fn command_line(&self) -> String {
        match self {
            SynthesizedCommand::Program { program, args } if args.is_empty() => program.clone(),
            SynthesizedCommand::Program { program, args } => {
                format!("{program} {}", args.join(" "))
            }
            SynthesizedCommand::RawShell(line) => line.clone(),
        }
    }
}

pub struct CommandSynthesizer {
    llm: Option<Arc<dyn LlmClient>>,
    permits: Arc<Semaphore>,
}

impl CommandSynthesizer {
    /// `llm = None` disables synthesis; every call fails with `ModelUnavailable`.
    pub fn new(llm: Option<Arc<dyn LlmClient>>, max_concurrent: usize) -> Self {
        Self {
            llm,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub fn is_available(&self) -> bool {
        self.llm.is_some()
    }

    pub fn describe(&self) -> String {
        match &self.llm {
            Some(llm) => llm.description(),
            None => "disabled (no API key)".to_string(),
        }
    }

    /// Asks the model for a command equivalent to `task`.
    pub async fn synthesize(&self, task: &str) -> Result<SynthesizedCommand> {
        let llm = self.llm.as_ref().ok_or_else(|| {
            DispatchError::ModelUnavailable(
                "no LLM API key configured; only keyword operations are available".to_string(),
            )
        })?;

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| DispatchError::Model(format!("synthesizer closed: {e}")))?;

        debug!("Synthesizing command for task: {task}");
        let user_message = format!("Convert this task into a structured command: {task}");
        let response = llm
            .complete(SYSTEM_PROMPT, &user_message)
            .await
            .map_err(|e| {
                warn!("LLM call failed: {e:#}");
                DispatchError::Model(format!("{e:#}"))
            })?;

        let reply = response.text.trim();
        if reply.is_empty() {
            return Err(DispatchError::Model("model returned an empty command".to_string()));
        }

        let command = SynthesizedCommand::classify(reply);
        info!("Synthesized command: {}", command.command_line());
        Ok(command)
    }
}
