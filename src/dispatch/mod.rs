//! The dispatcher, composition root of the service.
//!
//! Routes a task to a keyword-matched operation, or falls back to command
//! synthesis followed by execution. Every path ends in one of five terminal
//! outcomes, all normalized into `ExecutionResult`.

pub mod executor;
pub mod synthesizer;

use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{DispatchError, Result};
use crate::llm;
use crate::operations::{builtin, OperationContext, OperationRegistry};
use crate::sandbox::PathSandbox;

pub use executor::ProcessExecutor;
pub use synthesizer::CommandSynthesizer;

/// Terminal state of one task. Logged, never returned to callers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    MatchedSuccess,
    MatchedError,
    FallbackError,
    ExecutionError,
    FallbackSuccess,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::MatchedSuccess => "matched_success",
            Outcome::MatchedError => "matched_error",
            Outcome::FallbackError => "fallback_error",
            Outcome::ExecutionError => "execution_error",
            Outcome::FallbackSuccess => "fallback_success",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Uniform envelope for every task, whichever path produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub status: Status,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ExecutionResult {
    pub fn success(output: String) -> Self {
        Self {
            status: Status::Success,
            output,
            detail: None,
        }
    }

    /// `output` carries the category message, `detail` the raw diagnostic
    /// (captured stderr for failed commands).
    pub fn failure(err: &DispatchError) -> Self {
        Self {
            status: Status::Error,
            output: err.to_string(),
            detail: Some(err.detail()),
        }
    }
}

pub struct Dispatcher {
    registry: OperationRegistry,
    sandbox: PathSandbox,
    synthesizer: CommandSynthesizer,
    executor: ProcessExecutor,
}

impl Dispatcher {
    pub fn new(
        registry: OperationRegistry,
        sandbox: PathSandbox,
        synthesizer: CommandSynthesizer,
        executor: ProcessExecutor,
    ) -> Self {
        Self {
            registry,
            sandbox,
            synthesizer,
            executor,
        }
    }

    /// Builds every component from configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let sandbox = PathSandbox::new(&config.sandbox);

        let llm = llm::build_client(&config.llm)?;

        let mut registry =
            OperationRegistry::new().with_case_insensitive(config.routing.case_insensitive);
        builtin::register_all(&mut registry, &config.operations, llm.clone())?;

        let synthesizer = CommandSynthesizer::new(llm, config.llm.max_concurrent);

        let root = Path::new(sandbox.root());
        let working_dir = root.is_dir().then(|| root.to_path_buf());
        if working_dir.is_none() {
            warn!("Sandbox root {} does not exist, commands run in the current directory", sandbox.root());
        }
        let executor = ProcessExecutor::new(&config.executor, working_dir);

        Ok(Self::new(registry, sandbox, synthesizer, executor))
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    pub fn synthesizer(&self) -> &CommandSynthesizer {
        &self.synthesizer
    }

    /// Runs a task and normalizes the result into the envelope.
    pub async fn run(&self, task: &str) -> ExecutionResult {
        match self.try_run(task).await {
            Ok(output) => ExecutionResult::success(output),
            Err(e) => ExecutionResult::failure(&e),
        }
    }

    /// Runs a task, keeping the error category for the caller.
    pub async fn try_run(&self, task: &str) -> Result<String> {
        let (outcome, result) = self.route(task).await;
        match &result {
            Ok(output) => info!(
                outcome = outcome.as_str(),
                "Task completed ({} bytes of output)",
                output.len()
            ),
            Err(e) => warn!(outcome = outcome.as_str(), category = e.category(), "Task failed: {e}"),
        }
        result
    }

    async fn route(&self, task: &str) -> (Outcome, Result<String>) {
        if let Some(operation) = self.registry.dispatch(task) {
            info!(operation = operation.name(), "Task matched keyword {:?}", operation.keyword());
            let context = OperationContext {
                sandbox: &self.sandbox,
                task,
            };
            return match operation.execute(&context).await {
                Ok(output) => (Outcome::MatchedSuccess, Ok(output)),
                Err(e) => (Outcome::MatchedError, Err(operation_error(operation.name(), e))),
            };
        }

        debug!("No operation matched, falling back to command synthesis");
        let command = match self.synthesizer.synthesize(task).await {
            Ok(command) => command,
            Err(e) => return (Outcome::FallbackError, Err(e)),
        };

        let output = match self.executor.execute(&command).await {
            Ok(output) => output,
            Err(e) => return (Outcome::ExecutionError, Err(e)),
        };

        if !output.success() {
            return (Outcome::ExecutionError, Err(DispatchError::Execution(output.stderr)));
        }
        (Outcome::FallbackSuccess, Ok(output.stdout))
    }

    /// Returns the full text of a sandboxed file.
    pub async fn read(&self, path: &str) -> Result<String> {
        let path = self.sandbox.validate(path)?;
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(DispatchError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Keeps sandbox and other typed failures raised inside an operation; wraps the rest.
fn operation_error(operation: &str, err: anyhow::Error) -> DispatchError {
    match err.downcast::<DispatchError>() {
        Ok(typed) => typed,
        Err(err) => DispatchError::Operation {
            operation: operation.to_string(),
            message: format!("{err:#}"),
        },
    }
}
