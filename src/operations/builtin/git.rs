use std::process::Stdio;

use anyhow::{bail, Context};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use crate::operations::{Operation, OperationContext};

/// Builtin operation: `git clone <url> <dest>` into the sandbox.
pub struct CloneRepoOperation {
    url: String,
    dest: String,
}

impl CloneRepoOperation {
    pub fn new(url: impl Into<String>, dest: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            dest: dest.into(),
        }
    }
}

#[async_trait]
impl Operation for CloneRepoOperation {
    fn name(&self) -> &str {
        "clone_repo"
    }

    fn keyword(&self) -> &str {
        "clone repo"
    }

    fn description(&self) -> &str {
        "Clone the configured git repository into the data directory."
    }

    async fn execute(&self, context: &OperationContext<'_>) -> anyhow::Result<String> {
        context.sandbox.validate(&self.dest)?;

        info!("Cloning {} into {}", self.url, self.dest);
        let output = Command::new("git")
            .arg("clone")
            .arg("--")
            .arg(&self.url)
            .arg(&self.dest)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .context("Cannot start git")?;

        if !output.status.success() {
            bail!(
                "Git clone failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok("Repository cloned successfully.".to_string())
    }
}
