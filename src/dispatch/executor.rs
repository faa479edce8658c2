//! Runs synthesized commands in a child process.
//!
//! By default every command line goes to `<shell> -c`. Setting
//! `allowed_programs` or disabling `allow_raw_shell` switches to policy
//! mode: plain invocations start the program directly and shell lines are
//! refused.
//!
//! Each execution holds a semaphore permit, is bounded by a timeout (the
//! child is killed when it expires) and keeps at most `max_output_bytes` of
//! stdout and of stderr; the excess is drained so the child never blocks on
//! a full pipe.
//!
//! The working directory is the sandbox root, but the child is NOT confined
//! to it: the path sandbox only applies to operations run in-process.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::synthesizer::SynthesizedCommand;
use crate::config::ExecutorConfig;
use crate::error::{DispatchError, Result};

/// Captured result of a finished child process.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// -1 when the process was terminated by a signal
    pub exit_code: i32,
    pub truncated: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

pub struct ProcessExecutor {
    config: ExecutorConfig,
    working_dir: Option<PathBuf>,
    permits: Arc<Semaphore>,
}

impl ProcessExecutor {
    pub fn new(config: &ExecutorConfig, working_dir: Option<PathBuf>) -> Self {
        Self {
            config: config.clone(),
            working_dir,
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
        }
    }

    /// True when synthesized commands are checked before they run.
    ///
    /// With no allow-list and raw shell lines permitted, every reply runs
    /// through the shell, so builtins and `VAR=value` prefixes work.
    fn enforces_policy(&self) -> bool {
        !self.config.allow_raw_shell || !self.config.allowed_programs.is_empty()
    }

    /// Refuses commands the configured policy does not allow.
    fn build_command(&self, command: &SynthesizedCommand) -> Result<Command> {
        if !self.enforces_policy() {
            let mut cmd = Command::new(&self.config.shell);
            cmd.arg("-c").arg(command.command_line());
            return Ok(cmd);
        }

        match command {
            SynthesizedCommand::Program { program, args } => {
                if !self.config.allowed_programs.is_empty()
                    && !self.config.allowed_programs.iter().any(|p| p == program)
                {
                    return Err(DispatchError::Execution(format!(
                        "program '{program}' is not in the allowed list"
                    )));
                }
                let mut cmd = Command::new(program);
                cmd.args(args);
                Ok(cmd)
            }
            SynthesizedCommand::RawShell(line) => {
                if !self.config.allow_raw_shell {
                    return Err(DispatchError::Execution(format!(
                        "shell command lines are disabled: {line}"
                    )));
                }
                Err(DispatchError::Execution(format!(
                    "shell command lines cannot be checked against the allowed list: {line}"
                )))
            }
        }
    }

    /// Runs `command` to completion and captures its output.
    ///
    /// A non-zero exit is NOT an error here; callers inspect `exit_code`.
    pub async fn execute(&self, command: &SynthesizedCommand) -> Result<ProcessOutput> {
        let mut cmd = self.build_command(command)?;

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| DispatchError::Execution(format!("executor closed: {e}")))?;

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let line = command.command_line();
        debug!("Spawning: {line}");
        let mut child = cmd
            .spawn()
            .map_err(|e| DispatchError::Execution(format!("cannot start '{line}': {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DispatchError::Execution("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DispatchError::Execution("stderr not captured".to_string()))?;

        let limit = self.config.max_output_bytes;
        let run = async {
            let (out, err, status) = tokio::join!(
                read_capped(stdout, limit),
                read_capped(stderr, limit),
                child.wait()
            );
            Ok::<_, std::io::Error>((out?, err?, status?))
        };

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let ((stdout, out_truncated), (stderr, err_truncated), status) =
            match tokio::time::timeout(timeout, run).await {
                Ok(result) => result?,
                Err(_) => {
                    let _ = child.kill().await;
                    warn!("Command timed out after {}s: {line}", self.config.timeout_secs);
                    return Err(DispatchError::Execution(format!(
                        "command timed out after {}s",
                        self.config.timeout_secs
                    )));
                }
            };

        let truncated = out_truncated || err_truncated;
        if truncated {
            warn!("Output of '{line}' truncated at {limit} bytes");
        }

        let output = ProcessOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code: status.code().unwrap_or(-1),
            truncated,
        };
        info!("Command exited with {}: {line}", output.exit_code);
        Ok(output)
    }
}

/// Reads `reader` to EOF, keeping the first `limit` bytes.
async fn read_capped<R: AsyncRead + Unpin>(
    mut reader: R,
    limit: usize,
) -> std::io::Result<(Vec<u8>, bool)> {
    let mut kept = Vec::new();
    let mut buf = [0u8; 8192];
    let mut truncated = false;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(kept.len());
        kept.extend_from_slice(&buf[..n.min(room)]);
        if n > room {
            truncated = true;
        }
    }
    Ok((kept, truncated))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn executor(config: ExecutorConfig) -> ProcessExecutor {
        ProcessExecutor::new(&config, None)
    }

    fn shell(line: &str) -> SynthesizedCommand {
        SynthesizedCommand::RawShell(line.to_string())
    }

    #[tokio::test]
    async fn test_program_stdout_and_exit_code() {
        let output = executor(ExecutorConfig::default())
            .execute(&SynthesizedCommand::classify("echo hi"))
            .await
            .unwrap();
        assert_eq!(output.stdout, "hi\n");
        assert_eq!(output.stderr, "");
        assert!(output.success());
        assert!(!output.truncated);
    }

    #[tokio::test]
    async fn test_raw_shell_nonzero_exit() {
        let output = executor(ExecutorConfig::default())
            .execute(&shell("echo out; echo oops >&2; exit 3"))
            .await
            .unwrap();
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "oops\n");
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_missing_program_through_shell() {
        let output = executor(ExecutorConfig::default())
            .execute(&SynthesizedCommand::classify("definitely-not-a-real-program-xyz"))
            .await
            .unwrap();
        assert_eq!(output.exit_code, 127);
        assert!(output.stderr.contains("definitely-not-a-real-program-xyz"));
    }

    #[tokio::test]
    async fn test_missing_program_in_policy_mode_is_execution_error() {
        let config = ExecutorConfig {
            allow_raw_shell: false,
            ..ExecutorConfig::default()
        };
        let err = executor(config)
            .execute(&SynthesizedCommand::classify("definitely-not-a-real-program-xyz"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Execution(_)));
        assert!(err.to_string().contains("cannot start"));
    }

    #[tokio::test]
    async fn test_default_policy_runs_builtins_and_assignments() {
        let exec = executor(ExecutorConfig::default());
        for line in ["export FOO=1", "cd /", "ulimit -n"] {
            let output = exec.execute(&SynthesizedCommand::classify(line)).await.unwrap();
            assert!(output.success(), "{line}: {}", output.stderr);
        }
        let output = exec
            .execute(&SynthesizedCommand::classify("FOO=bar env"))
            .await
            .unwrap();
        assert!(output.stdout.contains("FOO=bar"));
    }

    #[tokio::test]
    async fn test_policy_mode_starts_programs_directly() {
        let config = ExecutorConfig {
            allow_raw_shell: false,
            ..ExecutorConfig::default()
        };
        // `export` is a shell builtin, not a program on PATH
        let err = executor(config)
            .execute(&SynthesizedCommand::classify("export FOO=1"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot start"));
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let config = ExecutorConfig {
            timeout_secs: 1,
            ..ExecutorConfig::default()
        };
        let started = std::time::Instant::now();
        let err = executor(config)
            .execute(&SynthesizedCommand::classify("sleep 10"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out after 1s"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_output_is_capped() {
        let config = ExecutorConfig {
            max_output_bytes: 16,
            ..ExecutorConfig::default()
        };
        let output = executor(config)
            .execute(&shell("head -c 100000 /dev/zero | tr '\\0' 'a'"))
            .await
            .unwrap();
        assert_eq!(output.stdout, "a".repeat(16));
        assert!(output.truncated);
        assert!(output.success());
    }

    #[tokio::test]
    async fn test_raw_shell_disabled() {
        let config = ExecutorConfig {
            allow_raw_shell: false,
            ..ExecutorConfig::default()
        };
        let exec = executor(config);
        let err = exec.execute(&shell("echo a | cat")).await.unwrap_err();
        assert!(err.to_string().contains("shell command lines are disabled"));
        // Plain programs still run
        assert!(exec
            .execute(&SynthesizedCommand::classify("echo a"))
            .await
            .unwrap()
            .success());
    }

    #[tokio::test]
    async fn test_allowed_programs() {
        let config = ExecutorConfig {
            allowed_programs: vec!["echo".to_string()],
            ..ExecutorConfig::default()
        };
        let exec = executor(config);
        assert!(exec
            .execute(&SynthesizedCommand::classify("echo ok"))
            .await
            .is_ok());
        let err = exec
            .execute(&SynthesizedCommand::classify("ls /"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not in the allowed list"));
        assert!(exec.execute(&shell("echo a | cat")).await.is_err());
    }

    #[tokio::test]
    async fn test_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let exec = ProcessExecutor::new(&ExecutorConfig::default(), Some(dir.path().to_path_buf()));
        let output = exec.execute(&SynthesizedCommand::classify("ls")).await.unwrap();
        assert!(output.stdout.contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_read_capped_exact_limit() {
        let (kept, truncated) = read_capped(&b"abcd"[..], 4).await.unwrap();
        assert_eq!(kept, b"abcd");
        assert!(!truncated);
        let (kept, truncated) = read_capped(&b"abcde"[..], 4).await.unwrap();
        assert_eq!(kept, b"abcd");
        assert!(truncated);
    }
}
