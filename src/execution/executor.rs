//! Step executor - runs one command with timeout and captured output

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Failed to spawn command: {0}")]
    Spawn(std::io::Error),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Captured result of one executed command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs shell commands to completion, or until timeout or cancellation
/// terminates the underlying process. No implicit retries.
#[derive(Clone)]
pub struct StepExecutor {
    cancel: watch::Receiver<bool>,
}

impl StepExecutor {
    /// `cancel` flips to true when the run is aborted; in-flight commands
    /// are killed.
    pub fn new(cancel: watch::Receiver<bool>) -> Self {
        Self { cancel }
    }

    /// Executor that can never be cancelled (standalone uses)
    pub fn detached() -> Self {
        let (_tx, rx) = watch::channel(false);
        // Sender drops here; `cancelled` treats a closed channel as
        // never-cancelled
        Self { cancel: rx }
    }

    /// Execute a command under `sh -c` in `workdir` with `env` overlaid on
    /// the process environment.
    pub async fn execute(
        &self,
        command: &str,
        timeout_secs: u64,
        workdir: &Path,
        env: &HashMap<String, String>,
    ) -> Result<CommandOutput, ExecError> {
        let start = std::time::Instant::now();
        info!(command, workdir = %workdir.display(), "Executing command");

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(workdir)
            .envs(env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(ExecError::Spawn)?;

        // Drain both pipes concurrently so the child never blocks on a
        // full pipe buffer.
        let stdout_handle = collect_lines(child.stdout.take());
        let stderr_handle = collect_lines(child.stderr.take());

        let mut cancel = self.cancel.clone();
        let status = tokio::select! {
            status = child.wait() => status?,
            _ = tokio::time::sleep(Duration::from_secs(timeout_secs)) => {
                warn!(command, timeout_secs, "Command timed out, killing process");
                let _ = child.kill().await;
                return Err(ExecError::Timeout(timeout_secs));
            }
            _ = cancelled(&mut cancel) => {
                warn!(command, "Run aborted, killing process");
                let _ = child.kill().await;
                return Err(ExecError::Cancelled);
            }
        };

        let stdout = stdout_handle.await.unwrap_or_default();
        let stderr = stderr_handle.await.unwrap_or_default();

        let exit_code = status.code().unwrap_or(-1);
        let duration = start.elapsed();
        if exit_code == 0 {
            debug!(command, exit_code, ?duration, "Command completed");
        } else {
            error!(command, exit_code, "Command failed");
        }

        Ok(CommandOutput {
            exit_code,
            stdout,
            stderr,
            duration,
        })
    }
}

/// Resolves when cancellation is requested; never resolves if the abort
/// handle has been dropped without firing.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn collect_lines<R>(pipe: Option<R>) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut collected = String::new();
        if let Some(pipe) = pipe {
            let mut lines = BufReader::new(pipe).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                collected.push_str(&line);
                collected.push('\n');
            }
        }
        collected
    })
}
