//! Control-plane boundary - status and log-path queries for running tasks

use async_trait::async_trait;
use relay_foundation::{Error, Result};
use std::path::PathBuf;
use tokio::process::Command;

/// Marker the control plane prints for a task it does not know yet
pub const TASK_NOT_FOUND: &str = "Task not found";

/// Queries the control plane about a running task
///
/// Implementations are expected to be cheap to call repeatedly; every
/// caller in this crate treats a failed query as transient and retries on
/// the next tick.
#[async_trait]
pub trait TaskControl: Send + Sync {
    /// Free-text status for a task. Contains `Status:     completed` or
    /// `Status:     failed` once the task is terminal, and optionally an
    /// `Error: <text>` line on failure.
    async fn status(&self, task_id: &str) -> Result<String>;

    /// Absolute path of the task's append-only log file.
    async fn log_path(&self, task_id: &str) -> Result<PathBuf>;
}

/// Control plane reached by shelling out to the CLI
pub struct CliControl {
    program: PathBuf,
}

impl CliControl {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                Error::spawn(
                    format!("{} {}", self.program.display(), args.join(" ")),
                    e,
                )
            })?;

        if !output.status.success() {
            return Err(Error::Internal(format!(
                "{} {} exited with code {:?}",
                self.program.display(),
                args.join(" "),
                output.status.code()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl TaskControl for CliControl {
    async fn status(&self, task_id: &str) -> Result<String> {
        self.run(&["status", task_id]).await
    }

    async fn log_path(&self, task_id: &str) -> Result<PathBuf> {
        let stdout = self.run(&["get-log-path", task_id]).await?;
        let path = stdout.trim();
        if path.is_empty() {
            return Err(Error::NotFound(format!("No log path for task {}", task_id)));
        }
        Ok(PathBuf::from(path))
    }
}
