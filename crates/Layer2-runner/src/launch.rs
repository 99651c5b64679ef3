//! Process launcher - starts a task through the control-plane CLI and
//! extracts the spawned task id from its output

use crate::task::RunOptions;
use lazy_static::lazy_static;
use regex::Regex;
use relay_foundation::{Error, Result};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Environment variable carrying the model for the launched task
pub const MODEL_ENV_VAR: &str = "ANTHROPIC_MODEL";

lazy_static! {
    static ref TASK_SPAWNED: Regex =
        Regex::new(r"Task spawned: ((?:task-)?[a-z]+-[a-z]+-[a-z0-9]+)").unwrap();
}

/// Extract the task id from launch output, if present.
pub fn parse_task_id(stdout: &str) -> Option<&str> {
    TASK_SPAWNED
        .captures(stdout)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Launches task processes through the control-plane CLI
#[derive(Debug, Clone)]
pub struct Launcher {
    program: PathBuf,
}

impl Launcher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Build the `task run` argument vector for one run.
    pub fn build_args(&self, options: &RunOptions, context: &str) -> Vec<String> {
        let mut args = vec![
            "task".to_string(),
            "run".to_string(),
            "--output-format".to_string(),
            options.effective_output_format().to_string(),
        ];

        if let Some(schema) = options.schema_argument() {
            args.push("--json-schema".to_string());
            args.push(schema);
        }

        args.push(context.to_string());
        args
    }

    /// Start the task process and wait for it to print the spawned task id.
    ///
    /// The launch process itself is short-lived: it registers the task and
    /// exits, leaving the task running under the control plane.
    pub async fn launch(&self, context: &str, options: &RunOptions) -> Result<String> {
        let args = self.build_args(options, context);
        debug!("Launching: {} {:?}", self.program.display(), args);

        let output = Command::new(&self.program)
            .args(&args)
            .current_dir(&options.working_dir)
            .env(MODEL_ENV_VAR, &options.model)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::spawn(format!("{} task run", self.program.display()), e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::launch(
                output.status.code(),
                stderr.trim().to_string(),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match parse_task_id(&stdout) {
            Some(task_id) => Ok(task_id.to_string()),
            None => Err(Error::launch(
                Some(0),
                format!("Could not parse task ID from output: {}", stdout),
            )),
        }
    }
}
