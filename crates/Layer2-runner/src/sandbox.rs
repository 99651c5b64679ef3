//! Sandbox capability - isolated execution of task commands
//!
//! The isolated variant replaces the launch/tail/poll pipeline with a
//! process spawned inside a managed execution context: output arrives as
//! raw stream chunks and completion is driven by the process exit event.

use crate::task::RunOptions;
use async_trait::async_trait;
use relay_foundation::Result;

/// Chunk-level event emitted by a sandboxed process
#[derive(Debug, Clone)]
pub enum SandboxEvent {
    /// Stdout bytes, delivered as they arrive
    Stdout(Vec<u8>),

    /// Stderr bytes; logged, never classified
    Stderr(Vec<u8>),

    /// Process exited with the given code
    Exited(i64),

    /// Process-level failure (could not run, stream broke)
    Failed(String),
}

/// Process-like handle for a command running inside a sandbox
#[async_trait]
pub trait SandboxProcess: Send {
    /// Next event; None once the stream is exhausted.
    async fn next_event(&mut self) -> Option<SandboxEvent>;

    /// Force-terminate the process (used on deadline expiry).
    async fn kill(&mut self) -> Result<()>;
}

/// Spawns commands inside a managed execution context
#[async_trait]
pub trait SandboxManager: Send + Sync {
    /// Spawn `command` inside the context keyed by `context_id`, with the
    /// given environment overrides.
    async fn spawn_in_context(
        &self,
        context_id: &str,
        command: Vec<String>,
        env: Vec<(String, String)>,
    ) -> Result<Box<dyn SandboxProcess>>;
}

/// Build the agent invocation executed inside the sandbox.
///
/// Streaming runs get `--verbose --include-partial-messages` so partial
/// output is observable; the schema is forwarded only on non-streaming
/// `json` runs, matching the host launch path.
pub fn build_sandbox_command(
    agent_command: &[String],
    options: &RunOptions,
    context: &str,
) -> Vec<String> {
    let format = options.effective_output_format();

    let mut command: Vec<String> = agent_command.to_vec();
    command.push("--print".to_string());
    command.push("--dangerously-skip-permissions".to_string());
    command.push("--output-format".to_string());
    command.push(format.to_string());

    if format == "stream-json" {
        command.push("--verbose".to_string());
        command.push("--include-partial-messages".to_string());
    }

    if let Some(schema) = options.schema_argument() {
        command.push("--json-schema".to_string());
        command.push(schema);
    }

    if !options.model.is_empty() {
        command.push("--model".to_string());
        command.push(options.model.clone());
    }

    command.push(context.to_string());
    command
}
