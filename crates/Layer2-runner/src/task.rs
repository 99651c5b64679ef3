//! Task handles, run options, and execution outcomes

use relay_foundation::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default model requested for launched tasks
pub const DEFAULT_MODEL: &str = "sonnet";

/// Default output format; streams partial output while the task runs
pub const DEFAULT_OUTPUT_FORMAT: &str = "stream-json";

/// Handle to a task registered with the control plane
///
/// Created once the launcher parses an identifier from the launch output;
/// immutable afterwards and owned by the execution session that created it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskHandle {
    /// Identifier parsed from the launch output
    pub task_id: String,

    /// Directory the task process was started in
    pub working_dir: PathBuf,

    /// Model the task was launched with
    pub model: String,

    /// Agent the task runs on behalf of
    pub agent_id: String,
}

/// Options for a single task run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Agent identifier attached to streamed output
    pub agent_id: String,

    /// Model name forwarded to the task process
    pub model: String,

    /// Requested output format
    pub output_format: String,

    /// Structured-output schema, passed through on non-streaming runs
    pub json_schema: Option<serde_json::Value>,

    /// true = native schema enforcement (no streaming), false = live streaming
    pub strict_schema: bool,

    /// Working directory for the task process
    pub working_dir: PathBuf,

    /// Sandbox context to run in; None = host execution with log tailing
    pub isolation: Option<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            agent_id: "unknown".to_string(),
            model: DEFAULT_MODEL.to_string(),
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
            json_schema: None,
            strict_schema: false,
            working_dir: PathBuf::from("."),
            isolation: None,
        }
    }
}

impl RunOptions {
    /// Create options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the agent identifier
    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = agent_id.into();
        self
    }

    /// Set the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the requested output format
    pub fn with_output_format(mut self, format: impl Into<String>) -> Self {
        self.output_format = format.into();
        self
    }

    /// Set a structured-output schema
    pub fn with_json_schema(mut self, schema: serde_json::Value) -> Self {
        self.json_schema = Some(schema);
        self
    }

    /// Enforce the schema natively instead of streaming
    pub fn with_strict_schema(mut self, strict: bool) -> Self {
        self.strict_schema = strict;
        self
    }

    /// Set the working directory
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    /// Run inside the sandbox context with the given id
    pub fn with_isolation(mut self, context_id: impl Into<String>) -> Self {
        self.isolation = Some(context_id.into());
        self
    }

    /// The format actually used for the run.
    ///
    /// A `json` run with a schema is silently upgraded to `stream-json` so
    /// partial output stays observable, unless strict schema enforcement
    /// was requested.
    pub fn effective_output_format(&self) -> &str {
        if self.json_schema.is_some() && self.output_format == "json" && !self.strict_schema {
            "stream-json"
        } else {
            &self.output_format
        }
    }

    /// Schema argument forwarded to the CLI, only when the final format is
    /// non-streaming `json`.
    pub fn schema_argument(&self) -> Option<String> {
        match &self.json_schema {
            Some(schema) if self.effective_output_format() == "json" => Some(schema.to_string()),
            _ => None,
        }
    }
}

/// Final result of one execution, produced exactly once
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// Whether the task reached `completed`
    pub success: bool,

    /// Accumulated structured output
    pub output: String,

    /// Extracted failure context; None on success
    pub error: Option<String>,

    /// Control-plane task id; None for isolated runs
    pub task_id: Option<String>,
}

impl ExecutionOutcome {
    /// Convert a failed outcome into an error, for callers using `?`.
    pub fn into_result(self) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            let context = self
                .error
                .clone()
                .unwrap_or_else(|| "Task failed with no output".to_string());
            Err(Error::TaskFailed { context })
        }
    }
}
