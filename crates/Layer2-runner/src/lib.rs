//! # relay-runner
//!
//! Task execution and log tailing engine for RelayCode.
//! Launches external agent tasks through the control-plane CLI, follows
//! their append-only logs while independently polling terminal status,
//! and reconciles both signals into exactly one outcome per execution.
//!
//! ## Features
//!
//! - Incremental, offset-based log tailing (cost proportional to new data)
//! - Structured-line classification with live output streaming
//! - Single-settlement completion with deadline enforcement
//! - Isolated execution inside Docker-managed contexts

pub mod classify;
pub mod container;
pub mod control;
pub mod launch;
pub mod runner;
pub mod sandbox;
pub mod status;
pub mod tail;
pub mod task;

// Runner
pub use runner::{TaskRunner, TaskRunnerConfig};
pub use task::{ExecutionOutcome, RunOptions, TaskHandle, DEFAULT_MODEL, DEFAULT_OUTPUT_FORMAT};

// Control plane
pub use control::{CliControl, TaskControl, TASK_NOT_FOUND};

// Launch
pub use launch::{parse_task_id, Launcher, MODEL_ENV_VAR};

// Log pipeline
pub use classify::{classify_line, OutputCollector, OutputSink};
pub use status::{extract_error_context, parse_terminal_status, TerminalStatus};
pub use tail::{LineBuffer, LogCursor, LogTailer};

// Sandbox
pub use container::DockerSandbox;
pub use sandbox::{build_sandbox_command, SandboxEvent, SandboxManager, SandboxProcess};
