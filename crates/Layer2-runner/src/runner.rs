//! Task runner - launches a task, follows its output, and reconciles the
//! completion signals into exactly one outcome
//!
//! Two concurrent signal sources observe a running task: the log tailer
//! (new output) and the status poller (terminal state). They are not
//! mutually ordered; one final tail pass runs after a terminal status is
//! seen to reduce the chance of dropping output written right at exit.
//! Settlement happens exactly once across the poller, the deadline, and
//! process-level failures, and every ticker is cancelled on settlement.

use crate::classify::{OutputCollector, OutputSink};
use crate::control::{CliControl, TaskControl, TASK_NOT_FOUND};
use crate::launch::{Launcher, MODEL_ENV_VAR};
use crate::sandbox::{build_sandbox_command, SandboxEvent, SandboxManager};
use crate::status::{extract_error_context, parse_terminal_status, TerminalStatus};
use crate::tail::LogTailer;
use crate::task::{ExecutionOutcome, RunOptions, TaskHandle};
use relay_foundation::{Error, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, sleep, sleep_until, Instant};
use tracing::{debug, info, warn};

/// Configuration for the task runner
#[derive(Debug, Clone)]
pub struct TaskRunnerConfig {
    /// Control-plane CLI used to launch and query tasks
    pub program: PathBuf,

    /// Agent command executed inside a sandbox context
    pub agent_command: Vec<String>,

    /// Overall deadline for one execution
    pub timeout: Duration,

    /// Log tail tick
    pub tail_interval: Duration,

    /// Status poll tick
    pub status_interval: Duration,

    /// Readiness retries before proceeding anyway
    pub ready_retries: u32,

    /// Delay between readiness retries
    pub ready_delay: Duration,

    /// Delay between terminal status and settlement, letting in-flight
    /// log writes land
    pub settle_delay: Duration,
}

impl Default for TaskRunnerConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("relay"),
            agent_command: vec!["claude".to_string()],
            timeout: Duration::from_secs(60 * 60),
            tail_interval: Duration::from_millis(300),
            status_interval: Duration::from_millis(1000),
            ready_retries: 10,
            ready_delay: Duration::from_millis(200),
            settle_delay: Duration::from_millis(500),
        }
    }
}

/// Ensures the outcome (or timeout rejection) is settled exactly once
/// across the status poller and the deadline guard.
#[derive(Debug, Default)]
struct SettleFlag(AtomicBool);

impl SettleFlag {
    /// Claim settlement; true for exactly one caller.
    fn claim(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }
}

/// Shared state mutated by the tail ticker and the status poller
///
/// Owned by one execution session; never shared across concurrent runs.
struct FollowState {
    tailer: LogTailer,
    collector: OutputCollector,
}

/// Executes tasks through the control plane and follows them to completion
pub struct TaskRunner {
    config: TaskRunnerConfig,
    control: Arc<dyn TaskControl>,
    sandbox: Option<Arc<dyn SandboxManager>>,
    sink: Option<OutputSink>,
}

impl TaskRunner {
    /// Create a runner; the control plane is reached through the
    /// configured CLI program.
    pub fn new(config: TaskRunnerConfig) -> Self {
        let control = Arc::new(CliControl::new(&config.program));
        Self {
            config,
            control,
            sandbox: None,
            sink: None,
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(TaskRunnerConfig::default())
    }

    /// Replace the control plane (tests use a scripted fake).
    pub fn with_control(mut self, control: Arc<dyn TaskControl>) -> Self {
        self.control = control;
        self
    }

    /// Attach a sandbox manager for isolated execution.
    pub fn with_sandbox(mut self, sandbox: Arc<dyn SandboxManager>) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    /// Stream every accepted output line to the given sink.
    pub fn with_output_sink(mut self, sink: OutputSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Run a task to completion.
    ///
    /// Launches the task process, waits for the control plane to register
    /// it, then follows its log and status until terminal, all raced
    /// against the configured deadline. Exactly one outcome (or timeout
    /// error) is produced per call.
    pub async fn run(&self, context: &str, options: RunOptions) -> Result<ExecutionOutcome> {
        if options.isolation.is_some() {
            return self.run_isolated(context, options).await;
        }

        let deadline = Instant::now() + self.config.timeout;
        let launcher = Launcher::new(&self.config.program);

        let task_id = tokio::select! {
            result = launcher.launch(context, &options) => result?,
            _ = sleep_until(deadline) => return Err(Error::timeout(self.config.timeout)),
        };

        let handle = TaskHandle {
            task_id,
            working_dir: options.working_dir.clone(),
            model: options.model.clone(),
            agent_id: options.agent_id.clone(),
        };

        info!("[{}] Following logs for {}", handle.agent_id, handle.task_id);

        tokio::select! {
            _ = self.wait_ready(&handle.task_id) => {}
            _ = sleep_until(deadline) => return Err(Error::timeout(self.config.timeout)),
        }

        self.follow(handle, deadline).await
    }

    /// Poll the status query until the task becomes visible.
    ///
    /// Exhausting the retries is not fatal: the log file may simply not
    /// exist yet, and the tailer tolerates that.
    async fn wait_ready(&self, task_id: &str) {
        for _ in 0..self.config.ready_retries {
            let registered = match self.control.status(task_id).await {
                Ok(text) => !text.contains(TASK_NOT_FOUND),
                Err(_) => false,
            };
            if registered {
                return;
            }
            sleep(self.config.ready_delay).await;
        }
        warn!(
            "Task {} not yet visible after {} retries, continuing anyway",
            task_id, self.config.ready_retries
        );
    }

    /// Follow a launched task until exactly one outcome is settled.
    async fn follow(&self, handle: TaskHandle, deadline: Instant) -> Result<ExecutionOutcome> {
        let state = Arc::new(Mutex::new(FollowState {
            tailer: LogTailer::new(&handle.task_id),
            collector: OutputCollector::new(&handle.agent_id, self.sink.clone()),
        }));
        let settled = Arc::new(SettleFlag::default());
        let (outcome_tx, mut outcome_rx) = mpsc::channel::<ExecutionOutcome>(1);

        {
            let mut st = state.lock().await;
            if !st.tailer.resolve_path(self.control.as_ref()).await {
                debug!("[{}] Waiting for log file...", handle.agent_id);
            }
        }

        // Tail ticker
        let tail_handle = {
            let state = Arc::clone(&state);
            let control = Arc::clone(&self.control);
            let tick = self.config.tail_interval;
            tokio::spawn(async move {
                let mut ticker = interval(tick);
                ticker.tick().await; // the immediate first tick
                loop {
                    ticker.tick().await;
                    let mut st = state.lock().await;
                    let FollowState { tailer, collector } = &mut *st;
                    tailer.poll(control.as_ref(), collector).await;
                }
            })
        };

        // Status poller - the only source that settles a normal outcome
        let poll_handle = {
            let state = Arc::clone(&state);
            let control = Arc::clone(&self.control);
            let settled = Arc::clone(&settled);
            let task_id = handle.task_id.clone();
            let tick = self.config.status_interval;
            let settle_delay = self.config.settle_delay;
            tokio::spawn(async move {
                let mut ticker = interval(tick);
                ticker.tick().await;
                loop {
                    ticker.tick().await;

                    let status_text = match control.status(&task_id).await {
                        Ok(text) => text,
                        Err(e) => {
                            debug!("Status query for {} failed: {}", task_id, e);
                            continue;
                        }
                    };
                    let status = match parse_terminal_status(&status_text) {
                        Some(status) => status,
                        None => continue,
                    };

                    // Flush output written between the last tail tick and
                    // termination, then let in-flight writes land.
                    {
                        let mut st = state.lock().await;
                        let FollowState { tailer, collector } = &mut *st;
                        tailer.poll(control.as_ref(), collector).await;
                    }
                    sleep(settle_delay).await;

                    if !settled.claim() {
                        return;
                    }

                    let st = state.lock().await;
                    let output = st.collector.output().to_string();
                    let error = match status {
                        TerminalStatus::Completed => None,
                        TerminalStatus::Failed => {
                            Some(extract_error_context(&status_text, &output))
                        }
                    };
                    let outcome = ExecutionOutcome {
                        success: status.is_success(),
                        output,
                        error,
                        task_id: Some(task_id.clone()),
                    };
                    let _ = outcome_tx.send(outcome).await;
                    return;
                }
            })
        };

        let result = tokio::select! {
            outcome = outcome_rx.recv() => match outcome {
                Some(outcome) => Ok(outcome),
                None => Err(Error::Internal(
                    "Completion channel closed without an outcome".to_string(),
                )),
            },
            _ = sleep_until(deadline) => {
                if settled.claim() {
                    Err(Error::timeout(self.config.timeout))
                } else {
                    // The poller won the race; take its outcome before
                    // tearing anything down so the settlement is not lost.
                    match outcome_rx.recv().await {
                        Some(outcome) => Ok(outcome),
                        None => Err(Error::timeout(self.config.timeout)),
                    }
                }
            }
        };

        // No further polling after settlement
        tail_handle.abort();
        poll_handle.abort();

        result
    }

    /// Run the task inside a managed sandbox context instead of the host.
    ///
    /// Output arrives as raw stream chunks (no file, no line reassembly)
    /// and completion is driven solely by the process exit event; the
    /// deadline and single-settlement discipline are the same as on the
    /// host path.
    async fn run_isolated(&self, context: &str, options: RunOptions) -> Result<ExecutionOutcome> {
        let manager = match &self.sandbox {
            Some(manager) => Arc::clone(manager),
            None => {
                return Err(Error::Config(
                    "Isolated execution requested without a sandbox manager".to_string(),
                ))
            }
        };
        let context_id = match &options.isolation {
            Some(id) => id.clone(),
            None => {
                return Err(Error::Config(
                    "Isolated execution requested without a context id".to_string(),
                ))
            }
        };

        info!("[{}] Running task in isolated container...", options.agent_id);

        let command = build_sandbox_command(&self.config.agent_command, &options, context);
        let env = vec![(MODEL_ENV_VAR.to_string(), options.model.clone())];

        let deadline = Instant::now() + self.config.timeout;
        let mut process = tokio::select! {
            result = manager.spawn_in_context(&context_id, command, env) => result?,
            _ = sleep_until(deadline) => return Err(Error::timeout(self.config.timeout)),
        };

        let mut collector = OutputCollector::new(&options.agent_id, self.sink.clone());

        loop {
            tokio::select! {
                event = process.next_event() => match event {
                    Some(SandboxEvent::Stdout(bytes)) => {
                        collector.push_chunk(&String::from_utf8_lossy(&bytes));
                    }
                    Some(SandboxEvent::Stderr(bytes)) => {
                        warn!(
                            "[{}] stderr: {}",
                            options.agent_id,
                            String::from_utf8_lossy(&bytes)
                        );
                    }
                    Some(SandboxEvent::Exited(code)) => {
                        let error = if code == 0 {
                            None
                        } else {
                            Some(format!("Container exited with code {}", code))
                        };
                        return Ok(ExecutionOutcome {
                            success: code == 0,
                            output: collector.into_output(),
                            error,
                            task_id: None,
                        });
                    }
                    Some(SandboxEvent::Failed(message)) => {
                        return Err(Error::Container(message));
                    }
                    None => {
                        return Err(Error::Container(
                            "Sandbox stream ended without an exit event".to_string(),
                        ));
                    }
                },
                _ = sleep_until(deadline) => {
                    if let Err(e) = process.kill().await {
                        debug!("Failed to kill sandboxed process: {}", e);
                    }
                    return Err(Error::timeout(self.config.timeout));
                }
            }
        }
    }
}
