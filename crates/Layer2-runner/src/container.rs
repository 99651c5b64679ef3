//! Docker-backed sandbox manager
//!
//! Runs task commands inside an already-provisioned container, identified
//! by the execution-context id, via the Docker exec API.

use crate::sandbox::{SandboxEvent, SandboxManager, SandboxProcess};
use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::exec::CreateExecOptions;
use bollard::exec::StartExecResults;
use bollard::Docker;
use futures::StreamExt;
use relay_foundation::{Error, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Buffered events between the exec pump and the consumer
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Sandbox manager backed by the local Docker daemon
pub struct DockerSandbox {
    docker: Arc<Docker>,
}

impl DockerSandbox {
    /// Connect with local defaults and verify the daemon answers.
    pub async fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| Error::Container(format!("Failed to connect to Docker: {}", e)))?;

        docker
            .ping()
            .await
            .map_err(|e| Error::Container(format!("Docker daemon not reachable: {}", e)))?;

        Ok(Self {
            docker: Arc::new(docker),
        })
    }

    /// Wrap an existing client (shared across sandboxes).
    pub fn with_client(docker: Arc<Docker>) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl SandboxManager for DockerSandbox {
    async fn spawn_in_context(
        &self,
        context_id: &str,
        command: Vec<String>,
        env: Vec<(String, String)>,
    ) -> Result<Box<dyn SandboxProcess>> {
        let env_vec: Vec<String> = env.iter().map(|(k, v)| format!("{}={}", k, v)).collect();

        let exec_options = CreateExecOptions {
            cmd: Some(command),
            env: Some(env_vec),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(context_id, exec_options)
            .await
            .map_err(|e| {
                Error::Container(format!("Failed to create exec in {}: {}", context_id, e))
            })?;

        let started = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| Error::Container(format!("Failed to start exec {}: {}", exec.id, e)))?;

        let mut output = match started {
            StartExecResults::Attached { output, .. } => output,
            StartExecResults::Detached => {
                return Err(Error::Container(
                    "Exec started detached; no streams to consume".to_string(),
                ))
            }
        };

        debug!("Started exec {} in context {}", exec.id, context_id);

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let docker = Arc::clone(&self.docker);
        let exec_id = exec.id.clone();

        let pump = tokio::spawn(async move {
            while let Some(frame) = output.next().await {
                let event = match frame {
                    Ok(LogOutput::StdOut { message }) => SandboxEvent::Stdout(message.to_vec()),
                    Ok(LogOutput::StdErr { message }) => SandboxEvent::Stderr(message.to_vec()),
                    Ok(_) => continue,
                    Err(e) => SandboxEvent::Failed(e.to_string()),
                };
                if tx.send(event).await.is_err() {
                    return; // consumer gone
                }
            }

            // Stream exhausted - report the exit code
            let event = match docker.inspect_exec(&exec_id).await {
                Ok(inspect) => SandboxEvent::Exited(inspect.exit_code.unwrap_or(-1)),
                Err(e) => SandboxEvent::Failed(format!("Failed to inspect exec: {}", e)),
            };
            let _ = tx.send(event).await;
        });

        Ok(Box::new(DockerSandboxProcess {
            docker: Arc::clone(&self.docker),
            context_id: context_id.to_string(),
            exec_id: exec.id,
            events: rx,
            pump,
        }))
    }
}

/// Exec handle pumping Docker log frames into sandbox events
pub struct DockerSandboxProcess {
    docker: Arc<Docker>,
    context_id: String,
    exec_id: String,
    events: mpsc::Receiver<SandboxEvent>,
    pump: tokio::task::JoinHandle<()>,
}

#[async_trait]
impl SandboxProcess for DockerSandboxProcess {
    async fn next_event(&mut self) -> Option<SandboxEvent> {
        self.events.recv().await
    }

    async fn kill(&mut self) -> Result<()> {
        // An exec has no kill endpoint; signal its pid inside the container.
        let inspect = self.docker.inspect_exec(&self.exec_id).await.map_err(|e| {
            Error::Container(format!("Failed to inspect exec {}: {}", self.exec_id, e))
        })?;

        let pid = match inspect.pid {
            Some(pid) if pid > 0 => pid,
            _ => return Ok(()), // already gone
        };

        let kill_exec = self
            .docker
            .create_exec(
                &self.context_id,
                CreateExecOptions {
                    cmd: Some(vec![
                        "kill".to_string(),
                        "-KILL".to_string(),
                        pid.to_string(),
                    ]),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| Error::Container(format!("Failed to create kill exec: {}", e)))?;

        self.docker
            .start_exec(&kill_exec.id, None)
            .await
            .map_err(|e| Error::Container(format!("Failed to kill pid {}: {}", pid, e)))?;

        self.pump.abort();
        Ok(())
    }
}

impl Drop for DockerSandboxProcess {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
