//! End-to-end runner tests against a scripted control-plane CLI
//!
//! A shell script stands in for the control plane: `task run` prints a
//! spawned task id, `status` reports a fixed status, and `get-log-path`
//! points at a pre-written log file.

#![cfg(unix)]

use relay_foundation::Error;
use relay_runner::{OutputSink, RunOptions, TaskRunner, TaskRunnerConfig};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Write an executable fake control-plane script.
fn write_fake_cli(dir: &Path, log_path: &Path, status_body: &str) -> PathBuf {
    let script = format!(
        "#!/bin/sh\n\
         case \"$1\" in\n\
           task) echo \"Task spawned: task-alpha-bravo-3f2a1b\" ;;\n\
           status) printf '{}' ;;\n\
           get-log-path) echo \"{}\" ;;\n\
         esac\n",
        status_body,
        log_path.display()
    );
    write_script(dir, script)
}

fn write_script(dir: &Path, script: String) -> PathBuf {
    let path = dir.join("relay-fake");
    std::fs::write(&path, script).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// Short ticks so a full run settles in well under a second.
fn quick_config(program: PathBuf) -> TaskRunnerConfig {
    let mut config = TaskRunnerConfig::default();
    config.program = program;
    config.tail_interval = Duration::from_millis(25);
    config.status_interval = Duration::from_millis(50);
    config.ready_delay = Duration::from_millis(10);
    config.settle_delay = Duration::from_millis(25);
    config.timeout = Duration::from_secs(30);
    config
}

#[tokio::test]
async fn run_completes_and_classifies_log() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("task.log");
    std::fs::write(
        &log_path,
        "[1700000000000]{\"type\":\"system\",\"subtype\":\"init\"}\n\
         === run ===\n\
         [1700000000001]{\"a\":1}\n\
         {\"b\":2}\n\
         Finished: ok\n",
    )
    .unwrap();

    let program = write_fake_cli(dir.path(), &log_path, "Status:     completed\\n");

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink_seen = Arc::clone(&seen);
    let sink: OutputSink = Arc::new(move |line, agent_id| {
        sink_seen
            .lock()
            .unwrap()
            .push(format!("{}:{}", agent_id, line));
    });

    let runner = TaskRunner::new(quick_config(program)).with_output_sink(sink);
    let options = RunOptions::new()
        .with_agent_id("agent-1")
        .with_working_dir(dir.path());

    let outcome = runner.run("do the thing", options).await.unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.output, "{\"a\":1}\n{\"b\":2}\n");
    assert_eq!(outcome.error, None);
    assert_eq!(outcome.task_id.as_deref(), Some("task-alpha-bravo-3f2a1b"));

    // The live sink saw exactly the accepted lines, in order
    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![
            "agent-1:{\"a\":1}".to_string(),
            "agent-1:{\"b\":2}".to_string(),
        ]
    );
}

#[tokio::test]
async fn run_surfaces_failure_context() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("task.log");
    std::fs::write(&log_path, "{\"step\":\"compile\"}\n").unwrap();

    let program = write_fake_cli(
        dir.path(),
        &log_path,
        "Status:     failed\\nError: disk full\\n",
    );

    let runner = TaskRunner::new(quick_config(program));
    let options = RunOptions::new().with_working_dir(dir.path());

    let outcome = runner.run("do the thing", options).await.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("disk full"));
    assert_eq!(outcome.output, "{\"step\":\"compile\"}\n");
}

#[tokio::test]
async fn run_tolerates_missing_log_file() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("never-written.log");

    let program = write_fake_cli(dir.path(), &log_path, "Status:     completed\\n");

    let runner = TaskRunner::new(quick_config(program));
    let outcome = runner
        .run("quiet task", RunOptions::new().with_working_dir(dir.path()))
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.output, "");
}

#[tokio::test]
async fn launch_nonzero_exit_is_launch_failure() {
    let dir = tempfile::tempdir().unwrap();
    let program = write_script(
        dir.path(),
        "#!/bin/sh\necho \"out of quota\" >&2\nexit 3\n".to_string(),
    );

    let runner = TaskRunner::new(quick_config(program));
    let err = runner
        .run("doomed", RunOptions::new().with_working_dir(dir.path()))
        .await
        .unwrap_err();

    match err {
        Error::Launch { code, message } => {
            assert_eq!(code, Some(3));
            assert!(message.contains("out of quota"));
        }
        other => panic!("expected Launch error, got {:?}", other),
    }
}

#[tokio::test]
async fn launch_without_task_id_is_launch_failure() {
    let dir = tempfile::tempdir().unwrap();
    let program = write_script(
        dir.path(),
        "#!/bin/sh\necho \"started, but no id line\"\n".to_string(),
    );

    let runner = TaskRunner::new(quick_config(program));
    let err = runner
        .run("doomed", RunOptions::new().with_working_dir(dir.path()))
        .await
        .unwrap_err();

    match err {
        Error::Launch { code, message } => {
            assert_eq!(code, Some(0));
            assert!(message.contains("Could not parse task ID"));
        }
        other => panic!("expected Launch error, got {:?}", other),
    }
}

#[tokio::test]
async fn missing_binary_is_spawn_failure() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = quick_config(dir.path().join("does-not-exist"));
    config.ready_retries = 1;

    let runner = TaskRunner::new(config);
    let err = runner
        .run("doomed", RunOptions::new().with_working_dir(dir.path()))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Spawn { .. }));
}
