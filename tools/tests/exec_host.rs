//! Integration tests for the execution host.
//!
//! Scripts run under `sh` so the suite doesn't depend on a Python install.
#![cfg(unix)]

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use mender_tools::{EnvSanitizer, ExecConfig, Execution, ExecutionHost, ProcessState, StopOutcome};
use mender_types::ProcessId;
use tempfile::TempDir;

fn sh_host(dir: &TempDir) -> ExecutionHost {
    let config = ExecConfig {
        interpreter: "sh".into(),
        extension: "sh".into(),
        ..ExecConfig::default()
    };
    ExecutionHost::new(config, dir.path(), EnvSanitizer::secrets().unwrap())
}

async fn wait_for(path: &Path, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if path.exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    path.exists()
}

#[tokio::test]
async fn timed_out_run_keeps_running_in_background() {
    let dir = tempfile::tempdir().unwrap();
    let host = sh_host(&dir);

    let run = host
        .execute("sleep 1; echo done > finished.txt", Some(Duration::from_millis(100)))
        .await
        .unwrap();
    let Execution::Detached { id } = &run else {
        panic!("expected a detached run, got {run:?}");
    };
    assert!(run.report().contains("Return Code: Running"));
    assert!(run.report().ends_with("Note: The process is still running in the background."));

    let tracked = host.processes();
    assert_eq!(tracked.len(), 1);
    assert_eq!(&tracked[0].id, id);
    assert_eq!(tracked[0].state, ProcessState::Detached);

    assert!(wait_for(&dir.path().join("finished.txt"), Duration::from_secs(5)).await);
}

#[tokio::test]
async fn stop_terminates_detached_run_and_forgets_it() {
    let dir = tempfile::tempdir().unwrap();
    let host = sh_host(&dir);

    let run = host
        .execute("sleep 1; touch survived.txt", Some(Duration::from_millis(100)))
        .await
        .unwrap();
    assert!(run.is_detached());
    let id = run.id().clone();

    let outcome = host.stop(&id);
    assert_eq!(outcome, StopOutcome::Stopped(id.clone()));
    assert_eq!(outcome.to_string(), format!("Process {id} has been stopped."));
    assert!(host.processes().is_empty());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!dir.path().join("survived.txt").exists());

    assert_eq!(host.stop(&id), StopOutcome::NotFound(id.clone()));
}

#[tokio::test]
async fn stop_of_unknown_id_never_fails() {
    let dir = tempfile::tempdir().unwrap();
    let host = sh_host(&dir);
    let id = ProcessId::from("process_404");
    assert_eq!(host.stop(&id), StopOutcome::NotFound(id));
}

#[tokio::test]
async fn ids_are_unique_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let host = sh_host(&dir);

    let mut seen = HashSet::new();
    for _ in 0..5 {
        let run = host.execute("true", Some(Duration::from_secs(5))).await.unwrap();
        assert!(seen.insert(run.id().clone()), "duplicate id {}", run.id());
    }
    let detached = host
        .execute("sleep 2", Some(Duration::from_millis(50)))
        .await
        .unwrap();
    assert!(seen.insert(detached.id().clone()));
    host.stop(detached.id());
}

#[tokio::test]
async fn completed_run_reports_output_and_code() {
    let dir = tempfile::tempdir().unwrap();
    let host = sh_host(&dir);
    let run = host
        .execute("printf 'a\\nb\\n'; exit 0", Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(
        run.report(),
        format!("Process ID: {}\n\nStdout:\na\nb\n\n\nStderr:\n\n\nReturn Code: 0", run.id())
    );
}

#[tokio::test]
async fn scratch_dir_is_created_on_demand() {
    let dir = tempfile::tempdir().unwrap();
    let scratch = dir.path().join("scratch/nested");
    let config = ExecConfig {
        interpreter: "sh".into(),
        extension: "sh".into(),
        scratch_dir: Some(scratch.clone()),
        ..ExecConfig::default()
    };
    let host = ExecutionHost::new(config, dir.path(), EnvSanitizer::secrets().unwrap());
    let run = host.execute("pwd", Some(Duration::from_secs(5))).await.unwrap();
    let Execution::Completed { stdout, .. } = run else {
        panic!("expected completion");
    };
    assert!(scratch.is_dir());
    let cwd = std::fs::canonicalize(dir.path()).unwrap();
    assert_eq!(std::fs::canonicalize(stdout.trim()).unwrap(), cwd);
}

#[test]
fn detached_run_outlives_the_spawning_thread() {
    let dir = tempfile::tempdir().unwrap();
    let work = dir.path().to_path_buf();

    let detached = std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let config = ExecConfig {
                interpreter: "sh".into(),
                extension: "sh".into(),
                ..ExecConfig::default()
            };
            let host = ExecutionHost::new(config, &work, EnvSanitizer::secrets().unwrap());
            host.execute("sleep 1; touch alive", Some(Duration::from_millis(100)))
                .await
                .unwrap()
                .is_detached()
        })
    })
    .join()
    .unwrap();
    assert!(detached);

    let marker = dir.path().join("alive");
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while !marker.exists() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
    }
    assert!(marker.exists());
}
