//! Managers driving real child processes

#![cfg(unix)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use jasper_manager::*;
use jasper_process::tracker::ProcessGroupTracker;
use jasper_process::{
    CreateOptions, ErrorKind, OutputOptions, Process, ProcessHandle, MANAGER_ENV_VAR,
};
use tokio_util::sync::CancellationToken;

async fn eventually_exists(path: &Path) -> bool {
    for _ in 0..100 {
        if path.exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn test_created_process_is_visible_until_cleared() {
    let ctx = CancellationToken::new();
    let manager = BasicManager::new(false);

    let process = manager
        .create_process(&ctx, CreateOptions::new(["true"]))
        .await
        .unwrap();
    assert_eq!(manager.get(&ctx, process.id()).await.unwrap().id(), process.id());

    process.wait(&ctx).await.unwrap();
    assert!(manager.get(&ctx, process.id()).await.is_ok());
    assert_eq!(manager.list(&ctx, Filter::Successful).await.unwrap().len(), 1);

    manager.clear(&ctx).await;
    let err = manager.get(&ctx, process.id()).await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_manager_id_reaches_the_child() {
    let ctx = CancellationToken::new();
    let manager = BasicManager::new(false);

    let opts = CreateOptions::new(["sh", "-c", &format!("echo ${}", MANAGER_ENV_VAR)])
        .output(OutputOptions::in_memory(10));
    let process = manager.create_process(&ctx, opts).await.unwrap();
    process.wait(&ctx).await.unwrap();

    let lines = process
        .info(&ctx)
        .await
        .options
        .output
        .in_memory_lines(10)
        .unwrap();
    assert_eq!(lines, vec![manager.id().to_string()]);
}

#[tokio::test]
async fn test_follow_ups_match_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = CancellationToken::new();
    let manager = BasicManager::new(false);

    let marker = |name: &str| dir.path().join(name);
    let touch = |name: &str| CreateOptions::new(["touch".to_string(), marker(name).display().to_string()]);

    let mut succeeding = CreateOptions::new(["true"]);
    succeeding.on_success.push(touch("success"));
    succeeding.on_failure.push(touch("wrong-failure"));

    let mut failing = CreateOptions::new(["false"]);
    failing.on_success.push(touch("wrong-success"));
    failing.on_failure.push(touch("failure"));

    let mut timing_out = CreateOptions::new(["sleep", "100"]).timeout(Duration::from_secs(1));
    timing_out.on_failure.push(touch("wrong-timeout"));
    timing_out.on_timeout.push(touch("timeout"));

    for opts in [succeeding, failing, timing_out] {
        let process = manager.create_process(&ctx, opts).await.unwrap();
        let _ = process.wait(&ctx).await;
    }

    assert!(eventually_exists(&marker("success")).await);
    assert!(eventually_exists(&marker("failure")).await);
    assert!(eventually_exists(&marker("timeout")).await);
    for wrong in ["wrong-success", "wrong-failure", "wrong-timeout"] {
        assert!(!marker(wrong).exists(), "{} should not run", wrong);
    }

    // three parents, three follow-ups
    assert_eq!(manager.list(&ctx, Filter::All).await.unwrap().len(), 6);
    manager.close(&ctx).await.unwrap();
}

#[tokio::test]
async fn test_close_terminates_running_processes() {
    let ctx = CancellationToken::new();
    let manager = BasicManager::new(false);

    let mut procs: Vec<ProcessHandle> = Vec::new();
    for _ in 0..3 {
        procs.push(
            manager
                .create_process(&ctx, CreateOptions::new(["sleep", "100"]))
                .await
                .unwrap(),
        );
    }
    assert_eq!(manager.list(&ctx, Filter::Running).await.unwrap().len(), 3);

    manager.close(&ctx).await.unwrap();
    assert!(manager.is_empty());
    for process in &procs {
        let info = process.info(&ctx).await;
        assert!(info.complete);
        assert!(!info.successful);
    }

    manager.close(&ctx).await.unwrap();
}

#[tokio::test]
async fn test_close_after_exit_with_open_pipes() {
    let ctx = CancellationToken::new();
    let manager = BasicManager::new(false);

    // sh exits at once but its backgrounded sleep holds the output pipe
    let opts = CreateOptions::new(["sh", "-c", "sleep 3 &"]).output(OutputOptions::in_memory(10));
    let process = manager.create_process(&ctx, opts).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!process.running(&ctx).await);

    manager.close(&ctx).await.unwrap();
    assert!(manager.is_empty());
}

#[tokio::test]
async fn test_tracker_enrolls_and_cleans_up() {
    let ctx = CancellationToken::new();
    let tracker = Arc::new(ProcessGroupTracker::new());
    let manager = BasicManager::with_tracker(tracker.clone());

    let process = manager
        .create_process(&ctx, CreateOptions::new(["sh", "-c", "sleep 100 & wait"]))
        .await
        .unwrap();
    let pid = process.info(&ctx).await.pid;
    assert_eq!(tracker.groups(), vec![pid]);

    manager.close(&ctx).await.unwrap();
    assert!(tracker.groups().is_empty());
    assert!(process.complete(&ctx).await);
}

#[tokio::test]
async fn test_self_clearing_manager_with_real_processes() {
    let ctx = CancellationToken::new();
    let manager = SelfClearingManager::new(BasicManager::new(false), 1);

    let first = manager
        .create_process(&ctx, CreateOptions::new(["true"]))
        .await
        .unwrap();
    first.wait(&ctx).await.unwrap();

    let second = manager
        .create_process(&ctx, CreateOptions::new(["sleep", "100"]))
        .await
        .unwrap();
    assert!(manager.get(&ctx, first.id()).await.is_err());

    let err = manager
        .create_process(&ctx, CreateOptions::new(["true"]))
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

    manager.close(&ctx).await.unwrap();
    assert!(second.complete(&ctx).await);
}

#[tokio::test]
async fn test_command_runs_through_its_manager() {
    let ctx = CancellationToken::new();
    let manager = Arc::new(SynchronizedManager::new(BasicManager::new(false)));

    let mut cmd = Arc::clone(&manager)
        .create_command()
        .append("true")
        .append("echo done")
        .id("build");
    cmd.run(&ctx).await.unwrap();

    assert_eq!(manager.group(&ctx, "build").await.unwrap().len(), 2);
    assert_eq!(
        cmd.export(&ctx).await.iter().filter(|info| info.successful).count(),
        2
    );
}
