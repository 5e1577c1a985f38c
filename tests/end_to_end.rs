//! End-to-end scenarios against a local manager and a REST-fronted one

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use jasper_api::{ApiServer, AppState, RestClient, ServerOptions};
use jasper_manager::{BasicManager, Filter, Manager, ManagerHandle};
use jasper_process::{
    CreateOptions, ErrorKind, MockProcess, OutputOptions, Process, ProcessError, Signal,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

fn local() -> ManagerHandle {
    Arc::new(BasicManager::new(false))
}

async fn remote() -> (ManagerHandle, CancellationToken) {
    let basic = BasicManager::new(false);
    let logging = basic.logging_cache();
    let root = CancellationToken::new();
    let state = AppState::new(Arc::new(basic), logging, root.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(ApiServer::new(state, ServerOptions::default()).serve_on(listener));

    let client = RestClient::connect(&url).await.unwrap();
    (Arc::new(client), root)
}

async fn both() -> Vec<(ManagerHandle, Option<CancellationToken>)> {
    let (client, root) = remote().await;
    vec![(local(), None), (client, Some(root))]
}

#[tokio::test]
async fn test_true_succeeds() {
    for (manager, root) in both().await {
        let ctx = CancellationToken::new();
        let process = manager
            .create_process(&ctx, CreateOptions::new(["true"]))
            .await
            .unwrap();
        assert_eq!(process.wait(&ctx).await.unwrap(), 0);

        let info = process.info(&ctx).await;
        assert_eq!(info.exit_code, 0);
        assert!(info.successful);
        assert!(info.complete);
        assert!(!info.is_running);

        if let Some(root) = root {
            root.cancel();
        }
    }
}

#[tokio::test]
async fn test_false_fails() {
    for (manager, root) in both().await {
        let ctx = CancellationToken::new();
        let process = manager
            .create_process(&ctx, CreateOptions::new(["false"]))
            .await
            .unwrap();
        let err = process.wait(&ctx).await.unwrap_err();
        assert_eq!(err.exit_code(), Some(1));

        let info = process.info(&ctx).await;
        assert_eq!(info.exit_code, 1);
        assert!(!info.successful);
        assert!(info.complete);

        if let Some(root) = root {
            root.cancel();
        }
    }
}

#[tokio::test]
async fn test_timeout_kills_the_child() {
    let manager = local();
    let ctx = CancellationToken::new();
    let opts = CreateOptions::new(["sleep", "100"]).timeout(Duration::from_secs(1));
    let process = manager.create_process(&ctx, opts).await.unwrap();

    let err = process.wait(&ctx).await.unwrap_err();
    match err {
        ProcessError::NonZeroExit { code, timed_out } => {
            assert!(timed_out);
            assert_eq!(code, Signal::Kill.platform_value());
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(process.info(&ctx).await.timeout);
}

#[tokio::test]
async fn test_sigterm_exit_code() {
    for (manager, root) in both().await {
        let ctx = CancellationToken::new();
        let process = manager
            .create_process(&ctx, CreateOptions::new(["sleep", "100"]))
            .await
            .unwrap();
        process.signal(&ctx, Signal::Terminate).await.unwrap();

        let err = process.wait(&ctx).await.unwrap_err();
        assert_eq!(err.exit_code(), Some(Signal::Terminate.platform_value()));

        if let Some(root) = root {
            root.cancel();
        }
    }
}

#[tokio::test]
async fn test_group_and_running_list() {
    for (manager, root) in both().await {
        let ctx = CancellationToken::new();
        let first = manager
            .create_process(&ctx, CreateOptions::new(["sleep", "100"]))
            .await
            .unwrap();
        let second = manager
            .create_process(&ctx, CreateOptions::new(["sleep", "100"]))
            .await
            .unwrap();
        first.tag(&ctx, "x").await;

        let group = manager.group(&ctx, "x").await.unwrap();
        assert_eq!(group.len(), 1);
        assert_eq!(group[0].id(), first.id());
        assert_eq!(manager.list(&ctx, Filter::Running).await.unwrap().len(), 2);

        manager.close(&ctx).await.unwrap();
        assert!(manager.list(&ctx, Filter::Running).await.unwrap().is_empty());
        assert!(!second.running(&ctx).await);

        if let Some(root) = root {
            root.cancel();
        }
    }
}

#[tokio::test]
async fn test_working_directory() {
    let manager = local();
    let ctx = CancellationToken::new();
    let dir = tempfile::tempdir().unwrap();

    let opts = CreateOptions::new(["pwd"])
        .working_directory(dir.path())
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
    let reported = std::fs::canonicalize(&lines[0]).unwrap();
    assert_eq!(reported, dir.path().canonicalize().unwrap());

    let missing = dir.path().join("absent");
    let err = manager
        .create_process(&ctx, CreateOptions::new(["pwd"]).working_directory(missing))
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn test_register_validation() {
    let manager = local();
    let ctx = CancellationToken::new();

    let err = manager
        .register(&ctx, MockProcess::new("").into_handle())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let process = MockProcess::running().into_handle();
    manager.register(&ctx, process.clone()).await.unwrap();
    let err = manager.register(&ctx, process).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn test_cleared_processes_are_gone() {
    for (manager, root) in both().await {
        let ctx = CancellationToken::new();
        let process = manager
            .create_process(&ctx, CreateOptions::new(["true"]))
            .await
            .unwrap();
        assert_eq!(manager.get(&ctx, process.id()).await.unwrap().id(), process.id());

        process.wait(&ctx).await.unwrap();
        manager.clear(&ctx).await;
        let err = manager.get(&ctx, process.id()).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        if let Some(root) = root {
            root.cancel();
        }
    }
}
