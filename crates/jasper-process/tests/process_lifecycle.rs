//! Lifecycle tests shared by every local process implementation

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use jasper_process::options::FileLoggerOptions;
use jasper_process::*;
use parking_lot::Mutex;
use serial_test::serial;
use tokio_util::sync::CancellationToken;

const IMPLEMENTATIONS: [(ProcessImplementation, bool); 4] = [
    (ProcessImplementation::Basic, false),
    (ProcessImplementation::Basic, true),
    (ProcessImplementation::Blocking, false),
    (ProcessImplementation::Blocking, true),
];

fn options(args: &[&str], implementation: ProcessImplementation, synchronized: bool) -> CreateOptions {
    let mut opts = CreateOptions::new(args.iter().copied()).implementation(implementation);
    opts.synchronized = synchronized;
    opts
}

#[tokio::test]
async fn test_completed_process_invariants() {
    let ctx = CancellationToken::new();
    for (implementation, synchronized) in IMPLEMENTATIONS {
        for (args, expected) in [(["true"], 0), (["false"], 1)] {
            let process = new_process(&ctx, options(&args, implementation, synchronized)).unwrap();
            let result = process.wait(&ctx).await;
            assert_eq!(result.is_ok(), expected == 0);

            let info = process.info(&ctx).await;
            assert!(info.complete, "{:?} {}", implementation, synchronized);
            assert!(!info.is_running);
            assert_eq!(info.successful, info.exit_code == 0);
            assert_eq!(info.exit_code, expected);

            // waiting again returns the cached outcome
            assert_eq!(process.wait(&ctx).await.is_ok(), expected == 0);
        }
    }
}

#[tokio::test]
async fn test_sigterm_exit_code() {
    let ctx = CancellationToken::new();
    for (implementation, synchronized) in IMPLEMENTATIONS {
        let process =
            new_process(&ctx, options(&["sleep", "100"], implementation, synchronized)).unwrap();
        process.signal(&ctx, Signal::Terminate).await.unwrap();

        let err = process.wait(&ctx).await.unwrap_err();
        assert_eq!(err.exit_code(), Some(Signal::Terminate.platform_value()));
        assert!(!process.info(&ctx).await.successful);
    }
}

#[tokio::test]
async fn test_triggers_fire_exactly_once_in_order() {
    let ctx = CancellationToken::new();
    for (implementation, synchronized) in IMPLEMENTATIONS {
        let process =
            new_process(&ctx, options(&["sleep", "1"], implementation, synchronized)).unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let calls = Arc::clone(&calls);
            process
                .register_trigger(
                    &ctx,
                    Box::new(move |info: &ProcessInfo| calls.lock().push((i, info.clone()))),
                )
                .await
                .unwrap();
        }

        process.wait(&ctx).await.unwrap();
        let calls = calls.lock();
        assert_eq!(calls.len(), 5);
        assert!(calls.iter().map(|(i, _)| *i).eq(0..5));
        assert!(calls.iter().all(|(_, info)| info == &calls[0].1 && info.complete));
    }
}

#[tokio::test]
async fn test_respawn_keeps_implementation() {
    let ctx = CancellationToken::new();
    let process = new_process(
        &ctx,
        options(&["true"], ProcessImplementation::Blocking, true).tag("t"),
    )
    .unwrap();
    process.wait(&ctx).await.unwrap();

    let sibling = process.respawn(&ctx).await.unwrap();
    assert_ne!(sibling.id(), process.id());
    sibling.wait(&ctx).await.unwrap();
    let info = sibling.info(&ctx).await;
    assert_eq!(info.options.implementation, ProcessImplementation::Blocking);
    assert!(info.options.synchronized);
    assert_eq!(sibling.get_tags(&ctx).await, vec!["t"]);
}

#[tokio::test]
async fn test_file_logger_receives_output() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("process.log");
    let ctx = CancellationToken::new();

    let mut output = OutputOptions::default();
    output.loggers = vec![LoggerSpec::File(FileLoggerOptions {
        filename: path.clone(),
    })];
    let opts = CreateOptions::new(["sh", "-c", "echo out; echo err 1>&2"]).output(output);
    let process = new_process(&ctx, opts).unwrap();
    process.wait(&ctx).await.unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("out\n"));
    assert!(contents.contains("err\n"));
}

#[tokio::test]
async fn test_working_directory_and_override_environ() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = CancellationToken::new();

    let mut opts = CreateOptions::new(["/bin/sh", "-c", "pwd; echo \"[$HOME]\" \"$CUSTOM\""])
        .working_directory(dir.path())
        .output(OutputOptions::in_memory(10));
    opts.override_environ = true;
    opts.add_env_var("CUSTOM", "value");

    let process = new_process(&ctx, opts).unwrap();
    process.wait(&ctx).await.unwrap();

    let lines = process
        .info(&ctx)
        .await
        .options
        .output
        .in_memory_lines(10)
        .unwrap();
    let expected_dir = dir.path().canonicalize().unwrap();
    assert_eq!(
        std::path::Path::new(&lines[0]).canonicalize().unwrap(),
        expected_dir
    );
    assert_eq!(lines[1], "[] value");
}

fn consume_everything() -> SignalTrigger {
    Box::new(|_: &ProcessInfo, _| true)
}

#[tokio::test]
#[serial]
async fn test_signal_trigger_by_id() {
    let _ = register_signal_trigger_factory("lifecycle-consume-all", consume_everything);
    let ctx = CancellationToken::new();

    for (implementation, synchronized) in IMPLEMENTATIONS {
        let process =
            new_process(&ctx, options(&["sleep", "100"], implementation, synchronized)).unwrap();
        process
            .register_signal_trigger_id(&ctx, "lifecycle-consume-all")
            .await
            .unwrap();

        process.signal(&ctx, Signal::Kill).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(process.running(&ctx).await);

        let err = process
            .register_signal_trigger_id(&ctx, "lifecycle-no-such-trigger")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        // every signal is consumed now, so kill the child directly
        let pid = process.info(&ctx).await.pid;
        nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(pid),
            nix::sys::signal::Signal::SIGKILL,
        )
        .unwrap();
        assert!(process.wait(&ctx).await.is_err());
    }
}

#[tokio::test]
async fn test_canceled_creation_spawns_nothing() {
    let ctx = CancellationToken::new();
    ctx.cancel();
    let err = new_process(&ctx, CreateOptions::new(["true"])).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Canceled);
}
