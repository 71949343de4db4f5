//! End-to-end lifecycle tests
//!
//! A deputy with a shutdown handler is registered as graceful terminator,
//! then terminated from a second "process": an in-process caller and the
//! real `k8s-deputy` binary.

#![allow(clippy::expect_used)]

use k8s_deputy::{
    Deputy, Exit, GracefulTerminator, HealthServerConfig, IpcDir, RecordingExit,
    RegisterOptions, ShutdownHandler, TerminatorState, Wait, DEFAULT_EXIT_CODE,
};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// =============================================================================
// HELPERS
// =============================================================================

struct App {
    deputy: Deputy,
    terminator: GracefulTerminator,
    recorder: RecordingExit,
    handler_runs: Arc<AtomicUsize>,
}

fn test_ipc_dir() -> IpcDir {
    IpcDir::new(std::env::temp_dir().join(format!("deputy-e2e-{}", uuid::Uuid::new_v4())))
}

fn app(ipc: IpcDir, pid: u32) -> App {
    let recorder = RecordingExit::new();
    let exit = Exit::with_backend(recorder.clone());
    let handler_runs = Arc::new(AtomicUsize::new(0));
    let runs = handler_runs.clone();

    let deputy = Deputy::builder()
        .exit(exit.clone())
        .shutdown_handler(ShutdownHandler::new(move || async move {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
        .shutdown_handler_timeout(Duration::from_secs(1))
        .build();
    let terminator = GracefulTerminator::new(ipc).with_pid(pid).with_exit(exit);

    App {
        deputy,
        terminator,
        recorder,
        handler_runs,
    }
}

async fn wait_for_exit(terminator: &GracefulTerminator) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while terminator.state() != TerminatorState::Exited {
        assert!(Instant::now() < deadline, "Terminator never exited");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// =============================================================================
// SCENARIOS
// =============================================================================

#[tokio::test]
async fn test_prestop_trigger_shuts_down_deputy() {
    let ipc = test_ipc_dir();
    let app = app(ipc.clone(), 50_001);

    let server = app
        .deputy
        .serve(
            HealthServerConfig::from_env()
                .with_host(IpAddr::V4(Ipv4Addr::LOCALHOST))
                .with_port(0),
        )
        .await
        .expect("serve");
    app.terminator
        .register(app.deputy.terminator_callback(), RegisterOptions::default())
        .expect("register");
    app.deputy.readied();

    let client = reqwest::Client::new();
    let ready_url = format!("http://{}/health/ready", server.local_addr());
    let live_url = format!("http://{}/health/live", server.local_addr());
    assert_eq!(client.get(&ready_url).send().await.expect("probe").status(), 200);

    // preStop hook: another process resolves the entrypoint and waits
    GracefulTerminator::new(ipc)
        .trigger(None, Wait::Acknowledged)
        .await
        .expect("trigger");
    wait_for_exit(&app.terminator).await;

    assert_eq!(client.get(&live_url).send().await.expect("probe").status(), 503);
    assert_eq!(client.get(&ready_url).send().await.expect("probe").status(), 503);
    assert_eq!(app.handler_runs.load(Ordering::SeqCst), 1);
    assert_eq!(
        app.recorder.codes(),
        vec![DEFAULT_EXIT_CODE],
        "Deputy exit wins, terminator exit is ignored"
    );

    server.stop().await;
}

#[tokio::test]
async fn test_cli_terminate_reaches_registered_process() {
    let ipc = test_ipc_dir();
    let app = app(ipc.clone(), 50_002);
    app.terminator
        .register(app.deputy.terminator_callback(), RegisterOptions::default())
        .expect("register");

    let output = tokio::process::Command::new(env!("CARGO_BIN_EXE_k8s-deputy"))
        .arg("--ipc-dir")
        .arg(ipc.path())
        .arg("terminate")
        .arg("--timeout")
        .arg("10")
        .output()
        .await
        .expect("run k8s-deputy");

    assert!(
        output.status.success(),
        "terminate failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    wait_for_exit(&app.terminator).await;
    assert_eq!(app.handler_runs.load(Ordering::SeqCst), 1);
    assert!(!app.deputy.health().is_live());
}

#[tokio::test]
async fn test_cli_entrypoint_prints_registered_pid() {
    let ipc = test_ipc_dir();
    let app = app(ipc.clone(), 50_003);
    app.terminator
        .register(app.deputy.terminator_callback(), RegisterOptions::default())
        .expect("register");

    let output = tokio::process::Command::new(env!("CARGO_BIN_EXE_k8s-deputy"))
        .arg("--ipc-dir")
        .arg(ipc.path())
        .arg("entrypoint")
        .output()
        .await
        .expect("run k8s-deputy");

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "50003");
}

#[tokio::test]
async fn test_cli_terminate_without_entrypoint_fails() {
    let ipc = test_ipc_dir();

    let output = tokio::process::Command::new(env!("CARGO_BIN_EXE_k8s-deputy"))
        .arg("--ipc-dir")
        .arg(ipc.path())
        .arg("terminate")
        .output()
        .await
        .expect("run k8s-deputy");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no entrypoint"));
}
