//! Network retries in the docker adapter, on a paused clock.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use dockhand_cli::application::services::docker::{DockerCli, args};
use dockhand_cli::domain::network::RetryPolicy;

use crate::mocks::{MemSettings, ScriptedExecutor, fail, host, ok, passthrough_secrets};

fn docker(exec: ScriptedExecutor) -> (Arc<ScriptedExecutor>, DockerCli) {
    let exec = Arc::new(exec);
    let cli = DockerCli::new(
        exec.clone(),
        Arc::new(MemSettings::default()),
        Arc::new(passthrough_secrets()),
    );
    (exec, cli)
}

#[tokio::test(start_paused = true)]
async fn transient_failures_back_off_then_succeed() {
    let (exec, cli) = docker(ScriptedExecutor::new().on_seq(
        "docker pull",
        vec![
            fail("read tcp 10.0.0.2:443: connection reset by peer"),
            fail("net/http: TLS handshake timeout"),
            ok("Status: Downloaded newer image"),
        ],
    ));
    let start = Instant::now();
    let out = cli
        .run_with_retry(&host("h1"), &args(&["pull", "nginx:1.27"]))
        .await
        .unwrap();
    assert!(out.success());
    assert_eq!(exec.count("docker pull"), 3);
    // 1s then 2s of backoff.
    assert!(start.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn non_network_failure_is_not_retried() {
    let (exec, cli) = docker(ScriptedExecutor::new().on("docker pull", fail("manifest unknown")));
    let out = cli
        .run_with_retry(&host("h1"), &args(&["pull", "nginx:nope"]))
        .await
        .unwrap();
    assert!(!out.success());
    assert_eq!(exec.count("docker pull"), 1);
}

#[tokio::test(start_paused = true)]
async fn retries_stop_after_the_attempt_limit() {
    let (exec, cli) = docker(ScriptedExecutor::new().on("docker pull", fail("connection refused")));
    let out = cli
        .run_with_retry(&host("h1"), &args(&["pull", "nginx"]))
        .await
        .unwrap();
    assert_eq!(out.exit_code, 1);
    assert_eq!(exec.count("docker pull"), 3);
}

#[tokio::test(start_paused = true)]
async fn custom_policy_controls_attempts_and_cap() {
    let (exec, cli) = docker(ScriptedExecutor::new().on("docker manifest", fail("i/o timeout")));
    let cli = cli.with_retry(RetryPolicy {
        attempts: 5,
        base: Duration::from_millis(500),
        max: Duration::from_secs(1),
    });
    let start = Instant::now();
    let out = cli
        .run_with_retry(&host("h1"), &args(&["manifest", "inspect", "nginx"]))
        .await
        .unwrap();
    assert!(!out.success());
    assert_eq!(exec.count("docker manifest inspect nginx"), 5);
    // 0.5s + 1s + 1s + 1s, the last three capped.
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(3500) && elapsed < Duration::from_secs(4));
}
