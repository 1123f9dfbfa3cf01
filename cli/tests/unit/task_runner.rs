//! Bounded fan-out of commands across hosts.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use dockhand_cli::application::services::task_runner::TaskRequest;
use dockhand_cli::application::ports::OperationLogStore;
use dockhand_common::{DISCOVER_COMMAND, OperationStatus};

use crate::mocks::{Fixture, ScriptedExecutor, fail, host, ok};

fn hosts(n: usize) -> Vec<dockhand_common::Host> {
    (1..=n).map(|i| host(&format!("h{i:02}"))).collect()
}

fn request(command: &str, fx_hosts: &[dockhand_common::Host], concurrency: Option<usize>) -> TaskRequest {
    TaskRequest {
        command: command.to_string(),
        host_ids: fx_hosts.iter().map(|h| h.id.clone()).collect(),
        concurrency,
        ..TaskRequest::default()
    }
}

#[tokio::test(start_paused = true)]
async fn concurrency_bounds_sessions_in_flight() {
    let targets = hosts(10);
    let fx = Fixture::new(
        targets.clone(),
        ScriptedExecutor::new().with_delay(Duration::from_millis(200)),
    );
    let report = fx
        .services
        .runner
        .run(request("uptime", &targets, Some(3)))
        .await
        .unwrap();
    assert_eq!(report.outcomes.len(), 10);
    assert_eq!(report.succeeded(), 10);
    assert!(fx.exec.max_in_flight() <= 3, "{}", fx.exec.max_in_flight());
    assert_eq!(fx.exec.max_in_flight(), 3);
}

#[tokio::test]
async fn one_failing_host_fails_the_job_but_not_the_others() {
    let targets = hosts(6);
    let fx = Fixture::new(
        targets.clone(),
        ScriptedExecutor::new()
            .on_host("h04", "df -h", fail("df: /data: No such file or directory"))
            .on("df -h", ok("/dev/sda1 40G\n")),
    );
    let report = fx
        .services
        .runner
        .run(request("df -h", &targets, None))
        .await
        .unwrap();
    assert_eq!(report.status, OperationStatus::Error);
    assert_eq!(report.succeeded(), 5);
    assert_eq!(report.failed(), 1);
    let bad = report.outcomes.iter().find(|o| !o.ok).unwrap();
    assert_eq!(bad.host_id, "h04");
    assert_eq!(bad.exit_code, Some(1));

    let log = fx.services.ports.operations.get(&report.op_id).await.unwrap().unwrap();
    assert_eq!(log.status, OperationStatus::Error);
    assert!(log.ended_at.is_some());
    assert_eq!(
        log.entries.iter().filter(|e| e.content == "/dev/sda1 40G").count(),
        5
    );
}

#[tokio::test]
async fn unknown_host_is_a_failed_target() {
    let targets = hosts(1);
    let fx = Fixture::new(targets.clone(), ScriptedExecutor::new());
    let mut req = request("true", &targets, Some(2));
    req.host_ids.push("ghost".into());
    let report = fx.services.runner.run(req).await.unwrap();
    assert_eq!(report.failed(), 1);
    assert!(report.outcomes.iter().any(|o| o.host_id == "ghost" && !o.ok));
}

#[tokio::test]
async fn discover_command_runs_reconciliation_instead_of_a_shell() {
    let targets = hosts(2);
    let fx = Fixture::new(targets.clone(), ScriptedExecutor::new());
    let report = fx
        .services
        .runner
        .run(request(DISCOVER_COMMAND, &targets, None))
        .await
        .unwrap();
    assert_eq!(report.succeeded(), 2);
    assert_eq!(fx.exec.count(DISCOVER_COMMAND), 0);
    assert_eq!(fx.exec.count("docker ps -a"), 2);
}
