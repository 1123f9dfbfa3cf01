//! Argument parsing and top-level behaviour.

#![allow(clippy::expect_used)]

use predicates::prelude::*;

use crate::{dockhand, home};

#[test]
fn test_no_args_shows_help_and_exits_two() {
    let home = home();
    dockhand(&home)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Control a fleet of Docker hosts"));
}

#[test]
fn test_help_lists_fleet_commands() {
    let home = home();
    let output = dockhand(&home).arg("--help").output().expect("run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for cmd in ["hosts", "containers", "discover", "check-updates", "update", "compose", "run", "logs", "config"] {
        assert!(stdout.contains(cmd), "help is missing {cmd}:\n{stdout}");
    }
}

#[test]
fn test_version_subcommand_prints_version() {
    let home = home();
    dockhand(&home)
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_version_json_is_an_object() {
    let home = home();
    let output = dockhand(&home)
        .args(["--json", "version"])
        .output()
        .expect("run");
    assert!(output.status.success());
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(v["version"], env!("CARGO_PKG_VERSION"));
}

#[test]
fn test_unknown_subcommand_fails() {
    let home = home();
    dockhand(&home).arg("frobnicate").assert().code(2);
}

#[test]
fn test_run_requires_hosts_or_all() {
    let home = home();
    dockhand(&home)
        .args(["run", "uptime"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--host"));
}

#[test]
fn test_run_rejects_malformed_operation_id() {
    let home = home();
    dockhand(&home)
        .args(["run", "--all", "--op-id", "not-an-id", "uptime"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("op-"));
}
