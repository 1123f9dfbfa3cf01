//! Commands that only read or clear local state, with no hosts reachable.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use predicates::prelude::*;

use crate::{dockhand, home};

#[test]
fn test_containers_empty_registry() {
    let home = home();
    dockhand(&home)
        .arg("containers")
        .assert()
        .success()
        .stdout(predicate::str::contains("No containers recorded"));
}

#[test]
fn test_containers_json_is_empty_array() {
    let home = home();
    let output = dockhand(&home)
        .args(["--json", "containers"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(v, serde_json::json!([]));
}

#[test]
fn test_logs_without_operations() {
    let home = home();
    dockhand(&home)
        .arg("logs")
        .assert()
        .success()
        .stdout(predicate::str::contains("No operations recorded"));
}

#[test]
fn test_logs_unknown_operation_fails() {
    let home = home();
    dockhand(&home)
        .args(["logs", "op-0123456789abcdef"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("op-0123456789abcdef"));
}

#[test]
fn test_refresh_without_scope_fails() {
    let home = home();
    dockhand(&home)
        .args(["refresh", "web-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing to refresh"));
}

#[test]
fn test_purge_with_yes_on_empty_registry() {
    let home = home();
    dockhand(&home)
        .args(["--yes", "purge"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 removed"));
}

#[test]
fn test_cleanup_duplicates_on_empty_registry() {
    let home = home();
    let output = dockhand(&home)
        .args(["--json", "cleanup-duplicates"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(v["deleted"], 0);
}
