//! Integration tests for `dockhand config`.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use predicates::prelude::*;

use crate::{dockhand, home};

#[test]
fn test_config_help_shows_show_and_set_subcommands() {
    let home = home();
    dockhand(&home)
        .args(["config", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("show"))
        .stdout(predicate::str::contains("set"));
}

#[test]
fn test_config_show_lists_every_key() {
    let home = home();
    let output = dockhand(&home).args(["config", "show"]).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for key in ["ssh_concurrency", "command_timeout_secs", "proxy.enabled", "registry.password"] {
        assert!(stdout.contains(key), "config show is missing {key}:\n{stdout}");
    }
}

#[test]
fn test_config_show_does_not_create_settings_file() {
    let home = home();
    dockhand(&home).args(["config", "show"]).assert().success();
    assert!(!home.path().join("settings.yaml").exists());
}

#[test]
fn test_config_set_clamps_concurrency() {
    let home = home();
    dockhand(&home)
        .args(["config", "set", "ssh_concurrency", "500"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ssh_concurrency = 100"));

    let written = std::fs::read_to_string(home.path().join("settings.yaml")).unwrap();
    assert!(written.contains("ssh_concurrency: 100"), "got: {written}");
}

#[test]
fn test_config_set_persists_between_runs() {
    let home = home();
    dockhand(&home)
        .args(["config", "set", "command_timeout_secs", "45"])
        .assert()
        .success();
    let output = dockhand(&home)
        .args(["--json", "config", "show"])
        .output()
        .unwrap();
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(v["settings"]["command_timeout_secs"], "45");
}

#[test]
fn test_config_set_unknown_key_fails() {
    let home = home();
    dockhand(&home)
        .args(["config", "set", "frobnicate", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ssh_concurrency"));
}

#[test]
fn test_config_set_invalid_bool_fails() {
    let home = home();
    dockhand(&home)
        .args(["config", "set", "proxy.enabled", "perhaps"])
        .assert()
        .failure();
}

#[test]
fn test_config_set_password_without_key_fails() {
    let home = home();
    dockhand(&home)
        .args(["config", "set", "registry.password", "hunter2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("DOCKHAND_SECRET_KEY"));
    assert!(!home.path().join("settings.yaml").exists());
}

#[test]
fn test_config_set_password_is_encrypted_and_masked() {
    let home = home();
    // 32 zero bytes
    let key = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";
    dockhand(&home)
        .env("DOCKHAND_SECRET_KEY", key)
        .args(["config", "set", "registry.password", "hunter2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hunter2").not());

    let written = std::fs::read_to_string(home.path().join("settings.yaml")).unwrap();
    assert!(!written.contains("hunter2"));
    assert!(written.contains("v1:"));
}
