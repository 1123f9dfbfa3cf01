//! Integration tests for the dockhand CLI
//!
//! These tests spawn the actual binary. Every test points `DOCKHAND_HOME` at a
//! temporary directory so the operator's real state is never touched.

mod cli_tests;
mod config_command;
mod state_commands;

use assert_cmd::Command;
use tempfile::TempDir;

/// A `dockhand` command isolated under `home`.
pub fn dockhand(home: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("dockhand"));
    cmd.env("NO_COLOR", "1")
        .env("DOCKHAND_HOME", home.path())
        .env_remove("DOCKHAND_SETTINGS")
        .env_remove("DOCKHAND_HOSTS")
        .env_remove("DOCKHAND_SECRET_KEY")
        .env_remove("RUST_LOG");
    cmd
}

#[allow(clippy::expect_used)]
pub fn home() -> TempDir {
    TempDir::new().expect("temp dir")
}
