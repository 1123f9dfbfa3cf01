//! Command implementations

pub mod config;
pub mod containers;
pub mod discover;
pub mod hosts;
pub mod lifecycle;
pub mod logs;
pub mod maintenance;
pub mod run;
pub mod updates;
pub mod version;

use std::process::ExitCode;

/// Exit code for a command whose targets did not all succeed.
#[must_use]
pub fn exit_code(ok: bool) -> ExitCode {
    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}
