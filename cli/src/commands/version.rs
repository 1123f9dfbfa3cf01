//! Version command

use anyhow::Result;
use std::process::ExitCode;

use crate::app::AppContext;

/// Run the version command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn run(app: &AppContext) -> Result<ExitCode> {
    let version = env!("CARGO_PKG_VERSION");
    if app.is_json() {
        crate::output::JsonRenderer.render(&serde_json::json!({ "version": version }))?;
    } else {
        println!("dockhand {version}");
    }
    Ok(ExitCode::SUCCESS)
}
