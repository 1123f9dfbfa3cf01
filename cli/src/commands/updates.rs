//! `dockhand check-updates` and `dockhand check`.

use anyhow::Result;
use clap::Args;
use std::process::ExitCode;

use crate::app::AppContext;
use crate::output::progress;

/// Arguments for the check-updates command.
#[derive(Args)]
pub struct CheckUpdatesArgs {
    /// Only this host (default: every host)
    pub host: Option<String>,
}

/// Arguments for the single-container check.
#[derive(Args)]
pub struct CheckArgs {
    /// Host id
    pub host: String,
    /// Container id, short id or name
    pub container: String,
}

/// Check recorded containers for newer registry images.
///
/// # Errors
///
/// Returns an error if the host is unknown or the registry cannot be read.
pub async fn check_updates(app: &AppContext, args: &CheckUpdatesArgs) -> Result<ExitCode> {
    let checker = &app.services.checker;
    let pb = progress::maybe_spinner(
        app.output.show_progress() && !app.is_json(),
        "Checking registries...",
    );
    let results = match &args.host {
        Some(h) => checker.check_host(h).await,
        None => checker.check_all().await,
    };
    progress::finish_clear(&pb);
    let results = results?;
    app.renderer().render_update_checks(&results)?;
    Ok(ExitCode::SUCCESS)
}

/// Check one container.
///
/// # Errors
///
/// Returns an error if the host or container is unknown.
pub async fn check(app: &AppContext, args: &CheckArgs) -> Result<ExitCode> {
    let result = app
        .services
        .checker
        .check_container(&args.host, &args.container)
        .await?;
    let ok = result.error.is_none();
    app.renderer().render_update_checks(std::slice::from_ref(&result))?;
    Ok(super::exit_code(ok))
}
