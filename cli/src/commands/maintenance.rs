//! `dockhand cleanup-duplicates` and `dockhand purge`.

use anyhow::Result;
use clap::Args;
use std::process::ExitCode;

use crate::app::AppContext;

/// Arguments shared by the registry maintenance commands.
#[derive(Args)]
pub struct ScopeArgs {
    /// Only this host (default: every host)
    pub host: Option<String>,
}

/// Remove duplicate records.
///
/// # Errors
///
/// Returns an error if the registry cannot be read or written.
pub async fn cleanup_duplicates(app: &AppContext, args: &ScopeArgs) -> Result<ExitCode> {
    let report = app
        .services
        .reconciler
        .cleanup_duplicates(args.host.as_deref())
        .await?;
    app.renderer().render_cleanup(&report)?;
    Ok(ExitCode::SUCCESS)
}

/// Delete container records. Nothing on the hosts is touched.
///
/// # Errors
///
/// Returns an error if the host is unknown, the prompt fails or the
/// registry cannot be written.
pub async fn purge(app: &AppContext, args: &ScopeArgs) -> Result<ExitCode> {
    let what = args
        .host
        .as_deref()
        .map_or_else(|| "all hosts".to_string(), |h| format!("host '{h}'"));
    if !app.non_interactive
        && !app.confirm(&format!("Delete every container record for {what}?"), false)?
    {
        app.output.info("Purge cancelled.");
        return Ok(ExitCode::SUCCESS);
    }
    let removed = app.services.reconciler.purge(args.host.as_deref()).await?;
    app.renderer().render_count("removed", removed)?;
    Ok(ExitCode::SUCCESS)
}
