//! `dockhand discover` and `dockhand refresh`.

use anyhow::{Result, bail};
use clap::Args;
use std::process::ExitCode;

use crate::app::AppContext;
use crate::application::services::discovery::DiscoveryResult;
use crate::domain::operation::RefreshScope;
use crate::output::progress;

/// Arguments for the discover command.
#[derive(Args)]
pub struct DiscoverArgs {
    /// Only this host (default: every host)
    pub host: Option<String>,
}

/// Arguments for the refresh command.
#[derive(Args)]
pub struct RefreshArgs {
    /// Host id
    pub host: String,

    /// Container ids (full or short)
    #[arg(long = "id", value_name = "ID")]
    pub ids: Vec<String>,

    /// Container names
    #[arg(long = "name", value_name = "NAME", conflicts_with = "ids")]
    pub names: Vec<String>,

    /// Every container of a compose project
    #[arg(long, conflicts_with_all = ["ids", "names"])]
    pub project: Option<String>,
}

/// Run the discover command.
///
/// # Errors
///
/// Returns an error if the inventory cannot be read or the host is unknown.
pub async fn run(app: &AppContext, args: &DiscoverArgs) -> Result<ExitCode> {
    let reconciler = &app.services.reconciler;
    let pb = progress::maybe_spinner(
        app.output.show_progress() && !app.is_json(),
        "Discovering containers...",
    );
    let results = match &args.host {
        Some(host_id) => {
            let host = reconciler.hosts().get(host_id)?;
            vec![match reconciler.discover_on_host(&host).await {
                Ok(count) => DiscoveryResult {
                    host_id: host.id,
                    ok: true,
                    count,
                    error: None,
                },
                Err(e) => DiscoveryResult {
                    host_id: host.id,
                    ok: false,
                    count: 0,
                    error: Some(format!("{e:#}")),
                },
            }]
        }
        None => reconciler.discover_all().await?,
    };
    progress::finish_clear(&pb);
    app.renderer().render_discovery(&results)?;
    Ok(super::exit_code(results.iter().all(|r| r.ok)))
}

/// Run the refresh command.
///
/// # Errors
///
/// Returns an error if no scope is given, the host is unknown or the
/// registry cannot be updated.
pub async fn refresh(app: &AppContext, args: RefreshArgs) -> Result<ExitCode> {
    let scope = if let Some(project) = args.project {
        RefreshScope::ComposeProject(project)
    } else if !args.names.is_empty() {
        RefreshScope::ContainerNames(args.names)
    } else if !args.ids.is_empty() {
        RefreshScope::ContainerIds(args.ids)
    } else {
        bail!("nothing to refresh: pass --id, --name or --project");
    };
    let updated = app
        .services
        .reconciler
        .refresh_status(&args.host, &scope)
        .await?;
    app.renderer().render_count("refreshed", updated)?;
    Ok(ExitCode::SUCCESS)
}
