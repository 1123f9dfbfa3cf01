//! `dockhand containers` — list recorded containers.

use anyhow::Result;
use clap::Args;
use std::process::ExitCode;

use crate::app::AppContext;

/// Arguments for the containers command.
#[derive(Args)]
pub struct ContainersArgs {
    /// Only this host
    pub host: Option<String>,

    /// Only containers with an update available
    #[arg(long)]
    pub updates: bool,
}

/// Run the containers command.
///
/// # Errors
///
/// Returns an error if the host is unknown or the registry cannot be read.
pub async fn run(app: &AppContext, args: &ContainersArgs) -> Result<ExitCode> {
    let ports = &app.services.ports;
    let mut records = match &args.host {
        Some(h) => {
            ports.hosts.get(h)?;
            ports.containers.list_by_host(h).await?
        }
        None => ports.containers.list_all().await?,
    };
    if args.updates {
        records.retain(|r| r.update_available);
    }
    records.sort_by(|a, b| (&a.host_id, &a.name).cmp(&(&b.host_id, &b.name)));
    app.renderer().render_containers(&records)?;
    Ok(ExitCode::SUCCESS)
}
