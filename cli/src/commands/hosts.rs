//! `dockhand hosts` — inventory listing and ad-hoc connection tests.

use anyhow::Result;
use clap::Subcommand;
use std::process::ExitCode;

use crate::app::AppContext;
use crate::application::ports::ExecOptions;
use crate::application::services::credentials::resolve_credentials;
use crate::output::{ConnectionTest, HostSummary, progress};

const DOCKER_VERSION: &str = "docker version --format '{{.Server.Version}}'";

/// Hosts subcommands.
#[derive(Subcommand)]
pub enum HostsCommand {
    /// List configured hosts
    List,
    /// Check that a host is reachable and runs Docker
    Test {
        /// Host id
        host: String,
    },
}

/// Run the hosts command.
///
/// # Errors
///
/// Returns an error if the inventory cannot be read or the host is unknown.
pub async fn run(app: &AppContext, cmd: HostsCommand) -> Result<ExitCode> {
    match cmd {
        HostsCommand::List => {
            let hosts = app.services.ports.hosts.list()?;
            let summaries: Vec<HostSummary> = hosts.iter().map(HostSummary::from).collect();
            app.renderer().render_hosts(&summaries)?;
            Ok(ExitCode::SUCCESS)
        }
        HostsCommand::Test { host } => test_connection(app, &host).await,
    }
}

/// Connection tests run before the host key is known, so first contact
/// accepts and discards it.
async fn test_connection(app: &AppContext, host_id: &str) -> Result<ExitCode> {
    let ports = &app.services.ports;
    let host = ports.hosts.get(host_id)?;
    let credentials = resolve_credentials(&host, ports.secrets.as_ref())?;
    let options = ExecOptions {
        strict_host_key: false,
        ..ExecOptions::from_settings(&app.services.docker.settings())
    };

    let pb = progress::maybe_spinner(
        app.output.show_progress() && !app.is_json(),
        &format!("Connecting to {host_id}..."),
    );
    let out = ports
        .executor
        .execute(&host, &credentials, DOCKER_VERSION, &options)
        .await;
    progress::finish_clear(&pb);

    let test = if out.success() {
        ConnectionTest {
            host_id: host.id.clone(),
            ok: true,
            docker_version: Some(out.stdout.trim().to_string()).filter(|v| !v.is_empty()),
            error: None,
        }
    } else {
        ConnectionTest {
            host_id: host.id.clone(),
            ok: false,
            docker_version: None,
            error: Some(out.failure_message()),
        }
    };
    app.renderer().render_connection_test(&test)?;
    Ok(super::exit_code(test.ok))
}
