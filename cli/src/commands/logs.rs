//! `dockhand logs` — list operations or replay one.

use anyhow::{Context, Result};
use clap::Args;
use std::process::ExitCode;

use dockhand_common::OperationStatus;

use crate::app::AppContext;
use crate::application::services::journal::subscribe_with_replay;
use crate::commands::run::{print_event, print_events};

/// Arguments for the logs command.
#[derive(Args)]
pub struct LogsArgs {
    /// Operation id (omit to list recent operations)
    pub op_id: Option<String>,

    /// Keep streaming until the operation finishes
    #[arg(long, short)]
    pub follow: bool,
}

/// Run the logs command.
///
/// # Errors
///
/// Returns an error if the operation does not exist or the log store
/// cannot be read.
pub async fn run(app: &AppContext, args: LogsArgs) -> Result<ExitCode> {
    let store = &app.services.ports.operations;
    let Some(op_id) = args.op_id else {
        let logs = store.list().await?;
        app.renderer().render_operation_list(&logs)?;
        return Ok(ExitCode::SUCCESS);
    };

    if args.follow && !app.is_json() {
        return follow(app, &op_id).await;
    }

    let log = store
        .get(&op_id)
        .await?
        .with_context(|| format!("operation '{op_id}' not found"))?;
    app.renderer().render_operation(&log)?;
    Ok(super::exit_code(log.status != OperationStatus::Error))
}

async fn follow(app: &AppContext, op_id: &str) -> Result<ExitCode> {
    let ports = &app.services.ports;
    let sub = subscribe_with_replay(op_id, ports.operations.as_ref(), ports.bus.as_ref()).await?;
    let styles = &app.output.styles;
    for event in &sub.replay {
        if !print_event(event, styles) {
            break;
        }
    }
    if let Some(rx) = sub.live {
        print_events(rx, styles.clone()).await;
    }
    let status = ports
        .operations
        .get(op_id)
        .await?
        .map_or(sub.status, |log| log.status);
    app.output.kv("Status:", &status.to_string());
    Ok(super::exit_code(status != OperationStatus::Error))
}
