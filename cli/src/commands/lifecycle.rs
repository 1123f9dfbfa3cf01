//! Container lifecycle commands: start, stop, restart, update, compose.

use anyhow::Result;
use clap::Args;
use std::process::ExitCode;

use crate::app::AppContext;
use crate::domain::compose::ComposeOp;
use crate::domain::operation::{ContainerAction, OperationOutcome, generate_operation_id};
use crate::output::OutcomeView;

/// Target container for lifecycle commands.
#[derive(Args)]
pub struct ContainerArgs {
    /// Host id
    pub host: String,
    /// Container id, short id or name
    pub container: String,
    /// Operation id for log correlation (generated when omitted)
    #[arg(long)]
    pub op_id: Option<String>,
}

/// Arguments for `dockhand compose`.
#[derive(Args)]
pub struct ComposeArgs {
    /// Host id
    pub host: String,
    /// Compose project name
    pub project: String,
    /// down | pull | up | restart | start | stop
    pub op: ComposeOp,
    /// Project directory on the host
    #[arg(long)]
    pub working_dir: Option<String>,
    /// Operation id for log correlation (generated when omitted)
    #[arg(long)]
    pub op_id: Option<String>,
}

/// Start, stop or restart one container.
///
/// # Errors
///
/// Returns an error only if rendering fails.
pub async fn container_action(
    app: &AppContext,
    args: ContainerArgs,
    action: ContainerAction,
) -> Result<ExitCode> {
    let op_id = args.op_id.unwrap_or_else(generate_operation_id);
    let outcome = app
        .services
        .lifecycle
        .container_action(&args.host, &args.container, action, Some(op_id.clone()))
        .await;
    let target = format!("{}/{}", args.host, args.container);
    render(app, action.verb(), &target, &op_id, &outcome)
}

/// Pull and recreate one container.
///
/// # Errors
///
/// Returns an error only if rendering fails.
pub async fn update(app: &AppContext, args: ContainerArgs) -> Result<ExitCode> {
    let op_id = args.op_id.unwrap_or_else(generate_operation_id);
    if !app.is_json() {
        app.output
            .info(&format!("Updating {} on {} [{op_id}]", args.container, args.host));
    }
    let outcome = app
        .services
        .lifecycle
        .update(&args.host, &args.container, Some(op_id.clone()))
        .await;
    let target = format!("{}/{}", args.host, args.container);
    render(app, "update", &target, &op_id, &outcome)
}

/// Run a compose operation on a whole project.
///
/// # Errors
///
/// Returns an error only if rendering fails.
pub async fn compose(app: &AppContext, args: ComposeArgs) -> Result<ExitCode> {
    let op_id = args.op_id.unwrap_or_else(generate_operation_id);
    let outcome = app
        .services
        .lifecycle
        .compose_operate(
            &args.host,
            &args.project,
            args.working_dir.as_deref(),
            args.op,
            Some(op_id.clone()),
        )
        .await;
    let action = format!("compose {}", args.op);
    let target = format!("{}/{}", args.host, args.project);
    render(app, &action, &target, &op_id, &outcome)
}

fn render(
    app: &AppContext,
    action: &str,
    target: &str,
    op_id: &str,
    outcome: &OperationOutcome,
) -> Result<ExitCode> {
    app.renderer().render_outcome(&OutcomeView {
        action,
        target,
        op_id: Some(op_id),
        outcome,
    })?;
    Ok(super::exit_code(outcome.ok))
}
