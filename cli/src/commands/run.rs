//! `dockhand run` — execute a command across hosts with bounded concurrency.
//!
//! Output streams live while the task runs; the persisted operation log
//! can be replayed later with `dockhand logs <op-id>`.

use anyhow::{Result, bail};
use clap::Args;
use owo_colors::OwoColorize as _;
use std::process::ExitCode;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use dockhand_common::{TaskEvent, TaskEventKind, validate_operation_id};

use crate::app::AppContext;
use crate::application::services::journal::LiveEvents;
use crate::application::services::task_runner::TaskRequest;
use crate::domain::operation::generate_operation_id;
use crate::output::Styles;

/// Arguments for the run command.
#[derive(Args)]
pub struct RunArgs {
    /// Target host (repeatable)
    #[arg(long = "host", short = 'H', value_name = "ID", required_unless_present = "all")]
    pub hosts: Vec<String>,

    /// Target every host in the inventory
    #[arg(long, conflicts_with = "hosts")]
    pub all: bool,

    /// Parallel SSH sessions (default: ssh.concurrency setting)
    #[arg(long, short = 'c')]
    pub concurrency: Option<usize>,

    /// Operation id for log correlation (generated when omitted)
    #[arg(long)]
    pub op_id: Option<String>,

    /// Operation title shown in the log listing
    #[arg(long)]
    pub title: Option<String>,

    /// Shell command, or `@discover`
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// Run the run command.
///
/// # Errors
///
/// Returns an error if a host is unknown or the operation log cannot be
/// created.
pub async fn run(app: &AppContext, args: RunArgs) -> Result<ExitCode> {
    if let Some(id) = &args.op_id {
        validate_operation_id(id)?;
    }
    let ports = &app.services.ports;
    let host_ids = if args.all {
        ports.hosts.list()?.into_iter().map(|h| h.id).collect()
    } else {
        for id in &args.hosts {
            ports.hosts.get(id)?;
        }
        args.hosts
    };
    if host_ids.is_empty() {
        bail!("no hosts to run on");
    }

    let op_id = args.op_id.unwrap_or_else(generate_operation_id);
    let printer = (!app.is_json() && !app.output.quiet).then(|| {
        let rx = ports.bus.subscribe(&op_id);
        tokio::spawn(print_events(LiveEvents::new(rx), app.output.styles.clone()))
    });

    let request = TaskRequest {
        title: args.title,
        command: args.command.join(" "),
        host_ids,
        concurrency: args.concurrency,
        op_id: Some(op_id),
    };
    let report = match app.services.runner.run(request).await {
        Ok(report) => report,
        Err(e) => {
            if let Some(handle) = printer {
                handle.abort();
            }
            return Err(e);
        }
    };
    if let Some(handle) = printer {
        if let Err(e) = handle.await {
            warn!(error = %e, "output printer stopped");
        }
    }

    app.renderer().render_task_report(&report)?;
    Ok(super::exit_code(report.failed() == 0))
}

/// Print task events until the end event arrives or the channel closes.
pub async fn print_events(mut rx: LiveEvents, styles: Styles) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if !print_event(&event, &styles) {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "output fell behind, lines dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Print one event; `false` once the stream is over.
pub fn print_event(event: &TaskEvent, styles: &Styles) -> bool {
    let host = event.host_id.as_deref().unwrap_or("-");
    let prefix = format!("[{host}]");
    let text = event
        .payload
        .as_str()
        .map_or_else(|| event.payload.to_string(), str::to_string);
    match event.kind {
        TaskEventKind::Data => println!("{} {text}", prefix.style(styles.host)),
        TaskEventKind::Stderr => eprintln!("{} {text}", prefix.style(styles.host)),
        TaskEventKind::Error => eprintln!("{} {}", prefix.style(styles.host), text.style(styles.error)),
        TaskEventKind::End => return false,
    }
    true
}
