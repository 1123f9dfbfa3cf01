//! Human-readable terminal renderer.

use owo_colors::OwoColorize as _;

use dockhand_common::{ContainerRecord, OperationLog, OperationStatus, Settings, StreamKind};

use crate::application::services::discovery::{CleanupReport, DiscoveryResult};
use crate::application::services::task_runner::TaskReport;
use crate::application::services::update_check::UpdateCheckResult;
use crate::domain::config::{VALID_CONFIG_KEYS, get_setting};
use crate::output::{ConnectionTest, HostSummary, OutcomeView, OutputContext};

/// Renders domain types as human-readable terminal output using `OutputContext`.
pub struct HumanRenderer<'a> {
    ctx: &'a OutputContext,
}

impl<'a> HumanRenderer<'a> {
    /// Create a new `HumanRenderer` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    pub fn render_hosts(&self, hosts: &[HostSummary]) {
        if hosts.is_empty() {
            if !self.ctx.quiet {
                println!("No hosts configured. Add them to ~/.dockhand/hosts.yaml");
            }
            return;
        }
        println!(
            "  {}",
            format!("{:<16} {:<28} {:<8} {:<15} TAGS", "ID", "ADDRESS", "ROLE", "AUTH")
                .style(self.ctx.styles.header)
        );
        for h in hosts {
            let role = match h.role {
                dockhand_common::HostRole::Local => "local",
                dockhand_common::HostRole::Remote => "remote",
            };
            let address = format!("{}@{}:{}", h.user, h.address, h.port);
            println!(
                "  {:<16} {address:<28} {role:<8} {:<15} {}",
                h.id,
                h.auth,
                h.tags.join(",")
            );
        }
    }

    pub fn render_connection_test(&self, test: &ConnectionTest) {
        if test.ok {
            let version = test.docker_version.as_deref().unwrap_or("unknown");
            self.ctx
                .success(&format!("{}: reachable, docker {version}", test.host_id));
        } else {
            self.ctx.error(&format!(
                "{}: {}",
                test.host_id,
                test.error.as_deref().unwrap_or("connection failed")
            ));
        }
    }

    pub fn render_containers(&self, containers: &[ContainerRecord]) {
        if containers.is_empty() {
            if !self.ctx.quiet {
                println!("No containers recorded. Run: dockhand discover");
            }
            return;
        }
        println!(
            "  {}",
            format!(
                "{:<12} {:<14} {:<24} {:<32} {:<10} UPDATE",
                "HOST", "ID", "NAME", "IMAGE", "STATE"
            )
            .style(self.ctx.styles.header)
        );
        for c in containers {
            let state = if c.is_running() {
                format!("{:<10}", c.state).style(self.ctx.styles.success).to_string()
            } else {
                format!("{:<10}", c.state).style(self.ctx.styles.dim).to_string()
            };
            let update = if c.update_available {
                "available".style(self.ctx.styles.warning).to_string()
            } else {
                String::new()
            };
            let name = match &c.compose {
                Some(meta) => format!("{} ({}/{})", c.name, meta.project, meta.service),
                None => c.name.clone(),
            };
            println!(
                "  {:<12} {:<14} {name:<24} {:<32} {state} {update}",
                c.host_id,
                dockhand_common::short_id(&c.container_id),
                c.image_ref(),
            );
        }
    }

    pub fn render_discovery(&self, results: &[DiscoveryResult]) {
        for r in results {
            if r.ok {
                self.ctx
                    .success(&format!("{}: {} containers", r.host_id, r.count));
            } else {
                self.ctx.error(&format!(
                    "{}: {}",
                    r.host_id,
                    r.error.as_deref().unwrap_or("discovery failed")
                ));
            }
        }
    }

    pub fn render_update_checks(&self, results: &[UpdateCheckResult]) {
        if results.is_empty() {
            self.ctx.info("No containers to check.");
            return;
        }
        for r in results {
            let target = format!("{}/{} ({})", r.host_id, r.name, r.image);
            if let Some(err) = &r.error {
                let note = if r.rate_limited { " [rate limited]" } else { "" };
                self.ctx.warn(&format!("{target}: {err}{note}"));
            } else if r.update_available {
                self.ctx.warn(&format!("{target}: update available"));
            } else {
                self.ctx.success(&format!("{target}: up to date"));
            }
        }
        let available = results.iter().filter(|r| r.update_available).count();
        if available > 0 && !self.ctx.quiet {
            println!();
            self.ctx.info(&format!(
                "{available} update(s) available. Run: dockhand update <host> <container>"
            ));
        }
    }

    pub fn render_outcome(&self, view: &OutcomeView<'_>) {
        let suffix = view
            .op_id
            .map(|id| format!(" [{id}]"))
            .unwrap_or_default();
        if view.outcome.ok {
            self.ctx
                .success(&format!("{} {}{suffix}", view.action, view.target));
        } else {
            self.ctx.error(&format!(
                "{} {} failed: {}{suffix}",
                view.action,
                view.target,
                view.outcome.reason.as_deref().unwrap_or("unknown error")
            ));
        }
    }

    pub fn render_count(&self, what: &str, count: usize) {
        self.ctx.success(&format!("{count} {what}"));
    }

    pub fn render_cleanup(&self, report: &CleanupReport) {
        self.ctx.success(&format!(
            "removed {} duplicate record(s), promoted {} to full IDs",
            report.deleted, report.promoted
        ));
    }

    pub fn render_task_report(&self, report: &TaskReport) {
        if self.ctx.quiet {
            return;
        }
        println!();
        for o in &report.outcomes {
            if o.ok {
                self.ctx.success(&o.host_id);
            } else {
                let why = o
                    .error
                    .clone()
                    .or_else(|| o.exit_code.map(|c| format!("exit code {c}")))
                    .unwrap_or_default();
                self.ctx.error(&format!("{}: {why}", o.host_id));
            }
        }
        println!();
        self.ctx.kv(
            "Operation:",
            &format!(
                "{} {} ({} ok, {} failed)",
                report.op_id,
                status_text(report.status),
                report.succeeded(),
                report.failed()
            ),
        );
    }

    pub fn render_operation(&self, log: &OperationLog) {
        self.ctx.header(&format!("{}: {}", log.id, log.title));
        self.ctx.kv("Status:", status_text(log.status));
        self.ctx.kv("Started:", &log.started_at.to_rfc3339());
        if let Some(ended) = log.ended_at {
            self.ctx.kv("Ended:", &ended.to_rfc3339());
        }
        if self.ctx.quiet {
            return;
        }
        println!();
        for e in &log.entries {
            let host = e.host_id.as_deref().unwrap_or("-");
            let prefix = format!("[{host}]");
            match e.stream {
                StreamKind::Stderr => println!(
                    "  {} {}",
                    prefix.style(self.ctx.styles.error),
                    e.content
                ),
                StreamKind::System => println!(
                    "  {} {}",
                    prefix.style(self.ctx.styles.dim),
                    e.content.style(self.ctx.styles.dim)
                ),
                StreamKind::Stdout => println!("  {} {}", prefix.style(self.ctx.styles.dim), e.content),
            }
        }
    }

    pub fn render_operation_list(&self, logs: &[OperationLog]) {
        if logs.is_empty() {
            if !self.ctx.quiet {
                println!("No operations recorded.");
            }
            return;
        }
        for o in logs {
            println!(
                "  {:<20} {:<10} {}  {}",
                o.id,
                status_text(o.status),
                o.started_at.format("%Y-%m-%d %H:%M:%S"),
                o.title
            );
        }
    }

    /// Render the current settings.
    pub fn render_config(&self, settings: &Settings, path: &std::path::Path) {
        println!();
        println!(
            "  {}",
            format!("Settings ({})", path.display()).style(self.ctx.styles.header)
        );
        println!();
        for key in VALID_CONFIG_KEYS {
            let value = get_setting(settings, key).unwrap_or_default();
            let value = if value.is_empty() { "(not set)".to_string() } else { value };
            println!("  {:<24} {value}", format!("{key}:"));
        }
        println!();
        println!("  {}", "Environment:".style(self.ctx.styles.bold));
        for var in ["DOCKHAND_HOME", "DOCKHAND_SETTINGS", "DOCKHAND_HOSTS", "NO_COLOR"] {
            println!(
                "    {:<20} {}",
                format!("{var}:"),
                std::env::var(var).unwrap_or_else(|_| "(not set)".to_string())
            );
        }
        let key_state = if std::env::var("DOCKHAND_SECRET_KEY").is_ok() {
            "(set)"
        } else {
            "(not set)"
        };
        println!("    {:<20} {key_state}", "DOCKHAND_SECRET_KEY:");
    }

    pub fn render_setting(&self, key: &str, shown: &str) {
        self.ctx.success(&format!("Set {key} = {shown}"));
    }
}

fn status_text(status: OperationStatus) -> &'static str {
    match status {
        OperationStatus::Pending => "pending",
        OperationStatus::Running => "running",
        OperationStatus::Completed => "completed",
        OperationStatus::Error => "error",
        OperationStatus::Cancelled => "cancelled",
    }
}
