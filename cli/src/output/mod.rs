//! Output formatting module

pub mod human;
pub mod json;
pub mod progress;
pub mod styles;

use anyhow::Result;
use console::Term;
use owo_colors::OwoColorize as _;
use serde::Serialize;
pub use human::HumanRenderer;
pub use json::JsonRenderer;
pub use styles::Styles;

use dockhand_common::{ContainerRecord, Host, HostRole, OperationLog, Settings};

use crate::application::services::discovery::{CleanupReport, DiscoveryResult};
use crate::application::services::task_runner::TaskReport;
use crate::application::services::update_check::UpdateCheckResult;
use crate::domain::operation::OperationOutcome;

/// Output context carrying styling and terminal state.
pub struct OutputContext {
    /// Stylesheet for colored output.
    pub styles: Styles,
    /// Whether stdout is a TTY.
    pub is_tty: bool,
    /// Whether to suppress non-error output.
    pub quiet: bool,
}

impl OutputContext {
    /// Create output context based on CLI flags and environment.
    #[must_use]
    pub fn new(no_color: bool, quiet: bool) -> Self {
        let is_tty = Term::stdout().is_term();
        let use_colors = !no_color && is_tty && std::env::var("NO_COLOR").is_err();

        let mut styles = Styles::default();
        if use_colors {
            styles.colorize();
        }

        Self {
            styles,
            is_tty,
            quiet,
        }
    }

    /// Check if progress indicators should be shown.
    #[must_use]
    pub fn show_progress(&self) -> bool {
        self.is_tty && !self.quiet
    }

    /// Print a success message prefixed with `✓`. Suppressed when `quiet`.
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("  {} {msg}", "✓".style(self.styles.success));
        }
    }

    /// Print a warning message prefixed with `⚠`. Suppressed when `quiet`.
    pub fn warn(&self, msg: &str) {
        if !self.quiet {
            println!("  {} {msg}", "⚠".style(self.styles.warning));
        }
    }

    /// Print an error message prefixed with `✗` to stderr. Never suppressed.
    pub fn error(&self, msg: &str) {
        eprintln!("  {} {msg}", "✗".style(self.styles.error));
    }

    /// Print an info message prefixed with `ℹ`. Suppressed when `quiet`.
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            println!("  {} {msg}", "ℹ".style(self.styles.info));
        }
    }

    /// Print a section header. Suppressed when `quiet`.
    pub fn header(&self, msg: &str) {
        if !self.quiet {
            println!("  {}", msg.style(self.styles.header));
        }
    }

    /// Print a key-value pair with the key dimmed. Suppressed when `quiet`.
    pub fn kv(&self, key: &str, value: &str) {
        if !self.quiet {
            println!("  {}  {value}", key.style(self.styles.dim));
        }
    }
}

/// Inventory entry safe to print: auth material reduced to its kind.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HostSummary {
    pub id: String,
    pub address: String,
    pub user: String,
    pub port: u16,
    pub role: HostRole,
    pub tags: Vec<String>,
    pub auth: &'static str,
}

impl From<&Host> for HostSummary {
    fn from(host: &Host) -> Self {
        let auth = match (&host.auth.private_key, &host.auth.password) {
            (Some(_), _) if host.auth.passphrase.is_some() => "key+passphrase",
            (Some(_), _) => "key",
            (None, Some(_)) => "password",
            (None, None) => "agent",
        };
        Self {
            id: host.id.clone(),
            address: host.address.clone(),
            user: host.user.clone(),
            port: host.port,
            role: host.role,
            tags: host.tags.clone(),
            auth,
        }
    }
}

/// Result of an ad-hoc connection test.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionTest {
    pub host_id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One operation outcome, tagged with the operation id when journaled.
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeView<'a> {
    pub action: &'a str,
    pub target: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_id: Option<&'a str>,
    #[serde(flatten)]
    pub outcome: &'a OperationOutcome,
}

/// Dispatches rendering to the human or JSON renderer.
pub enum Renderer<'a> {
    Human(HumanRenderer<'a>),
    Json(JsonRenderer),
}

impl Renderer<'_> {
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_hosts(&self, hosts: &[HostSummary]) -> Result<()> {
        match self {
            Self::Human(h) => {
                h.render_hosts(hosts);
                Ok(())
            }
            Self::Json(j) => j.render(&hosts),
        }
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_connection_test(&self, test: &ConnectionTest) -> Result<()> {
        match self {
            Self::Human(h) => {
                h.render_connection_test(test);
                Ok(())
            }
            Self::Json(j) => j.render(test),
        }
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_containers(&self, containers: &[ContainerRecord]) -> Result<()> {
        match self {
            Self::Human(h) => {
                h.render_containers(containers);
                Ok(())
            }
            Self::Json(j) => j.render(&containers),
        }
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_discovery(&self, results: &[DiscoveryResult]) -> Result<()> {
        match self {
            Self::Human(h) => {
                h.render_discovery(results);
                Ok(())
            }
            Self::Json(j) => j.render(&results),
        }
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_update_checks(&self, results: &[UpdateCheckResult]) -> Result<()> {
        match self {
            Self::Human(h) => {
                h.render_update_checks(results);
                Ok(())
            }
            Self::Json(j) => j.render(&results),
        }
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_outcome(&self, view: &OutcomeView<'_>) -> Result<()> {
        match self {
            Self::Human(h) => {
                h.render_outcome(view);
                Ok(())
            }
            Self::Json(j) => j.render(view),
        }
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_count(&self, what: &str, count: usize) -> Result<()> {
        match self {
            Self::Human(h) => {
                h.render_count(what, count);
                Ok(())
            }
            Self::Json(j) => {
                let mut obj = serde_json::Map::new();
                obj.insert(what.to_string(), count.into());
                j.render(&obj)
            }
        }
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_cleanup(&self, report: &CleanupReport) -> Result<()> {
        match self {
            Self::Human(h) => {
                h.render_cleanup(report);
                Ok(())
            }
            Self::Json(j) => j.render(report),
        }
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_task_report(&self, report: &TaskReport) -> Result<()> {
        match self {
            Self::Human(h) => {
                h.render_task_report(report);
                Ok(())
            }
            Self::Json(j) => j.render(report),
        }
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_operation(&self, log: &OperationLog) -> Result<()> {
        match self {
            Self::Human(h) => {
                h.render_operation(log);
                Ok(())
            }
            Self::Json(j) => j.render(log),
        }
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_operation_list(&self, logs: &[OperationLog]) -> Result<()> {
        match self {
            Self::Human(h) => {
                h.render_operation_list(logs);
                Ok(())
            }
            Self::Json(j) => {
                let rows: Vec<serde_json::Value> = logs
                    .iter()
                    .map(|o| {
                        serde_json::json!({
                            "id": o.id,
                            "title": o.title,
                            "status": o.status,
                            "started_at": o.started_at,
                            "ended_at": o.ended_at,
                            "entries": o.entries.len(),
                        })
                    })
                    .collect();
                j.render(&rows)
            }
        }
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_config(&self, settings: &Settings, path: &std::path::Path) -> Result<()> {
        match self {
            Self::Human(h) => {
                h.render_config(settings, path);
                Ok(())
            }
            Self::Json(j) => j.render_config(settings, path),
        }
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_setting(&self, key: &str, shown: &str) -> Result<()> {
        match self {
            Self::Human(h) => {
                h.render_setting(key, shown);
                Ok(())
            }
            Self::Json(j) => j.render(&serde_json::json!({ "key": key, "value": shown })),
        }
    }
}
