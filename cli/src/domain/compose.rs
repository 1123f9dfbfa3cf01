//! Compose identity and `docker compose ls` parsing.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use dockhand_common::{ComposeMeta, compose_group_key};

pub const LABEL_PROJECT: &str = "com.docker.compose.project";
pub const LABEL_SERVICE: &str = "com.docker.compose.service";
pub const LABEL_WORKING_DIR: &str = "com.docker.compose.project.working_dir";
pub const LABEL_CONFIG_FILES: &str = "com.docker.compose.project.config_files";

/// Derive compose identity from container labels.
///
/// A container is compose-managed iff both the project and service labels
/// are present and non-empty.
#[must_use]
pub fn compose_from_labels(host_id: &str, labels: &BTreeMap<String, String>) -> Option<ComposeMeta> {
    let get = |k: &str| labels.get(k).map(|v| v.trim()).filter(|v| !v.is_empty());
    let project = get(LABEL_PROJECT)?;
    let service = get(LABEL_SERVICE)?;
    Some(ComposeMeta {
        project: project.to_string(),
        service: service.to_string(),
        working_dir: get(LABEL_WORKING_DIR).map(str::to_string),
        config_files: get(LABEL_CONFIG_FILES)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        group_key: compose_group_key(host_id, project),
    })
}

// ── compose ls ────────────────────────────────────────────────────────────────

/// One project row from `docker compose ls -a`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ComposeProject {
    pub name: String,
    /// e.g. `running(3)` or `running(1), exited(2)`.
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub config_files: String,
}

impl ComposeProject {
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status.to_ascii_lowercase().contains("running")
    }
}

/// Parse `compose ls --format json`, falling back to the table format.
#[must_use]
pub fn parse_compose_ls(text: &str) -> Vec<ComposeProject> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if let Ok(projects) = serde_json::from_str::<Vec<ComposeProject>>(trimmed) {
        return projects;
    }
    parse_compose_table(trimmed)
}

fn parse_compose_table(text: &str) -> Vec<ComposeProject> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("NAME"))
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let name = tokens.next()?.to_string();
            let rest: Vec<&str> = tokens.collect();
            // Status may contain ", " between states; config files are the last token.
            let (status, config_files) = match rest.split_last() {
                Some((last, head)) if last.starts_with('/') || last.contains(".yml") || last.contains(".yaml") => {
                    (head.join(" "), (*last).to_string())
                }
                _ => (rest.join(" "), String::new()),
            };
            Some(ComposeProject {
                name,
                status,
                config_files,
            })
        })
        .collect()
}

// ── compose operations ────────────────────────────────────────────────────────

/// Project-level compose operations exposed to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeOp {
    Down,
    Pull,
    Up,
    Restart,
    Start,
    Stop,
}

impl ComposeOp {
    /// Arguments after `docker compose -p <project> [--project-directory <dir>]`.
    #[must_use]
    pub fn args(self) -> &'static [&'static str] {
        match self {
            Self::Down => &["down"],
            Self::Pull => &["pull"],
            Self::Up => &["up", "-d"],
            Self::Restart => &["restart"],
            Self::Start => &["start"],
            Self::Stop => &["stop"],
        }
    }
}

impl fmt::Display for ComposeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.args()[0])
    }
}

impl FromStr for ComposeOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "down" => Ok(Self::Down),
            "pull" => Ok(Self::Pull),
            "up" => Ok(Self::Up),
            "restart" => Ok(Self::Restart),
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            other => Err(format!(
                "unknown compose operation '{other}' (expected down, pull, up, restart, start, stop)"
            )),
        }
    }
}

/// Base `docker compose` arguments scoped to one project.
#[must_use]
pub fn compose_base_args(project: &str, working_dir: Option<&str>) -> Vec<String> {
    let mut args = vec!["compose".to_string(), "-p".to_string(), project.to_string()];
    if let Some(dir) = working_dir.filter(|d| !d.is_empty()) {
        args.push("--project-directory".to_string());
        args.push(dir.to_string());
    }
    args
}
