//! Typed views of `docker inspect` output.
//!
//! Docker emits `null` for empty lists and maps in several places (`Env`,
//! `Cmd`, `Labels`, `PortBindings`), so every collection is an `Option` and
//! read through an accessor that falls back to empty.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use dockhand_common::{MountInfo, Platform, PortBinding, STATE_STOPPED};

use crate::domain::image::split_name_tag;
use crate::domain::shell;

/// Environment variables every container gets from the runtime or base image.
const SYSTEM_ENV: &[&str] = &["PATH", "HOSTNAME", "HOME", "TERM", "container"];

/// Label prefix owned by compose; never replayed into `docker run`.
const COMPOSE_LABEL_PREFIX: &str = "com.docker.compose.";

/// Network modes that `docker run` uses when `--network` is omitted.
const DEFAULT_NETWORK_MODES: &[&str] = &["", "default", "bridge"];

// ── Container inspect ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerInspect {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created: Option<String>,
    /// Image ID the container runs (`sha256:...`, occasionally short).
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub state: ContainerState,
    #[serde(default)]
    pub config: ContainerConfig,
    #[serde(default)]
    pub host_config: HostConfig,
    #[serde(default)]
    pub mounts: Option<Vec<InspectMount>>,
    #[serde(default)]
    pub network_settings: NetworkSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerState {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub dead: bool,
    #[serde(default)]
    pub started_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerConfig {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub env: Option<Vec<String>>,
    #[serde(default)]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub cmd: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    #[serde(default)]
    pub restart_policy: Option<RestartPolicy>,
    #[serde(default)]
    pub port_bindings: Option<BTreeMap<String, Option<Vec<HostPortBinding>>>>,
    #[serde(default)]
    pub network_mode: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct RestartPolicy {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub maximum_retry_count: u32,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct HostPortBinding {
    #[serde(default)]
    pub host_ip: String,
    #[serde(default)]
    pub host_port: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct InspectMount {
    #[serde(default)]
    pub r#type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub destination: String,
    #[serde(rename = "RW", default = "default_rw")]
    pub rw: bool,
}

fn default_rw() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkSettings {
    #[serde(default)]
    pub networks: Option<BTreeMap<String, serde_json::Value>>,
}

impl ContainerInspect {
    /// Container name without the leading `/`.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.trim_start_matches('/')
    }

    #[must_use]
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.config.labels.clone().unwrap_or_default()
    }

    #[must_use]
    pub fn env(&self) -> &[String] {
        self.config.env.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.state.started_at.as_deref().and_then(parse_docker_time)
    }

    #[must_use]
    pub fn port_bindings(&self) -> Vec<PortBinding> {
        let Some(bindings) = &self.host_config.port_bindings else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for (container_port, hosts) in bindings {
            let hosts = hosts.as_deref().unwrap_or_default();
            if hosts.is_empty() {
                out.push(PortBinding {
                    container_port: container_port.clone(),
                    host_ip: None,
                    host_port: None,
                });
            }
            for h in hosts {
                out.push(PortBinding {
                    container_port: container_port.clone(),
                    host_ip: non_empty(&h.host_ip),
                    host_port: non_empty(&h.host_port),
                });
            }
        }
        out
    }

    #[must_use]
    pub fn mount_infos(&self) -> Vec<MountInfo> {
        self.mounts
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|m| MountInfo {
                kind: m.r#type.clone(),
                source: if m.r#type == "volume" {
                    m.name.clone().unwrap_or_else(|| m.source.clone())
                } else {
                    m.source.clone()
                },
                destination: m.destination.clone(),
                read_only: !m.rw,
            })
            .collect()
    }

    #[must_use]
    pub fn network_names(&self) -> Vec<String> {
        self.network_settings
            .networks
            .as_ref()
            .map(|n| n.keys().cloned().collect())
            .unwrap_or_default()
    }
}

// ── Image inspect ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct ImageInspect {
    pub id: String,
    #[serde(default)]
    pub repo_tags: Option<Vec<String>>,
    #[serde(default)]
    pub repo_digests: Option<Vec<String>>,
    #[serde(default)]
    pub architecture: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub variant: Option<String>,
}

impl ImageInspect {
    #[must_use]
    pub fn repo_tags(&self) -> &[String] {
        self.repo_tags.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn repo_digests(&self) -> &[String] {
        self.repo_digests.as_deref().unwrap_or_default()
    }

    /// Platform of the image; `None` when Docker did not report one.
    #[must_use]
    pub fn platform(&self) -> Option<Platform> {
        let architecture = self.architecture.clone().filter(|a| !a.is_empty())?;
        Some(Platform {
            architecture,
            os: self
                .os
                .clone()
                .filter(|o| !o.is_empty())
                .unwrap_or_else(|| "linux".to_string()),
            variant: self.variant.clone().filter(|v| !v.is_empty()),
        })
    }
}

/// Parse the first element of a `docker inspect` JSON array.
///
/// # Errors
///
/// Returns an error when the text is not a JSON array of the expected shape
/// or the array is empty.
pub fn parse_first<T: for<'de> Deserialize<'de>>(json: &str) -> anyhow::Result<T> {
    let mut items: Vec<T> = serde_json::from_str(json.trim())?;
    anyhow::ensure!(!items.is_empty(), "inspect returned an empty array");
    Ok(items.swap_remove(0))
}

// ── Derivations ───────────────────────────────────────────────────────────────

/// Normalized container state: `State.Status`, else derived from the
/// Running / Paused / Dead flags, else `stopped`.
#[must_use]
pub fn normalize_state(state: &ContainerState) -> String {
    if let Some(status) = state.status.as_deref().filter(|s| !s.is_empty()) {
        return status.to_string();
    }
    if state.running {
        "running".to_string()
    } else if state.paused {
        "paused".to_string()
    } else if state.dead {
        "dead".to_string()
    } else {
        STATE_STOPPED.to_string()
    }
}

/// Parse a Docker RFC 3339 timestamp; the zero time means "never".
#[must_use]
pub fn parse_docker_time(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() || s.starts_with("0001-01-01") {
        return None;
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Human image name and tag for a container.
///
/// Prefers the container's configured image when it is a readable reference,
/// then the first `RepoTag` of the image, then whatever raw value exists.
#[must_use]
pub fn image_name_and_tag(config_image: &str, repo_tags: &[String]) -> (String, Option<String>) {
    let is_human = |s: &str| !s.is_empty() && !s.starts_with("sha256:") && !s.contains('@');
    let chosen = if is_human(config_image) {
        config_image
    } else if let Some(tag) = repo_tags.iter().find(|t| is_human(t) && *t != "<none>:<none>") {
        tag.as_str()
    } else {
        config_image
    };
    let (name, tag) = split_name_tag(chosen);
    (name.to_string(), tag.map(str::to_string))
}

/// Running image digest as `sha256:<64 hex>`.
///
/// The inspect `Image` field normally holds the full ID; when it holds a
/// short ID the image inspect `Id` is used instead.
#[must_use]
pub fn resolve_image_digest(image_field: &str, image_id: Option<&str>) -> Option<String> {
    let is_full = |s: &str| {
        s.strip_prefix("sha256:")
            .is_some_and(|h| h.len() == 64 && h.chars().all(|c| c.is_ascii_hexdigit()))
    };
    if is_full(image_field) {
        return Some(image_field.to_string());
    }
    image_id.filter(|id| is_full(id)).map(str::to_string)
}

/// Synthesize a `docker run` command that recreates a CLI container.
#[must_use]
pub fn synthesize_run_command(inspect: &ContainerInspect) -> String {
    let mut args: Vec<String> = vec!["docker".into(), "run".into(), "-d".into()];
    args.push("--name".into());
    args.push(inspect.display_name().to_string());

    if let Some(policy) = &inspect.host_config.restart_policy {
        match policy.name.as_str() {
            "" | "no" => {}
            "on-failure" if policy.maximum_retry_count > 0 => {
                args.push("--restart".into());
                args.push(format!("on-failure:{}", policy.maximum_retry_count));
            }
            name => {
                args.push("--restart".into());
                args.push(name.to_string());
            }
        }
    }

    for p in inspect.port_bindings() {
        let Some(host_port) = &p.host_port else {
            continue;
        };
        let container = p.container_port.trim_end_matches("/tcp");
        let spec = match p.host_ip.as_deref() {
            Some(ip) if !ip.is_empty() && ip != "0.0.0.0" && ip != "::" => {
                format!("{ip}:{host_port}:{container}")
            }
            _ => format!("{host_port}:{container}"),
        };
        args.push("-p".into());
        args.push(spec);
    }

    for m in inspect.mount_infos() {
        match m.kind.as_str() {
            "bind" | "volume" if !m.source.is_empty() => {
                let mut spec = format!("{}:{}", m.source, m.destination);
                if m.read_only {
                    spec.push_str(":ro");
                }
                args.push("-v".into());
                args.push(spec);
            }
            "tmpfs" => {
                args.push("--tmpfs".into());
                args.push(m.destination.clone());
            }
            _ => {}
        }
    }

    for var in inspect.env() {
        let key = var.split('=').next().unwrap_or_default();
        if !SYSTEM_ENV.contains(&key) {
            args.push("-e".into());
            args.push(var.clone());
        }
    }

    if let Some(mode) = inspect
        .host_config
        .network_mode
        .as_deref()
        .filter(|m| !DEFAULT_NETWORK_MODES.contains(m))
    {
        args.push("--network".into());
        args.push(mode.to_string());
    }

    if let Some(dir) = inspect.config.working_dir.as_deref().filter(|d| !d.is_empty()) {
        args.push("-w".into());
        args.push(dir.to_string());
    }
    if let Some(user) = inspect.config.user.as_deref().filter(|u| !u.is_empty()) {
        args.push("-u".into());
        args.push(user.to_string());
    }

    for (k, v) in inspect.labels() {
        if !k.starts_with(COMPOSE_LABEL_PREFIX) {
            args.push("-l".into());
            args.push(format!("{k}={v}"));
        }
    }

    args.push(inspect.config.image.clone());
    args.extend(inspect.config.cmd.clone().unwrap_or_default());

    shell::join(&args)
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}
