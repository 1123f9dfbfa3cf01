use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const STATE_RUNNING: &str = "running";
pub const STATE_EXITED: &str = "exited";
pub const STATE_STOPPED: &str = "stopped";

// ── Hosts ────────────────────────────────────────────────────────────────────

/// Whether the host is the machine dockhand itself runs on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HostRole {
    Local,
    #[default]
    Remote,
}

/// Encrypted SSH auth material as stored in the host inventory.
///
/// Every field holds secret-store ciphertext (or legacy plaintext) and must be
/// decrypted immediately before use.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct HostAuth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,
}

/// An operator-declared Docker host reachable over SSH.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Host {
    pub id: String,
    pub address: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub role: HostRole,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub auth: HostAuth,
}

fn default_user() -> String {
    "root".to_string()
}

fn default_port() -> u16 {
    22
}

impl Host {
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

// ── Containers ───────────────────────────────────────────────────────────────

/// Target platform of an image, e.g. `linux/arm64/v8`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Platform {
    pub architecture: String,
    pub os: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl Default for Platform {
    fn default() -> Self {
        Self {
            architecture: "amd64".to_string(),
            os: "linux".to_string(),
            variant: None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)?;
        if let Some(v) = &self.variant {
            write!(f, "/{v}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortBinding {
    /// Container side, e.g. `80/tcp`.
    pub container_port: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MountInfo {
    /// `bind`, `volume` or `tmpfs`.
    pub kind: String,
    pub source: String,
    pub destination: String,
    #[serde(default)]
    pub read_only: bool,
}

/// Compose identity derived from `com.docker.compose.*` labels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComposeMeta {
    pub project: String,
    pub service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config_files: Vec<String>,
    /// `hostId::compose::project`
    pub group_key: String,
}

/// Local record of one container on one host.
///
/// `row_id` is the storage identity; `(host_id, container_id)` is the logical
/// key and `container_id` is the full 64-hex ID whenever it is known.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContainerRecord {
    pub row_id: u64,
    pub host_id: String,
    pub container_id: String,
    pub name: String,
    pub state: String,
    pub status: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_tag: Option<String>,
    /// Digest of the image actually running (`sha256:...` image ID).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_digest: Option<String>,
    /// Registry digests the running image is known under (`RepoDigests`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repo_digests: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_digest: Option<String>,
    #[serde(default)]
    pub update_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_checked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortBinding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<MountInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compose: Option<ComposeMeta>,
    /// `docker run ...` command able to recreate a CLI container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContainerRecord {
    /// A blank record; the store assigns `row_id` on insert.
    #[must_use]
    pub fn new(host_id: &str, container_id: &str, name: &str, now: DateTime<Utc>) -> Self {
        Self {
            row_id: 0,
            host_id: host_id.to_string(),
            container_id: container_id.to_string(),
            name: name.to_string(),
            state: STATE_STOPPED.to_string(),
            status: STATE_STOPPED.to_string(),
            image: String::new(),
            image_tag: None,
            repo_digest: None,
            repo_digests: Vec::new(),
            remote_digest: None,
            update_available: false,
            update_checked_at: None,
            ports: Vec::new(),
            mounts: Vec::new(),
            networks: Vec::new(),
            labels: BTreeMap::new(),
            compose: None,
            run_command: None,
            platform: None,
            started_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn is_compose_managed(&self) -> bool {
        self.compose.is_some()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == STATE_RUNNING
    }

    /// Image reference as `name:tag`, or just the name when untagged.
    #[must_use]
    pub fn image_ref(&self) -> String {
        match &self.image_tag {
            Some(tag) if !tag.is_empty() => format!("{}:{tag}", self.image),
            _ => self.image.clone(),
        }
    }

    /// Mark the record stopped without deleting it.
    pub fn mark_stopped(&mut self, now: DateTime<Utc>) {
        self.state = STATE_STOPPED.to_string();
        self.status = STATE_STOPPED.to_string();
        self.started_at = None;
        self.updated_at = now;
    }
}

// ── Operation logs ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Pending,
    Running,
    Completed,
    Error,
    Cancelled,
}

impl OperationStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Error => "ERROR",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
    /// Lines written by dockhand itself rather than a remote process.
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    pub stream: StreamKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    #[must_use]
    pub fn new(stream: StreamKind, content: &str, host_id: Option<&str>) -> Self {
        Self {
            stream,
            content: content.to_string(),
            host_id: host_id.map(str::to_string),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationLog {
    pub id: String,
    pub title: String,
    pub status: OperationStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub entries: Vec<LogEntry>,
}

// ── Task events ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskEventKind {
    Data,
    Stderr,
    End,
    Error,
}

/// One message on a `task:<opId>` channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskEvent {
    pub kind: TaskEventKind,
    pub op_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
    pub payload: serde_json::Value,
}

impl TaskEvent {
    /// Rebuild the live event a persisted entry was published as.
    #[must_use]
    pub fn from_entry(op_id: &str, entry: &LogEntry) -> Self {
        let kind = match entry.stream {
            StreamKind::Stderr => TaskEventKind::Stderr,
            StreamKind::Stdout | StreamKind::System => TaskEventKind::Data,
        };
        Self {
            kind,
            op_id: op_id.to_string(),
            host_id: entry.host_id.clone(),
            payload: serde_json::Value::String(entry.content.clone()),
        }
    }
}
