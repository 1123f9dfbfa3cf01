//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` and the shared types crate,
//! never from `crate::infra`, `crate::commands`, or `crate::output`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;

use dockhand_common::{
    ContainerRecord, Host, LogEntry, OperationLog, OperationStatus, Settings, StreamKind,
    TaskEvent,
};

// ── Remote execution ──────────────────────────────────────────────────────────

/// Exit code reported for transport failures (spawn error, auth rejected,
/// connection refused, timeout, ssh exit 255).
pub const TRANSPORT_FAILURE_EXIT: i32 = -1;

/// Decrypted authentication material for one call. Never persisted.
#[derive(Clone, Default)]
pub struct Credentials {
    pub password: Option<String>,
    pub private_key: Option<String>,
    pub passphrase: Option<String>,
}

impl Credentials {
    /// Whether any secret must be fed to the SSH client.
    #[must_use]
    pub fn needs_password_helper(&self) -> bool {
        self.password.is_some() || self.passphrase.is_some()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("private_key", &self.private_key.as_ref().map(|_| "***"))
            .field("passphrase", &self.passphrase.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Per-call execution knobs.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Bounds the SSH handshake only.
    pub connect_timeout: Duration,
    /// Hard kill timer for the whole command.
    pub kill_after: Duration,
    /// `StrictHostKeyChecking=yes` when set, `accept-new` with a throwaway
    /// known-hosts file otherwise.
    pub strict_host_key: bool,
    /// Bytes written to the remote command's stdin.
    pub stdin: Option<String>,
}

impl ExecOptions {
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            connect_timeout: settings.connect_timeout(),
            kill_after: settings.command_timeout(),
            strict_host_key: true,
            stdin: None,
        }
    }
}

/// Structured result of one command. Non-zero exits are data, not errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Transport failure description; `exit_code` is then
    /// [`TRANSPORT_FAILURE_EXIT`].
    pub error: Option<String>,
}

impl ExecOutput {
    #[must_use]
    pub fn transport_failure(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            exit_code: TRANSPORT_FAILURE_EXIT,
            stdout: String::new(),
            stderr: message.clone(),
            error: Some(message),
        }
    }

    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0 && self.error.is_none()
    }

    /// Most useful one-line failure description.
    #[must_use]
    pub fn failure_message(&self) -> String {
        if let Some(err) = &self.error {
            return err.clone();
        }
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("exit code {}", self.exit_code)
        } else {
            stderr.lines().last().unwrap_or(stderr).to_string()
        }
    }
}

/// Receives streamed output, one line at a time.
pub trait OutputSink: Send + Sync {
    fn line(&self, stream: StreamKind, line: &str);
}

/// Runs a shell command on a host, over SSH or locally for loopback hosts.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run `command` and capture its output.
    async fn execute(
        &self,
        host: &Host,
        credentials: &Credentials,
        command: &str,
        options: &ExecOptions,
    ) -> ExecOutput;

    /// Run `command`, forwarding each output line to `sink` as it arrives.
    /// The returned output still carries the full captured text.
    async fn execute_streaming(
        &self,
        host: &Host,
        credentials: &Credentials,
        command: &str,
        options: &ExecOptions,
        sink: &dyn OutputSink,
    ) -> ExecOutput;
}

// ── Secrets, settings, hosts ──────────────────────────────────────────────────

/// Decrypts credential material stored at rest.
pub trait SecretStore: Send + Sync {
    /// `None` when the value cannot be decrypted. Values without the
    /// versioned prefix are legacy plaintext and come back unchanged.
    fn decrypt(&self, value: &str) -> Option<String>;

    /// Encrypt a value in the current format.
    ///
    /// # Errors
    ///
    /// Returns an error if no key is configured.
    fn encrypt(&self, plaintext: &str) -> Result<String>;
}

/// Operator tunables, read fresh per call.
pub trait SettingsStore: Send + Sync {
    /// Load settings, falling back to defaults when nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored settings cannot be read or parsed.
    fn load(&self) -> Result<Settings>;

    /// Persist settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot be written.
    fn save(&self, settings: &Settings) -> Result<()>;

    /// Location of the settings file.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    fn path(&self) -> Result<PathBuf>;
}

/// Read-only host inventory.
pub trait HostDirectory: Send + Sync {
    /// All hosts in inventory order.
    ///
    /// # Errors
    ///
    /// Returns an error if the inventory cannot be read.
    fn list(&self) -> Result<Vec<Host>>;

    /// One host by id.
    ///
    /// # Errors
    ///
    /// Returns `HostError::NotFound` if no host has this id.
    fn get(&self, id: &str) -> Result<Host>;
}

// ── Persistence ───────────────────────────────────────────────────────────────

/// Container registry keyed by `(host_id, container_id)`.
#[async_trait]
pub trait ContainerRepository: Send + Sync {
    async fn list_by_host(&self, host_id: &str) -> Result<Vec<ContainerRecord>>;
    async fn list_all(&self) -> Result<Vec<ContainerRecord>>;
    /// Insert a record; the store assigns and returns `row_id`.
    async fn insert(&self, record: ContainerRecord) -> Result<ContainerRecord>;
    /// Replace the record with the same `row_id`.
    async fn update(&self, record: &ContainerRecord) -> Result<()>;
    /// Delete rows by `row_id`, returning how many existed.
    async fn delete(&self, row_ids: &[u64]) -> Result<usize>;
    /// Delete every row for a host, or every row at all.
    async fn purge(&self, host_id: Option<&str>) -> Result<usize>;
}

/// Persistent operation logs. Append-only apart from status and end time.
#[async_trait]
pub trait OperationLogStore: Send + Sync {
    async fn create(&self, op_id: &str, title: &str) -> Result<()>;
    /// Set the status; terminal statuses also stamp `ended_at`.
    async fn update_status(&self, op_id: &str, status: OperationStatus) -> Result<()>;
    async fn append_entries(&self, op_id: &str, entries: &[LogEntry]) -> Result<()>;
    async fn get(&self, op_id: &str) -> Result<Option<OperationLog>>;
    /// Most recent first.
    async fn list(&self) -> Result<Vec<OperationLog>>;
}

// ── Events ────────────────────────────────────────────────────────────────────

/// Pub/sub for live task output on `task:<opId>` channels.
pub trait EventBus: Send + Sync {
    fn publish(&self, event: TaskEvent);
    fn subscribe(&self, op_id: &str) -> broadcast::Receiver<TaskEvent>;
}
