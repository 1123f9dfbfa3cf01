//! Operation outcomes, identifiers and the small vocabularies shared by the
//! lifecycle and reconciliation services.

use std::fmt;

use serde::Serialize;

use dockhand_common::keys::OPERATION_ID_PREFIX;

/// Result of every public operation. Failures carry a human reason instead
/// of propagating an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl OperationOutcome {
    #[must_use]
    pub fn success() -> Self {
        Self {
            ok: true,
            reason: None,
        }
    }

    #[must_use]
    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: Some(reason.into()),
        }
    }
}

pub const REASON_MISSING_RUN_COMMAND: &str = "missing run command";
pub const REASON_PULL_FAILED: &str = "pull failed";
pub const REASON_BACKUP_FAILED: &str = "backup failed";
pub const REASON_RECREATE_ROLLED_BACK: &str = "recreate failed, rolled back";
pub const REASON_UNEXPECTED_ROLLED_BACK: &str = "unexpected error, rolled back";

/// Generate a unique operation identifier: `op-` followed by 16 lowercase
/// hex characters.
#[must_use]
pub fn generate_operation_id() -> String {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u128(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0),
    );
    hasher.write_u64(RandomState::new().build_hasher().finish());
    format!("{OPERATION_ID_PREFIX}{:016x}", hasher.finish())
}

/// Simple container lifecycle verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerAction {
    Start,
    Stop,
    Restart,
}

impl ContainerAction {
    #[must_use]
    pub fn verb(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
        }
    }
}

impl fmt::Display for ContainerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// Which records a status refresh targets on one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshScope {
    ContainerIds(Vec<String>),
    ContainerNames(Vec<String>),
    ComposeProject(String),
}

/// Backup name for the imperative update path. The millisecond timestamp
/// plus a random suffix keeps concurrent runs from colliding.
#[must_use]
pub fn backup_name(name: &str, now_millis: i64, salt: u16) -> String {
    format!("{name}_backup_{now_millis}_{salt:04x}")
}

/// Whether a container name was produced by [`backup_name`].
#[must_use]
pub fn is_backup_name(name: &str) -> bool {
    name.contains("_backup_")
}
