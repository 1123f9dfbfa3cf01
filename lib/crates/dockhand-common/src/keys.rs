use thiserror::Error;

/// Internal task command that runs container discovery instead of a shell command.
pub const DISCOVER_COMMAND: &str = "@discover";

/// Prefix of every pub/sub channel carrying task output.
pub const TASK_CHANNEL_PREFIX: &str = "task";

/// Operation IDs are `op-` followed by 16 lowercase hex characters.
pub const OPERATION_ID_PREFIX: &str = "op-";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("operation id must be exactly 19 characters")]
    Length,
    #[error("operation id must start with 'op-'")]
    Prefix,
    #[error("operation id suffix must be lowercase hex [a-f0-9]")]
    Suffix,
}

/// Channel name for a task's live output: `task:<opId>`.
#[must_use]
pub fn task_channel(op_id: &str) -> String {
    format!("{TASK_CHANNEL_PREFIX}:{op_id}")
}

/// Compose group identity: `hostId::compose::project`.
///
/// Keyed by project name rather than working dir so that the same project
/// reached through different paths does not fragment into several groups.
#[must_use]
pub fn compose_group_key(host_id: &str, project: &str) -> String {
    format!("{host_id}::compose::{project}")
}

/// First 12 characters of a container ID (the `docker ps` short form).
#[must_use]
pub fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

/// Validate an operation id before using it as a channel or storage key.
pub fn validate_operation_id(op_id: &str) -> Result<(), KeyError> {
    if op_id.len() != OPERATION_ID_PREFIX.len() + 16 {
        return Err(KeyError::Length);
    }
    let Some(suffix) = op_id.strip_prefix(OPERATION_ID_PREFIX) else {
        return Err(KeyError::Prefix);
    };
    if !suffix
        .chars()
        .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
    {
        return Err(KeyError::Suffix);
    }
    Ok(())
}
