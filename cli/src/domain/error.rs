//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use thiserror::Error;

// ── Host errors ───────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum HostError {
    #[error("Host '{0}' not found. Check ~/.dockhand/hosts.yaml.")]
    NotFound(String),

    #[error("Duplicate host id '{0}' in inventory.")]
    DuplicateId(String),

    #[error("Host '{id}' has an invalid address: {address:?}")]
    InvalidAddress { id: String, address: String },

    #[error("Cannot decrypt {field} for host '{id}'.")]
    Credential { id: String, field: &'static str },
}

// ── Container errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("Container '{reference}' not found on host '{host_id}'. Run 'dockhand discover' first.")]
    NotFound { host_id: String, reference: String },

    #[error("Container '{reference}' is ambiguous on host '{host_id}' ({count} matches).")]
    Ambiguous {
        host_id: String,
        reference: String,
        count: usize,
    },

    #[error("Container '{0}' is not compose-managed.")]
    NotCompose(String),
}

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors related to configuration key/value validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown setting: {key}\n\nValid settings: {valid}")]
    UnknownKey { key: String, valid: String },

    #[error("Invalid value for {key}: {value}\n\nValid values: {valid}")]
    InvalidValue {
        key: String,
        value: String,
        valid: String,
    },
}

// ── Secret errors ─────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret key is not configured (set DOCKHAND_SECRET_KEY)")]
    MissingKey,

    #[error("secret key must be 32 bytes of base64")]
    InvalidKey,

    #[error("malformed v1 ciphertext")]
    Malformed,

    #[error("ciphertext failed authentication")]
    Authentication,
}
