//! Domain layer — pure parsing, classification and planning.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod compose;
pub mod config;
pub mod dedup;
pub mod error;
pub mod host;
pub mod image;
pub mod inspect;
pub mod manifest;
pub mod network;
pub mod operation;
pub mod ps;
pub mod shell;

pub use config::{validate_config_key, validate_config_value};
pub use error::{ConfigError, ContainerError, HostError, SecretError};
pub use operation::{ContainerAction, OperationOutcome, RefreshScope, generate_operation_id};
