//! Application layer — port trait definitions and use-case orchestration.
//!
//! This module depends only on `crate::domain` — never on `crate::infra`,
//! `crate::commands`, or `crate::output`.

pub mod ports;
pub mod services;

pub use ports::{
    ContainerRepository, Credentials, EventBus, ExecOptions, ExecOutput, HostDirectory,
    OperationLogStore, OutputSink, RemoteExecutor, SecretStore, SettingsStore,
    TRANSPORT_FAILURE_EXIT,
};
