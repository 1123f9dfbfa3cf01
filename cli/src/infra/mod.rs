//! Infrastructure layer — concrete implementations of application port traits.
//!
//! This module contains all I/O-performing code: process execution over SSH,
//! on-disk stores, secret decryption and the in-process event bus.
//!
//! Imports from `crate::domain` and `crate::application::ports` are allowed.
//! Imports from `crate::commands` or `crate::output` are forbidden.

pub mod command_runner;
pub mod config;
pub mod events;
pub mod hosts;
pub mod paths;
pub mod secrets;
pub mod state;
