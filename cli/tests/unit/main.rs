//! Unit tests for the dockhand CLI library
//!
//! These tests wire the real services over mocked ports and run fast
//! without SSH, Docker or the data directory.

mod mocks;

mod credentials;
mod discovery;
mod lifecycle;
mod property_tests;
mod replay;
mod retry;
mod task_runner;
