//! dockhand - control a fleet of Docker hosts over SSH

#![cfg_attr(test, allow(clippy::expect_used))]

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use dockhand_cli::cli::Cli;
use dockhand_cli::output::json::format_error;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let json = cli.json;
    match cli.run().await {
        Ok(code) => code,
        Err(e) => {
            if json {
                match format_error(&format!("{e:#}"), error_code(&e)) {
                    Ok(out) => println!("{out}"),
                    Err(_) => eprintln!("Error: {e:#}"),
                }
            } else {
                eprintln!("Error: {e:#}");
            }
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn error_code(e: &anyhow::Error) -> &'static str {
    use dockhand_cli::domain::error::{ConfigError, ContainerError, HostError, SecretError};
    if let Some(h) = e.downcast_ref::<HostError>() {
        return match h {
            HostError::NotFound(_) => "HOST_NOT_FOUND",
            _ => "INVALID_HOSTS",
        };
    }
    if let Some(c) = e.downcast_ref::<ContainerError>() {
        return match c {
            ContainerError::NotFound { .. } => "CONTAINER_NOT_FOUND",
            _ => "CONTAINER_ERROR",
        };
    }
    if e.downcast_ref::<ConfigError>().is_some() {
        return "INVALID_CONFIG";
    }
    if e.downcast_ref::<SecretError>().is_some() {
        return "SECRET_ERROR";
    }
    "COMMAND_FAILED"
}
