//! `dockhand config` — show and set settings.

use anyhow::Result;
use clap::Subcommand;
use std::process::ExitCode;

use crate::app::AppContext;
use crate::application::services::config_service;

/// Config subcommands.
#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current settings
    Show,
    /// Set a setting (e.g. `ssh_concurrency 50`)
    Set {
        /// Setting key
        key: String,
        /// New value
        value: String,
    },
}

/// Run the config command.
///
/// # Errors
///
/// Returns an error if the key or value is invalid or the settings file
/// cannot be read or written.
pub fn run(app: &AppContext, cmd: ConfigCommand) -> Result<ExitCode> {
    let ports = &app.services.ports;
    match cmd {
        ConfigCommand::Show => {
            let settings = config_service::load_settings(ports.settings.as_ref())?;
            let path = ports.settings.path()?;
            app.renderer().render_config(&settings, &path)?;
        }
        ConfigCommand::Set { key, value } => {
            let shown = config_service::set_setting(
                ports.settings.as_ref(),
                ports.secrets.as_ref(),
                &key,
                &value,
            )?;
            app.renderer().render_setting(&key, &shown)?;
        }
    }
    Ok(ExitCode::SUCCESS)
}
