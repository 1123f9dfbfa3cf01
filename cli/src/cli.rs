//! CLI argument parsing with clap derive

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use std::process::ExitCode;

use crate::app::{AppContext, AppFlags, BehaviourFlags, OutputFlags};
use crate::commands;
use crate::domain::operation::ContainerAction;

/// Control a fleet of Docker hosts over SSH
#[derive(Parser)]
#[command(
    name = "dockhand",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Skip confirmation prompts
    #[arg(short = 'y', long, global = true)]
    pub yes: bool,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List hosts or test a connection
    #[command(subcommand)]
    Hosts(commands::hosts::HostsCommand),

    /// List recorded containers
    Containers(commands::containers::ContainersArgs),

    /// Discover containers on hosts
    Discover(commands::discover::DiscoverArgs),

    /// Re-inspect selected containers on a host
    Refresh(commands::discover::RefreshArgs),

    /// Check containers for newer images
    CheckUpdates(commands::updates::CheckUpdatesArgs),

    /// Check one container for a newer image
    Check(commands::updates::CheckArgs),

    /// Start a container
    Start(commands::lifecycle::ContainerArgs),

    /// Stop a container
    Stop(commands::lifecycle::ContainerArgs),

    /// Restart a container
    Restart(commands::lifecycle::ContainerArgs),

    /// Pull the latest image and recreate a container
    Update(commands::lifecycle::ContainerArgs),

    /// Run a compose operation on a project
    Compose(commands::lifecycle::ComposeArgs),

    /// Remove duplicate container records
    CleanupDuplicates(commands::maintenance::ScopeArgs),

    /// Delete container records
    Purge(commands::maintenance::ScopeArgs),

    /// Run a command on hosts
    Run(commands::run::RunArgs),

    /// List operations or show one operation's log
    Logs(commands::logs::LogsArgs),

    /// Manage settings
    #[command(subcommand)]
    Config(commands::config::ConfigCommand),

    /// Show version
    Version,
}

impl Cli {
    /// Flags for `AppContext::new`.
    #[must_use]
    pub fn flags(&self) -> AppFlags {
        AppFlags {
            output: OutputFlags {
                no_color: self.no_color,
                quiet: self.quiet,
                json: self.json,
            },
            behaviour: BehaviourFlags { yes: self.yes },
        }
    }

    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn run(self) -> Result<ExitCode> {
        let app = AppContext::new(&self.flags())?;
        dispatch(&app, self.command).await
    }
}

/// Route a parsed command to its handler.
///
/// # Errors
///
/// Returns an error if the command fails.
pub async fn dispatch(app: &AppContext, command: Command) -> Result<ExitCode> {
    match command {
        Command::Hosts(cmd) => commands::hosts::run(app, cmd).await,
        Command::Containers(args) => commands::containers::run(app, &args).await,
        Command::Discover(args) => commands::discover::run(app, &args).await,
        Command::Refresh(args) => commands::discover::refresh(app, args).await,
        Command::CheckUpdates(args) => commands::updates::check_updates(app, &args).await,
        Command::Check(args) => commands::updates::check(app, &args).await,
        Command::Start(args) => {
            commands::lifecycle::container_action(app, args, ContainerAction::Start).await
        }
        Command::Stop(args) => {
            commands::lifecycle::container_action(app, args, ContainerAction::Stop).await
        }
        Command::Restart(args) => {
            commands::lifecycle::container_action(app, args, ContainerAction::Restart).await
        }
        Command::Update(args) => commands::lifecycle::update(app, args).await,
        Command::Compose(args) => commands::lifecycle::compose(app, args).await,
        Command::CleanupDuplicates(args) => {
            commands::maintenance::cleanup_duplicates(app, &args).await
        }
        Command::Purge(args) => commands::maintenance::purge(app, &args).await,
        Command::Run(args) => commands::run::run(app, args).await,
        Command::Logs(args) => commands::logs::run(app, args).await,
        Command::Config(cmd) => commands::config::run(app, cmd),
        Command::Version => commands::version::run(app),
    }
}
