//! Application context — unified state passed to every command handler.
//!
//! `AppContext` owns the output context and the wired service graph.
//! Collaborators are constructed once here and injected everywhere else;
//! nothing below this module reaches for a process-wide singleton.

use std::sync::Arc;

use anyhow::Result;

use crate::application::ports::{
    ContainerRepository, EventBus, HostDirectory, OperationLogStore, RemoteExecutor, SecretStore,
    SettingsStore,
};
use crate::application::services::discovery::Reconciler;
use crate::application::services::docker::DockerCli;
use crate::application::services::lifecycle::Lifecycle;
use crate::application::services::task_runner::TaskRunner;
use crate::application::services::update_check::{DigestResolver, UpdateChecker};
use crate::infra::command_runner::SshCommandRunner;
use crate::infra::config::YamlSettingsStore;
use crate::infra::events::BroadcastBus;
use crate::infra::hosts::YamlHostDirectory;
use crate::infra::secrets::AesGcmSecretStore;
use crate::infra::state::{JsonContainerStore, JsonOperationStore};
use crate::output::{HumanRenderer, JsonRenderer, OutputContext, Renderer};
use dockhand_common::DISCOVER_COMMAND;

/// Output rendering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable terminal output (default).
    Human,
    /// Machine-readable JSON output.
    Json,
}

/// Output rendering flags.
pub struct OutputFlags {
    /// Disable ANSI color output.
    pub no_color: bool,
    /// Suppress non-error output.
    pub quiet: bool,
    /// Enable JSON output mode.
    pub json: bool,
}

/// Behaviour flags.
pub struct BehaviourFlags {
    /// Skip interactive prompts (also set by `CI` / `DOCKHAND_YES` env vars).
    pub yes: bool,
}

/// Flags passed from the top-level CLI to `AppContext::new`.
pub struct AppFlags {
    /// Output rendering options.
    pub output: OutputFlags,
    /// Behaviour options.
    pub behaviour: BehaviourFlags,
}

/// Every port implementation the services need.
#[derive(Clone)]
pub struct Ports {
    pub executor: Arc<dyn RemoteExecutor>,
    pub hosts: Arc<dyn HostDirectory>,
    pub secrets: Arc<dyn SecretStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub containers: Arc<dyn ContainerRepository>,
    pub operations: Arc<dyn OperationLogStore>,
    pub bus: Arc<dyn EventBus>,
}

impl Ports {
    /// Production ports: system `ssh`, files under the data directory and
    /// the secret key from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined or the
    /// secret key is malformed.
    pub fn from_disk() -> Result<Self> {
        Ok(Self {
            executor: Arc::new(SshCommandRunner::new()),
            hosts: Arc::new(YamlHostDirectory::default()),
            secrets: Arc::new(AesGcmSecretStore::from_env()?),
            settings: Arc::new(YamlSettingsStore::default()),
            containers: Arc::new(JsonContainerStore::new()?),
            operations: Arc::new(JsonOperationStore::new()?),
            bus: Arc::new(BroadcastBus::new()),
        })
    }
}

/// The service graph, wired once from a set of ports.
pub struct Services {
    pub ports: Ports,
    pub docker: Arc<DockerCli>,
    pub reconciler: Arc<Reconciler>,
    pub checker: Arc<UpdateChecker>,
    pub lifecycle: Lifecycle,
    pub runner: Arc<TaskRunner>,
}

impl Services {
    #[must_use]
    pub fn wire(ports: Ports) -> Self {
        let docker = Arc::new(DockerCli::new(
            Arc::clone(&ports.executor),
            Arc::clone(&ports.settings),
            Arc::clone(&ports.secrets),
        ));
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&docker),
            Arc::clone(&ports.containers),
            Arc::clone(&ports.hosts),
        ));
        let checker = Arc::new(UpdateChecker::new(
            DigestResolver::new(Arc::clone(&docker)),
            Arc::clone(&ports.containers),
            Arc::clone(&ports.hosts),
        ));
        let lifecycle = Lifecycle::new(
            Arc::clone(&docker),
            Arc::clone(&reconciler),
            Arc::clone(&ports.operations),
            Arc::clone(&ports.bus),
        );
        let runner = Arc::new(
            TaskRunner::new(
                Arc::clone(&ports.executor),
                Arc::clone(&ports.hosts),
                Arc::clone(&ports.secrets),
                Arc::clone(&ports.settings),
                Arc::clone(&ports.operations),
                Arc::clone(&ports.bus),
            )
            .with_internal(DISCOVER_COMMAND, Arc::clone(&reconciler) as _),
        );
        Self {
            ports,
            docker,
            reconciler,
            checker,
            lifecycle,
            runner,
        }
    }
}

/// Unified application context passed to every command handler.
pub struct AppContext {
    /// Terminal output context (colors, quiet mode).
    pub output: OutputContext,
    /// Output rendering mode (human vs JSON).
    pub mode: OutputMode,
    /// Wired services.
    pub services: Services,
    /// When `true`, skip interactive prompts and use defaults.
    ///
    /// Set when `--yes` / `-y` is passed, or when the `CI` or `DOCKHAND_YES`
    /// environment variables are present.
    pub non_interactive: bool,
}

impl AppContext {
    /// Construct an `AppContext` from top-level CLI flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the production ports cannot be built.
    pub fn new(flags: &AppFlags) -> Result<Self> {
        Ok(Self::with_ports(flags, Ports::from_disk()?))
    }

    /// Construct an `AppContext` over explicit ports (used in tests).
    #[must_use]
    pub fn with_ports(flags: &AppFlags, ports: Ports) -> Self {
        let ci_env = std::env::var("CI").is_ok() || std::env::var("DOCKHAND_YES").is_ok();
        let non_interactive = flags.behaviour.yes || ci_env;

        let mode = if flags.output.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        };

        Self {
            output: OutputContext::new(flags.output.no_color, flags.output.quiet),
            mode,
            services: Services::wire(ports),
            non_interactive,
        }
    }

    /// Returns `true` when JSON output mode is active.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.mode == OutputMode::Json
    }

    /// Returns the appropriate `Renderer` variant for the current output mode.
    #[must_use]
    pub fn renderer(&self) -> Renderer<'_> {
        match self.mode {
            OutputMode::Human => Renderer::Human(HumanRenderer::new(&self.output)),
            OutputMode::Json => Renderer::Json(JsonRenderer),
        }
    }

    /// Ask the user for confirmation.
    ///
    /// When `non_interactive` is `true` (CI, `--yes` flag, or `DOCKHAND_YES`
    /// env), returns `default` immediately without prompting.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal prompt fails (e.g. no TTY available).
    pub fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        if self.non_interactive {
            return Ok(default);
        }
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()?;
        Ok(confirmed)
    }
}
