//! Application service — Docker command adapter.
//!
//! Every docker invocation becomes one shell-escaped string executed through
//! the [`RemoteExecutor`] port. Registry-bound sub-commands additionally get
//! `docker login` beforehand and the configured proxy environment, both read
//! fresh from the settings store on each call.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use dockhand_common::{Host, Settings};

use crate::application::ports::{
    ExecOptions, ExecOutput, RemoteExecutor, SecretStore, SettingsStore,
};
use crate::application::services::credentials::resolve_credentials;
use crate::domain::compose::{
    ComposeProject, LABEL_PROJECT, compose_base_args, parse_compose_ls,
};
use crate::domain::host::proxy_allowed;
use crate::domain::inspect::{ContainerInspect, ImageInspect, parse_first};
use crate::domain::network::{RetryPolicy, is_network_error, needs_registry};
use crate::domain::shell;

/// Docker CLI driven through the remote executor.
pub struct DockerCli {
    executor: Arc<dyn RemoteExecutor>,
    settings: Arc<dyn SettingsStore>,
    secrets: Arc<dyn SecretStore>,
    retry: RetryPolicy,
}

impl DockerCli {
    #[must_use]
    pub fn new(
        executor: Arc<dyn RemoteExecutor>,
        settings: Arc<dyn SettingsStore>,
        secrets: Arc<dyn SecretStore>,
    ) -> Self {
        Self {
            executor,
            settings,
            secrets,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the retry schedule (tests use a zero base delay).
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Current settings, or defaults when the store cannot be read.
    #[must_use]
    pub fn settings(&self) -> Settings {
        self.settings.load().unwrap_or_else(|e| {
            warn!(error = %e, "cannot read settings, using defaults");
            Settings::default()
        })
    }

    /// Run `docker <args>` once.
    ///
    /// # Errors
    ///
    /// Returns an error only when host credentials cannot be decrypted;
    /// command failures are reported in the returned output.
    #[instrument(skip_all, fields(host_id = %host.id, cmd = %args.first().map_or("", String::as_str)))]
    pub async fn run(&self, host: &Host, args: &[String]) -> Result<ExecOutput> {
        self.run_inner(host, args).await
    }

    /// Run `docker <args>`, retrying transient network failures with
    /// exponential backoff. Successes and other failures return at once.
    ///
    /// # Errors
    ///
    /// Returns an error only when host credentials cannot be decrypted.
    pub async fn run_with_retry(&self, host: &Host, args: &[String]) -> Result<ExecOutput> {
        let mut attempt = 0;
        loop {
            let out = self.run(host, args).await?;
            attempt += 1;
            if out.success() || !is_network_error(&out.stderr) || attempt >= self.retry.attempts
            {
                return Ok(out);
            }
            let delay = self.retry.delay_for(attempt - 1);
            debug!(host_id = %host.id, attempt, ?delay, "transient docker failure, retrying");
            tokio::time::sleep(delay).await;
        }
    }

    async fn run_inner(&self, host: &Host, args: &[String]) -> Result<ExecOutput> {
        let settings = self.settings();
        let mut command = format!("docker {}", shell::join(args));
        if needs_registry(args) {
            if args.first().is_none_or(|a| a != "login" && a != "logout") {
                self.ensure_login(host, &settings).await;
            }
            if let Some(prefix) = proxy_prefix(host, &settings) {
                command = format!("{prefix} {command}");
            }
        }
        self.exec(host, &command, &settings).await
    }

    /// Execute a pre-built, already-escaped docker command line, such as a
    /// captured `docker run ...` command.
    ///
    /// # Errors
    ///
    /// Returns an error only when host credentials cannot be decrypted.
    pub async fn run_command_line(&self, host: &Host, command: &str) -> Result<ExecOutput> {
        let settings = self.settings();
        self.exec(host, command, &settings).await
    }

    async fn exec(&self, host: &Host, command: &str, settings: &Settings) -> Result<ExecOutput> {
        let credentials = resolve_credentials(host, self.secrets.as_ref())?;
        let options = ExecOptions::from_settings(settings);
        debug!(host_id = %host.id, %command, "docker");
        Ok(self
            .executor
            .execute(host, &credentials, command, &options)
            .await)
    }

    /// `docker login` with the configured registry credentials. Failures are
    /// logged; the registry command itself reports the real error.
    async fn ensure_login(&self, host: &Host, settings: &Settings) {
        let registry = &settings.registry;
        if !registry.enabled {
            return;
        }
        let (Some(user), Some(stored)) = (registry.username.as_deref(), registry.password.as_deref())
        else {
            return;
        };
        let Some(password) = self.secrets.decrypt(stored) else {
            warn!(host_id = %host.id, "cannot decrypt registry password, skipping login");
            return;
        };
        let credentials = match resolve_credentials(host, self.secrets.as_ref()) {
            Ok(c) => c,
            Err(e) => {
                warn!(host_id = %host.id, error = %e, "skipping registry login");
                return;
            }
        };
        let mut args = vec!["login".to_string()];
        if let Some(server) = registry.server.as_deref().filter(|s| !s.is_empty()) {
            args.push(server.to_string());
        }
        args.extend(["-u".to_string(), user.to_string(), "--password-stdin".to_string()]);
        let mut command = format!("docker {}", shell::join(&args));
        if let Some(prefix) = proxy_prefix(host, settings) {
            command = format!("{prefix} {command}");
        }
        let mut options = ExecOptions::from_settings(settings);
        options.stdin = Some(password);
        let out = self
            .executor
            .execute(host, &credentials, &command, &options)
            .await;
        if !out.success() {
            warn!(host_id = %host.id, error = %out.failure_message(), "registry login failed");
        }
    }

    // ── Typed helpers ─────────────────────────────────────────────────────────

    /// Raw `docker ps -a` table text.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn ps_all(&self, host: &Host) -> Result<String> {
        let out = self.run(host, &args(&["ps", "-a"])).await?;
        if !out.success() {
            anyhow::bail!("docker ps failed on {}: {}", host.id, out.failure_message());
        }
        Ok(out.stdout)
    }

    /// `docker inspect <id>`, `None` when the call fails or does not parse.
    pub async fn inspect_container(&self, host: &Host, id: &str) -> Option<ContainerInspect> {
        let out = match self.run(host, &args(&["inspect", "--type", "container", id])).await {
            Ok(out) if out.success() => out,
            Ok(out) => {
                debug!(host_id = %host.id, container_id = id, error = %out.failure_message(), "inspect failed");
                return None;
            }
            Err(e) => {
                warn!(host_id = %host.id, error = %e, "inspect skipped");
                return None;
            }
        };
        match parse_first::<ContainerInspect>(&out.stdout) {
            Ok(inspect) => Some(inspect),
            Err(e) => {
                warn!(host_id = %host.id, container_id = id, error = %e, "unparseable inspect output");
                None
            }
        }
    }

    /// `docker image inspect <image>`, `None` on failure.
    pub async fn inspect_image(&self, host: &Host, image: &str) -> Option<ImageInspect> {
        let out = self
            .run(host, &args(&["image", "inspect", image]))
            .await
            .ok()
            .filter(ExecOutput::success)?;
        parse_first::<ImageInspect>(&out.stdout)
            .map_err(|e| debug!(host_id = %host.id, image, error = %e, "unparseable image inspect"))
            .ok()
    }

    /// Projects from `docker compose ls -a`.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn compose_ls(&self, host: &Host) -> Result<Vec<ComposeProject>> {
        let out = self
            .run(host, &args(&["compose", "ls", "-a", "--format", "json"]))
            .await?;
        if out.success() {
            return Ok(parse_compose_ls(&out.stdout));
        }
        // Older compose releases have no --format flag.
        let table = self.run(host, &args(&["compose", "ls", "-a"])).await?;
        if !table.success() {
            anyhow::bail!("docker compose ls failed on {}: {}", host.id, table.failure_message());
        }
        Ok(parse_compose_ls(&table.stdout))
    }

    /// Status of one compose project, `None` when the project is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if `compose ls` fails.
    pub async fn compose_project(&self, host: &Host, project: &str) -> Result<Option<ComposeProject>> {
        Ok(self
            .compose_ls(host)
            .await?
            .into_iter()
            .find(|p| p.name == project))
    }

    /// Full IDs of every container labelled with the project.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn compose_project_ids(&self, host: &Host, project: &str) -> Result<Vec<String>> {
        let filter = format!("label={LABEL_PROJECT}={project}");
        let out = self
            .run(host, &args(&["ps", "-a", "-q", "--no-trunc", "--filter", &filter]))
            .await?;
        if !out.success() {
            anyhow::bail!("docker ps --filter failed on {}: {}", host.id, out.failure_message());
        }
        Ok(out
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// `docker compose -p <project> [--project-directory <dir>] <rest...>`.
    ///
    /// # Errors
    ///
    /// Returns an error only when host credentials cannot be decrypted.
    pub async fn compose(
        &self,
        host: &Host,
        project: &str,
        working_dir: Option<&str>,
        rest: &[&str],
    ) -> Result<ExecOutput> {
        let mut full = compose_base_args(project, working_dir);
        full.extend(rest.iter().map(|s| (*s).to_string()));
        if rest.first().is_some_and(|r| *r == "pull") {
            return self.run_with_retry(host, &full).await;
        }
        self.run(host, &full).await
    }

    /// `docker manifest inspect <reference>` with network retries.
    ///
    /// # Errors
    ///
    /// Returns an error only when host credentials cannot be decrypted.
    pub async fn manifest_inspect(&self, host: &Host, reference: &str) -> Result<ExecOutput> {
        self.run_with_retry(host, &args(&["manifest", "inspect", reference]))
            .await
            .context("manifest inspect")
    }
}

/// Owned argument vector from string slices.
#[must_use]
pub fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| (*s).to_string()).collect()
}

/// `HTTP_PROXY=... http_proxy=... ...` assignments, or `None` when no proxy
/// applies to `host`.
#[must_use]
pub fn proxy_prefix(host: &Host, settings: &Settings) -> Option<String> {
    let proxy = &settings.proxy;
    if !proxy.enabled || !proxy_allowed(host, proxy.local_only) {
        return None;
    }
    let mut vars = Vec::new();
    let mut push = |names: [&str; 2], value: &Option<String>| {
        if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
            for name in names {
                vars.push(format!("{name}={}", shell::quote(v)));
            }
        }
    };
    push(["HTTP_PROXY", "http_proxy"], &proxy.http);
    push(["HTTPS_PROXY", "https_proxy"], &proxy.https);
    push(["NO_PROXY", "no_proxy"], &proxy.no_proxy);
    (!vars.is_empty()).then(|| vars.join(" "))
}
