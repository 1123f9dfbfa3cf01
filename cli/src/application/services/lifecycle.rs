//! Application service — container lifecycle operations.
//!
//! Every public operation returns an [`OperationOutcome`]; errors are logged
//! and converted at this boundary. Mutations are followed by an advisory
//! refresh whose failure is logged and never changes the outcome.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{instrument, warn};

use dockhand_common::{ContainerRecord, Host};

use crate::application::ports::{ContainerRepository, EventBus, ExecOutput, HostDirectory, OperationLogStore};
use crate::application::services::discovery::{Reconciler, find_record};
use crate::application::services::docker::{DockerCli, args};
use crate::application::services::journal::OperationJournal;
use crate::domain::compose::ComposeOp;
use crate::domain::operation::{
    ContainerAction, OperationOutcome, REASON_BACKUP_FAILED, REASON_MISSING_RUN_COMMAND,
    REASON_PULL_FAILED, REASON_RECREATE_ROLLED_BACK, REASON_UNEXPECTED_ROLLED_BACK, RefreshScope,
    backup_name,
};

type LockKey = (String, String);

pub struct Lifecycle {
    docker: Arc<DockerCli>,
    reconciler: Arc<Reconciler>,
    repo: Arc<dyn ContainerRepository>,
    hosts: Arc<dyn HostDirectory>,
    logs: Arc<dyn OperationLogStore>,
    bus: Arc<dyn EventBus>,
    locks: Mutex<HashMap<LockKey, Arc<Mutex<()>>>>,
}

/// How a single imperative update step ended. A command that ran and
/// exited non-zero is `Failed`; a lost transport or a local error is `Broken`.
enum Step {
    Done,
    Failed(String),
    Broken(anyhow::Error),
}

impl From<Result<ExecOutput>> for Step {
    fn from(result: Result<ExecOutput>) -> Self {
        match result {
            Ok(out) if out.success() => Self::Done,
            Ok(ExecOutput { error: Some(error), .. }) => Self::Broken(anyhow::anyhow!(error)),
            Ok(out) => Self::Failed(out.failure_message()),
            Err(e) => Self::Broken(e),
        }
    }
}

impl Lifecycle {
    #[must_use]
    pub fn new(
        docker: Arc<DockerCli>,
        reconciler: Arc<Reconciler>,
        logs: Arc<dyn OperationLogStore>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        let repo = Arc::clone(reconciler.repo());
        let hosts = Arc::clone(reconciler.hosts());
        Self {
            docker,
            reconciler,
            repo,
            hosts,
            logs,
            bus,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn journal(&self, title: &str, op_id: Option<String>) -> OperationJournal {
        let Some(op_id) = op_id else {
            return OperationJournal::detached();
        };
        match OperationJournal::begin(title, Some(op_id), Arc::clone(&self.logs), Arc::clone(&self.bus))
            .await
        {
            Ok(j) => j,
            Err(e) => {
                warn!(error = %e, "cannot open operation log, continuing without it");
                OperationJournal::detached()
            }
        }
    }

    async fn lock_for(&self, host_id: &str, container_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(
            locks
                .entry((host_id.to_string(), container_id.to_string()))
                .or_default(),
        )
    }

    async fn resolve(&self, host_id: &str, reference: &str) -> Result<(Host, ContainerRecord)> {
        let host = self.hosts.get(host_id)?;
        let records = self.repo.list_by_host(host_id).await?;
        let record = find_record(&records, host_id, reference)?;
        Ok((host, record))
    }

    async fn advisory_refresh(&self, journal: &OperationJournal, host_id: &str, scope: RefreshScope) {
        if let Err(e) = self.reconciler.refresh_status(host_id, &scope).await {
            journal
                .error(Some(host_id), &format!("follow-up refresh failed: {e:#}"))
                .await;
        }
    }

    // ── start / stop / restart ────────────────────────────────────────────────

    #[instrument(skip(self, op_id))]
    pub async fn container_action(
        &self,
        host_id: &str,
        reference: &str,
        action: ContainerAction,
        op_id: Option<String>,
    ) -> OperationOutcome {
        let journal = self
            .journal(&format!("{action} {reference} on {host_id}"), op_id)
            .await;
        let outcome = match self.resolve(host_id, reference).await {
            Ok((host, record)) => self.act(&journal, &host, &record, action).await,
            Err(e) => {
                journal.error(Some(host_id), &format!("{e:#}")).await;
                OperationOutcome::failure(format!("{e:#}"))
            }
        };
        journal.finish(outcome.ok).await;
        outcome
    }

    async fn act(
        &self,
        journal: &OperationJournal,
        host: &Host,
        record: &ContainerRecord,
        action: ContainerAction,
    ) -> OperationOutcome {
        let (result, scope) = match &record.compose {
            Some(meta) => (
                self.docker
                    .compose(
                        host,
                        &meta.project,
                        meta.working_dir.as_deref(),
                        &[action.verb(), meta.service.as_str()],
                    )
                    .await,
                RefreshScope::ComposeProject(meta.project.clone()),
            ),
            None => (
                self.docker
                    .run(host, &args(&[action.verb(), record.container_id.as_str()]))
                    .await,
                RefreshScope::ContainerIds(vec![record.container_id.clone()]),
            ),
        };
        let outcome = match Step::from(result) {
            Step::Done => {
                journal
                    .info(Some(&host.id), &format!("{action} {} ok", record.name))
                    .await;
                OperationOutcome::success()
            }
            Step::Failed(message) => {
                journal
                    .error(Some(&host.id), &format!("{action} {} failed: {message}", record.name))
                    .await;
                OperationOutcome::failure(message)
            }
            Step::Broken(e) => {
                journal.error(Some(&host.id), &format!("{e:#}")).await;
                OperationOutcome::failure(format!("{e:#}"))
            }
        };
        self.advisory_refresh(journal, &host.id, scope).await;
        outcome
    }

    // ── update ────────────────────────────────────────────────────────────────

    /// Update one container to the latest image of its reference.
    ///
    /// Updates of the same container are serialized.
    #[instrument(skip(self, op_id))]
    pub async fn update(&self, host_id: &str, reference: &str, op_id: Option<String>) -> OperationOutcome {
        let journal = self
            .journal(&format!("update {reference} on {host_id}"), op_id)
            .await;
        let (host, record) = match self.resolve(host_id, reference).await {
            Ok(found) => found,
            Err(e) => {
                journal.error(Some(host_id), &format!("{e:#}")).await;
                journal.finish(false).await;
                return OperationOutcome::failure(format!("{e:#}"));
            }
        };

        let lock = self.lock_for(host_id, &record.container_id).await;
        let _guard = lock.lock().await;

        let outcome = if record.compose.is_some() {
            self.update_compose(&journal, &host, &record).await
        } else {
            self.update_cli(&journal, &host, &record).await
        };
        journal.finish(outcome.ok).await;
        outcome
    }

    async fn update_compose(
        &self,
        journal: &OperationJournal,
        host: &Host,
        record: &ContainerRecord,
    ) -> OperationOutcome {
        let Some(meta) = &record.compose else {
            return OperationOutcome::failure("not compose-managed");
        };
        let dir = meta.working_dir.as_deref();
        journal
            .info(Some(&host.id), &format!("pulling {} ({})", meta.service, meta.project))
            .await;
        match Step::from(self.docker.compose(host, &meta.project, dir, &["pull", &meta.service]).await) {
            Step::Done => {}
            Step::Failed(message) => {
                journal.error(Some(&host.id), &format!("pull failed: {message}")).await;
                return OperationOutcome::failure(REASON_PULL_FAILED);
            }
            Step::Broken(e) => {
                journal.error(Some(&host.id), &format!("{e:#}")).await;
                return OperationOutcome::failure(REASON_PULL_FAILED);
            }
        }
        let up = self
            .docker
            .compose(host, &meta.project, dir, &["up", "-d", "--no-deps", &meta.service])
            .await;
        match Step::from(up) {
            Step::Done => {}
            Step::Failed(message) => {
                journal.error(Some(&host.id), &format!("compose up failed: {message}")).await;
                return OperationOutcome::failure(format!("compose up failed: {message}"));
            }
            Step::Broken(e) => {
                journal.error(Some(&host.id), &format!("{e:#}")).await;
                return OperationOutcome::failure(format!("{e:#}"));
            }
        }
        self.clear_update_flag(journal, record).await;
        journal
            .info(Some(&host.id), &format!("{} updated", meta.service))
            .await;
        self.advisory_refresh(journal, &host.id, RefreshScope::ComposeProject(meta.project.clone()))
            .await;
        OperationOutcome::success()
    }

    async fn update_cli(
        &self,
        journal: &OperationJournal,
        host: &Host,
        record: &ContainerRecord,
    ) -> OperationOutcome {
        let Some(run_command) = record.run_command.as_deref().filter(|c| !c.trim().is_empty()) else {
            journal
                .error(Some(&host.id), &format!("{} has no captured run command", record.name))
                .await;
            return OperationOutcome::failure(REASON_MISSING_RUN_COMMAND);
        };
        let name = record.name.as_str();
        let image = record.image_ref();

        journal.info(Some(&host.id), &format!("pulling {image}")).await;
        match Step::from(self.docker.run_with_retry(host, &args(&["pull", &image])).await) {
            Step::Done => {}
            Step::Failed(message) => {
                journal.error(Some(&host.id), &format!("pull failed: {message}")).await;
                return OperationOutcome::failure(REASON_PULL_FAILED);
            }
            Step::Broken(e) => {
                journal.error(Some(&host.id), &format!("pull failed: {e:#}")).await;
                return OperationOutcome::failure(REASON_PULL_FAILED);
            }
        }

        let backup = backup_name(name, Utc::now().timestamp_millis(), backup_salt());
        journal
            .info(Some(&host.id), &format!("renaming {name} to {backup}"))
            .await;
        match Step::from(self.docker.run(host, &args(&["rename", name, &backup])).await) {
            Step::Done => {}
            Step::Failed(message) => {
                journal.error(Some(&host.id), &format!("rename failed: {message}")).await;
                return OperationOutcome::failure(REASON_BACKUP_FAILED);
            }
            Step::Broken(e) => {
                journal.error(Some(&host.id), &format!("{e:#}")).await;
                return OperationOutcome::failure(REASON_BACKUP_FAILED);
            }
        }
        match Step::from(self.docker.run(host, &args(&["stop", &backup])).await) {
            Step::Done => {}
            Step::Failed(message) => {
                journal.error(Some(&host.id), &format!("stopping backup failed: {message}")).await;
                self.rename_back(journal, host, &backup, name).await;
                return OperationOutcome::failure(REASON_BACKUP_FAILED);
            }
            Step::Broken(e) => {
                journal.error(Some(&host.id), &format!("{e:#}")).await;
                self.rollback(journal, host, name, &backup, record.is_running()).await;
                return OperationOutcome::failure(REASON_UNEXPECTED_ROLLED_BACK);
            }
        }

        journal.info(Some(&host.id), &format!("recreating {name}")).await;
        match Step::from(self.docker.run_command_line(host, run_command).await) {
            Step::Done => {}
            Step::Failed(message) => {
                journal.error(Some(&host.id), &format!("recreate failed: {message}")).await;
                self.rollback(journal, host, name, &backup, record.is_running()).await;
                return OperationOutcome::failure(REASON_RECREATE_ROLLED_BACK);
            }
            Step::Broken(e) => {
                journal.error(Some(&host.id), &format!("{e:#}")).await;
                self.rollback(journal, host, name, &backup, record.is_running()).await;
                return OperationOutcome::failure(REASON_UNEXPECTED_ROLLED_BACK);
            }
        }

        match Step::from(self.docker.run(host, &args(&["rm", "-f", &backup])).await) {
            Step::Done => {}
            Step::Failed(message) => {
                journal
                    .error(Some(&host.id), &format!("cannot remove {backup}: {message}"))
                    .await;
            }
            Step::Broken(e) => {
                journal.error(Some(&host.id), &format!("{e:#}")).await;
                self.rollback(journal, host, name, &backup, record.is_running()).await;
                return OperationOutcome::failure(REASON_UNEXPECTED_ROLLED_BACK);
            }
        }

        self.clear_update_flag(journal, record).await;
        journal.info(Some(&host.id), &format!("{name} updated")).await;
        self.advisory_refresh(
            journal,
            &host.id,
            RefreshScope::ContainerIds(vec![record.container_id.clone()]),
        )
        .await;
        OperationOutcome::success()
    }

    /// Remove whatever holds `name`, put the backup back and restart it if
    /// the original was running.
    async fn rollback(
        &self,
        journal: &OperationJournal,
        host: &Host,
        name: &str,
        backup: &str,
        was_running: bool,
    ) {
        journal.info(Some(&host.id), &format!("rolling back {name}")).await;
        if let Some(m) = step_error(self.docker.run(host, &args(&["rm", "-f", name])).await) {
            journal
                .error(Some(&host.id), &format!("cannot remove partial {name}: {m}"))
                .await;
        }
        self.rename_back(journal, host, backup, name).await;
        if was_running {
            if let Some(m) = step_error(self.docker.run(host, &args(&["start", name])).await) {
                journal
                    .error(Some(&host.id), &format!("cannot restart {name}: {m}"))
                    .await;
            }
        }
    }

    async fn rename_back(&self, journal: &OperationJournal, host: &Host, backup: &str, name: &str) {
        if let Some(m) = step_error(self.docker.run(host, &args(&["rename", backup, name])).await) {
            journal
                .error(Some(&host.id), &format!("cannot rename {backup} back to {name}: {m}"))
                .await;
        }
    }

    async fn clear_update_flag(&self, journal: &OperationJournal, record: &ContainerRecord) {
        let mut updated = record.clone();
        updated.update_available = false;
        updated.updated_at = Utc::now();
        if let Err(e) = self.repo.update(&updated).await {
            journal
                .error(Some(&record.host_id), &format!("cannot clear update flag: {e:#}"))
                .await;
        }
    }

    // ── compose project operations ────────────────────────────────────────────

    #[instrument(skip(self, op_id))]
    pub async fn compose_operate(
        &self,
        host_id: &str,
        project: &str,
        working_dir: Option<&str>,
        op: ComposeOp,
        op_id: Option<String>,
    ) -> OperationOutcome {
        let journal = self
            .journal(&format!("compose {op} {project} on {host_id}"), op_id)
            .await;
        let host = match self.hosts.get(host_id) {
            Ok(h) => h,
            Err(e) => {
                journal.error(Some(host_id), &format!("{e:#}")).await;
                journal.finish(false).await;
                return OperationOutcome::failure(format!("{e:#}"));
            }
        };
        let outcome = match step_error(self.docker.compose(&host, project, working_dir, op.args()).await) {
            None => {
                journal
                    .info(Some(host_id), &format!("compose {op} {project} ok"))
                    .await;
                OperationOutcome::success()
            }
            Some(message) => {
                journal
                    .error(Some(host_id), &format!("compose {op} {project} failed: {message}"))
                    .await;
                OperationOutcome::failure(message)
            }
        };
        self.advisory_refresh(&journal, host_id, RefreshScope::ComposeProject(project.to_string()))
            .await;
        journal.finish(outcome.ok).await;
        outcome
    }
}

/// Failure text of a step, or `None` when it succeeded.
fn step_error(result: Result<ExecOutput>) -> Option<String> {
    match Step::from(result) {
        Step::Done => None,
        Step::Failed(message) => Some(message),
        Step::Broken(e) => Some(format!("{e:#}")),
    }
}

fn backup_salt() -> u16 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let hash = RandomState::new().build_hasher().finish();
    u16::try_from(hash & 0xffff).unwrap_or_default()
}
