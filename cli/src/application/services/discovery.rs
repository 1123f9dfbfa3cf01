//! Application service — container discovery and reconciliation.
//!
//! The local registry is an eventually-consistent view of what `docker ps`
//! and `docker inspect` report on each host. Reconciliation never deletes:
//! containers that disappear are marked stopped, and removal is the separate
//! `purge` action.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use dockhand_common::{ContainerRecord, Host, STATE_RUNNING, StreamKind, short_id};

use crate::application::ports::{ContainerRepository, HostDirectory, OutputSink};
use crate::application::services::docker::DockerCli;
use crate::application::services::task_runner::InternalCommand;
use crate::domain::compose::compose_from_labels;
use crate::domain::dedup::plan_dedup;
use crate::domain::error::ContainerError;
use crate::domain::inspect::{
    ContainerInspect, ImageInspect, image_name_and_tag, normalize_state, resolve_image_digest,
    synthesize_run_command,
};
use crate::domain::manifest::digest_matches;
use crate::domain::operation::RefreshScope;
use crate::domain::ps::{PsEntry, parse_ps_output};

/// Summary of a duplicate cleanup pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub deleted: usize,
    pub promoted: usize,
}

/// Per-host discovery outcome.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryResult {
    pub host_id: String,
    pub ok: bool,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct Reconciler {
    docker: Arc<DockerCli>,
    repo: Arc<dyn ContainerRepository>,
    hosts: Arc<dyn HostDirectory>,
}

impl Reconciler {
    #[must_use]
    pub fn new(
        docker: Arc<DockerCli>,
        repo: Arc<dyn ContainerRepository>,
        hosts: Arc<dyn HostDirectory>,
    ) -> Self {
        Self { docker, repo, hosts }
    }

    #[must_use]
    pub fn hosts(&self) -> &Arc<dyn HostDirectory> {
        &self.hosts
    }

    #[must_use]
    pub fn repo(&self) -> &Arc<dyn ContainerRepository> {
        &self.repo
    }

    // ── Discovery ─────────────────────────────────────────────────────────────

    /// Scan one host and reconcile the registry with what is running there.
    /// Returns the number of containers seen.
    ///
    /// # Errors
    ///
    /// Returns an error if `docker ps` fails or the registry cannot be
    /// updated. Individual containers that cannot be inspected are recorded
    /// from the `ps` line alone.
    #[instrument(skip_all, fields(host_id = %host.id))]
    pub async fn discover_on_host(&self, host: &Host) -> Result<usize> {
        let text = self.docker.ps_all(host).await?;
        let scan = parse_ps_output(&text);
        for line in &scan.rejected {
            warn!(host_id = %host.id, line = %line, "skipping unparseable ps line");
        }

        let mut inspected: HashMap<String, ContainerInspect> = HashMap::new();
        for entry in &scan.entries {
            if let Some(inspect) = self.docker.inspect_container(host, &entry.id).await {
                inspected.insert(short_id(&inspect.id).to_string(), inspect.clone());
                inspected.insert(inspect.id.clone(), inspect);
            }
        }

        let mut images: HashMap<String, Option<ImageInspect>> = HashMap::new();
        let mut existing = self.repo.list_by_host(&host.id).await?;
        let mut seen: HashSet<String> = HashSet::new();
        let now = Utc::now();

        for entry in &scan.entries {
            let inspect = inspected
                .get(&entry.id)
                .or_else(|| inspected.get(short_id(&entry.id)));
            let image = match inspect {
                Some(i) => self.image_for(host, i, &mut images).await,
                None => None,
            };
            let full_id = inspect.map_or_else(|| entry.id.clone(), |i| i.id.clone());
            seen.insert(full_id.clone());
            seen.insert(short_id(&full_id).to_string());
            seen.insert(entry.id.clone());

            let keys = [full_id.as_str(), short_id(&full_id), entry.id.as_str()];
            let matches: Vec<usize> = existing
                .iter()
                .enumerate()
                .filter(|(_, r)| keys.contains(&r.container_id.as_str()))
                .map(|(i, _)| i)
                .collect();

            if let Some((&keep, siblings)) = matches.split_first() {
                let record = &mut existing[keep];
                record.container_id.clone_from(&full_id);
                apply_ps(record, entry, now);
                if let Some(i) = inspect {
                    apply_inspect(record, i, image.as_ref(), now);
                }
                self.repo.update(record).await?;
                let dupes: Vec<u64> = siblings.iter().map(|&i| existing[i].row_id).collect();
                if !dupes.is_empty() {
                    debug!(host_id = %host.id, container_id = %full_id, count = dupes.len(), "removing duplicate rows");
                    self.repo.delete(&dupes).await?;
                    existing.retain(|r| !dupes.contains(&r.row_id));
                }
            } else {
                let mut record = ContainerRecord::new(&host.id, &full_id, &entry.name, now);
                apply_ps(&mut record, entry, now);
                if let Some(i) = inspect {
                    apply_inspect(&mut record, i, image.as_ref(), now);
                }
                let stored = self.repo.insert(record).await?;
                existing.push(stored);
            }
        }

        let mut stopped = 0usize;
        for record in existing.iter_mut().filter(|r| {
            !r.is_compose_managed()
                && !seen.contains(&r.container_id)
                && !seen.contains(short_id(&r.container_id))
        }) {
            if record.started_at.is_some() || record.state != dockhand_common::STATE_STOPPED {
                record.mark_stopped(now);
                self.repo.update(record).await?;
                stopped += 1;
            }
        }

        info!(host_id = %host.id, count = scan.entries.len(), stopped, "discovery complete");
        Ok(scan.entries.len())
    }

    async fn image_for(
        &self,
        host: &Host,
        inspect: &ContainerInspect,
        cache: &mut HashMap<String, Option<ImageInspect>>,
    ) -> Option<ImageInspect> {
        if let Some(hit) = cache.get(&inspect.image) {
            return hit.clone();
        }
        let target = if inspect.image.is_empty() {
            inspect.config.image.as_str()
        } else {
            inspect.image.as_str()
        };
        let image = self.docker.inspect_image(host, target).await;
        cache.insert(inspect.image.clone(), image.clone());
        image
    }

    /// Discover every host concurrently.
    ///
    /// # Errors
    ///
    /// Returns an error if the host inventory cannot be read.
    pub async fn discover_all(self: &Arc<Self>) -> Result<Vec<DiscoveryResult>> {
        let hosts = self.hosts.list()?;
        let mut set = tokio::task::JoinSet::new();
        for host in hosts {
            let this = Arc::clone(self);
            set.spawn(async move {
                let res = this.discover_on_host(&host).await;
                (host.id, res)
            });
        }
        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            let Ok((host_id, res)) = joined else {
                warn!("discovery task panicked");
                continue;
            };
            results.push(match res {
                Ok(count) => DiscoveryResult {
                    host_id,
                    ok: true,
                    count,
                    error: None,
                },
                Err(e) => {
                    warn!(%host_id, error = %e, "discovery failed");
                    DiscoveryResult {
                        host_id,
                        ok: false,
                        count: 0,
                        error: Some(format!("{e:#}")),
                    }
                }
            });
        }
        results.sort_by(|a, b| a.host_id.cmp(&b.host_id));
        Ok(results)
    }

    // ── Targeted refresh ──────────────────────────────────────────────────────

    /// Re-inspect a subset of one host's containers.
    /// Returns the number of records updated.
    ///
    /// # Errors
    ///
    /// Returns an error if the host is unknown or the registry cannot be
    /// read or written.
    #[instrument(skip(self))]
    pub async fn refresh_status(&self, host_id: &str, scope: &RefreshScope) -> Result<usize> {
        let host = self.hosts.get(host_id)?;
        let records = self.repo.list_by_host(host_id).await?;
        let now = Utc::now();

        let mut targets: Vec<ContainerRecord> = match scope {
            RefreshScope::ContainerIds(ids) => ids
                .iter()
                .filter_map(|id| match_reference(&records, id).cloned())
                .collect(),
            RefreshScope::ContainerNames(names) => records
                .iter()
                .filter(|r| names.contains(&r.name))
                .cloned()
                .collect(),
            RefreshScope::ComposeProject(project) => records
                .iter()
                .filter(|r| r.compose.as_ref().is_some_and(|c| &c.project == project))
                .cloned()
                .collect(),
        };
        if targets.is_empty() {
            debug!(host_id, "nothing to refresh");
            return Ok(0);
        }

        let live: Vec<ContainerInspect> = match scope {
            RefreshScope::ComposeProject(project) => {
                let running = self
                    .docker
                    .compose_project(&host, project)
                    .await?
                    .is_some_and(|p| p.is_running());
                if !running {
                    for t in &mut targets {
                        t.mark_stopped(now);
                        self.repo.update(t).await?;
                    }
                    info!(host_id, project = %project, "compose project not running, marked stopped");
                    return Ok(targets.len());
                }
                let mut live = Vec::new();
                for id in self.docker.compose_project_ids(&host, project).await? {
                    if let Some(i) = self.docker.inspect_container(&host, &id).await {
                        live.push(i);
                    }
                }
                live
            }
            _ => {
                let mut live = Vec::new();
                for t in &targets {
                    let found = match self.docker.inspect_container(&host, &t.container_id).await {
                        Some(i) => Some(i),
                        None => self.docker.inspect_container(&host, &t.name).await,
                    };
                    live.extend(found);
                }
                live
            }
        };

        let mut images = HashMap::new();
        for target in &mut targets {
            let matched = live
                .iter()
                .find(|i| i.id == target.container_id)
                .or_else(|| live.iter().find(|i| short_id(&i.id) == short_id(&target.container_id)))
                .or_else(|| live.iter().find(|i| i.display_name() == target.name));
            match matched {
                Some(inspect) => {
                    let image = self.image_for(&host, inspect, &mut images).await;
                    target.container_id.clone_from(&inspect.id);
                    apply_inspect(target, inspect, image.as_ref(), now);
                }
                None => target.mark_stopped(now),
            }
            self.repo.update(target).await?;
        }
        Ok(targets.len())
    }

    // ── Maintenance ───────────────────────────────────────────────────────────

    /// Apply both uniqueness rules to one host or the whole registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be read or written.
    pub async fn cleanup_duplicates(&self, host_id: Option<&str>) -> Result<CleanupReport> {
        let records = match host_id {
            Some(h) => self.repo.list_by_host(h).await?,
            None => self.repo.list_all().await?,
        };
        let plan = plan_dedup(&records);
        for (row_id, full) in &plan.promote {
            if let Some(r) = records.iter().find(|r| r.row_id == *row_id) {
                let mut r = r.clone();
                r.container_id.clone_from(full);
                r.updated_at = Utc::now();
                self.repo.update(&r).await?;
            }
        }
        let deleted = self.repo.delete(&plan.delete).await?;
        info!(host_id, deleted, promoted = plan.promote.len(), "duplicate cleanup complete");
        Ok(CleanupReport {
            deleted,
            promoted: plan.promote.len(),
        })
    }

    /// Delete every record for one host, or every record.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be written.
    pub async fn purge(&self, host_id: Option<&str>) -> Result<usize> {
        if let Some(h) = host_id {
            self.hosts.get(h)?;
        }
        let removed = self.repo.purge(host_id).await?;
        info!(host_id, removed, "purged container records");
        Ok(removed)
    }
}

#[async_trait]
impl InternalCommand for Reconciler {
    async fn run(&self, host: &Host, sink: &dyn OutputSink) -> Result<()> {
        let count = self.discover_on_host(host).await?;
        sink.line(StreamKind::Stdout, &format!("discovered {count} containers"));
        Ok(())
    }
}

// ── Record construction ──────────────────────────────────────────────────────

fn apply_ps(record: &mut ContainerRecord, entry: &PsEntry, now: DateTime<Utc>) {
    record.name.clone_from(&entry.name);
    record.state.clone_from(&entry.state);
    record.status.clone_from(&entry.status);
    record.updated_at = now;
}

/// Copy everything `inspect` knows onto the record. Update-check fields are
/// preserved; `update_available` is recomputed if the running image changed.
pub fn apply_inspect(
    record: &mut ContainerRecord,
    inspect: &ContainerInspect,
    image: Option<&ImageInspect>,
    now: DateTime<Utc>,
) {
    let state = normalize_state(&inspect.state);
    record.name = inspect.display_name().to_string();
    // Keep the richer `ps` status text unless it contradicts the state.
    let consistent = (state == STATE_RUNNING) == record.status.starts_with("Up");
    if !consistent || record.status.is_empty() {
        record.status.clone_from(&state);
    }
    record.state = state;

    let repo_tags = image.map(ImageInspect::repo_tags).unwrap_or_default();
    let (name, tag) = image_name_and_tag(&inspect.config.image, repo_tags);
    record.image = name;
    record.image_tag = tag;

    let previous = record.repo_digest.clone();
    record.repo_digest = resolve_image_digest(&inspect.image, image.map(|i| i.id.as_str()));
    if let Some(image) = image {
        record.repo_digests = image.repo_digests().to_vec();
        record.platform = image.platform().or_else(|| record.platform.clone());
    }
    if previous != record.repo_digest {
        if let Some(remote) = &record.remote_digest {
            let mut local = record.repo_digests.clone();
            local.extend(record.repo_digest.clone());
            record.update_available = !digest_matches(remote, &local);
        }
    }

    record.labels = inspect.labels();
    record.ports = inspect.port_bindings();
    record.mounts = inspect.mount_infos();
    record.networks = inspect.network_names();
    record.compose = compose_from_labels(&record.host_id, &record.labels);
    record.run_command = if record.compose.is_some() {
        None
    } else {
        Some(synthesize_run_command(inspect))
    };
    record.started_at = if record.state == STATE_RUNNING {
        inspect.started_at()
    } else {
        None
    };
    record.updated_at = now;
}

/// Match a user-supplied reference: full ID, then short ID, then name.
#[must_use]
pub fn match_reference<'a>(records: &'a [ContainerRecord], reference: &str) -> Option<&'a ContainerRecord> {
    records
        .iter()
        .find(|r| r.container_id == reference)
        .or_else(|| {
            (reference.len() >= 12)
                .then(|| {
                    records
                        .iter()
                        .find(|r| short_id(&r.container_id) == short_id(reference))
                })
                .flatten()
        })
        .or_else(|| records.iter().find(|r| r.name == reference))
}

/// Resolve a reference to exactly one record.
///
/// # Errors
///
/// Returns `ContainerError::NotFound` when nothing matches and
/// `ContainerError::Ambiguous` when a name matches several records.
pub fn find_record(records: &[ContainerRecord], host_id: &str, reference: &str) -> Result<ContainerRecord> {
    let by_name = records.iter().filter(|r| r.name == reference).count();
    let exact = records.iter().any(|r| r.container_id == reference);
    if !exact && by_name > 1 {
        return Err(ContainerError::Ambiguous {
            host_id: host_id.to_string(),
            reference: reference.to_string(),
            count: by_name,
        }
        .into());
    }
    match_reference(records, reference).cloned().ok_or_else(|| {
        ContainerError::NotFound {
            host_id: host_id.to_string(),
            reference: reference.to_string(),
        }
        .into()
    })
}
