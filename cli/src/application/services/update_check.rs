//! Application service — image update detection.
//!
//! Resolves the current registry digest of an image for one platform without
//! pulling it. Each step runs only if the previous one failed:
//!
//! 1. `docker manifest inspect` (network retries), platform-aware selection;
//! 2. on Docker Hub rate limiting, step 1 against each pull-through mirror;
//! 3. `docker buildx imagetools inspect --raw` (plain output on old buildx);
//! 4. on rate limiting again, step 3 against each mirror;
//! 5. a throwaway inspector container.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use dockhand_common::{ContainerRecord, Host, Platform};

use crate::application::ports::{ContainerRepository, ExecOutput, HostDirectory};
use crate::application::services::docker::{DockerCli, args};
use crate::domain::image::{is_docker_hub, mirror_references};
use crate::domain::manifest::{
    digest_matches, imagetools_digest, inspector_digest, is_manifest_list, select_manifest_digest,
    summary_digest,
};
use crate::domain::network::is_rate_limited;

/// Image used by the last-resort lookup; must provide `inspect docker://...`.
pub const DEFAULT_INSPECTOR_IMAGE: &str = "quay.io/skopeo/stable:latest";

/// Outcome of one digest lookup.
///
/// `digest` is the platform-specific digest. For a manifest list
/// `index_digest` holds the digest of the list itself, which is what a
/// local `RepoDigest` records after a pull by tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DigestLookup {
    pub digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_digest: Option<String>,
    pub error: Option<String>,
    pub rate_limited: bool,
}

/// A digest found by one lookup step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Found {
    pub digest: String,
    pub index_digest: Option<String>,
}

impl DigestLookup {
    fn found(found: Found, rate_limited: bool) -> Self {
        Self {
            digest: Some(found.digest),
            index_digest: found.index_digest,
            error: None,
            rate_limited,
        }
    }
}

/// Layered remote digest resolution.
pub struct DigestResolver {
    docker: Arc<DockerCli>,
    inspector_image: String,
}

impl DigestResolver {
    #[must_use]
    pub fn new(docker: Arc<DockerCli>) -> Self {
        Self {
            docker,
            inspector_image: DEFAULT_INSPECTOR_IMAGE.to_string(),
        }
    }

    /// Resolve the remote digest of `reference` for `platform`, running the
    /// docker CLI on `host`.
    #[instrument(skip_all, fields(host_id = %host.id, %reference))]
    pub async fn resolve(&self, host: &Host, reference: &str, platform: &Platform) -> DigestLookup {
        let mut rate_limited = false;
        let hub = is_docker_hub(reference);

        // 1. manifest inspect
        let first = match self.via_manifest(host, reference, platform).await {
            Ok(found) => return DigestLookup::found(found, false),
            Err(err) => err,
        };

        // 2. mirrors after rate limiting
        if is_rate_limited(&first) {
            rate_limited = true;
            if hub {
                for mirror in mirror_references(reference) {
                    if let Ok(found) = self.via_manifest(host, &mirror, platform).await {
                        info!(mirror = %mirror, "digest resolved through mirror");
                        return DigestLookup::found(found, true);
                    }
                }
            }
        }

        // 3. imagetools
        let second = match self.via_imagetools(host, reference).await {
            Ok(found) => return DigestLookup::found(found, rate_limited),
            Err(err) => err,
        };

        // 4. mirrors again
        if is_rate_limited(&second) {
            rate_limited = true;
            if hub {
                for mirror in mirror_references(reference) {
                    if let Ok(found) = self.via_imagetools(host, &mirror).await {
                        info!(mirror = %mirror, "digest resolved through mirror");
                        return DigestLookup::found(found, true);
                    }
                }
            }
        }

        // 5. throwaway inspector
        match self.via_inspector(host, reference, platform).await {
            Ok(found) => DigestLookup::found(found, rate_limited),
            Err(third) => {
                warn!(error = %third, "all digest lookups failed");
                let limited = rate_limited || is_rate_limited(&third);
                DigestLookup {
                    digest: None,
                    index_digest: None,
                    error: Some(third),
                    rate_limited: limited,
                }
            }
        }
    }

    async fn via_manifest(
        &self,
        host: &Host,
        reference: &str,
        platform: &Platform,
    ) -> Result<Found, String> {
        let out = self
            .docker
            .manifest_inspect(host, reference)
            .await
            .map_err(|e| e.to_string())?;
        let out = succeeded(out)?;
        let digest = select_manifest_digest(&out.stdout, platform).map_err(|e| e.to_string())?;
        let index_digest = if is_manifest_list(&out.stdout) {
            self.index_digest(host, reference).await
        } else {
            None
        };
        Ok(Found {
            digest,
            index_digest,
        })
    }

    async fn via_imagetools(&self, host: &Host, reference: &str) -> Result<Found, String> {
        let raw = args(&["buildx", "imagetools", "inspect", reference, "--raw"]);
        let out = self
            .docker
            .run_with_retry(host, &raw)
            .await
            .map_err(|e| e.to_string())?;
        if !out.success() && out.stderr.contains("unknown flag") {
            debug!("imagetools has no --raw, retrying plain");
            let plain = args(&["buildx", "imagetools", "inspect", reference]);
            let out = self
                .docker
                .run_with_retry(host, &plain)
                .await
                .map_err(|e| e.to_string())?;
            let out = succeeded(out)?;
            // the summary digest is the top-level one, index or single manifest
            let digest = imagetools_digest(&out.stdout).map_err(|e| e.to_string())?;
            return Ok(Found {
                index_digest: Some(digest.clone()),
                digest,
            });
        }
        let out = succeeded(out)?;
        let digest = imagetools_digest(&out.stdout).map_err(|e| e.to_string())?;
        let index_digest = if is_manifest_list(&out.stdout) {
            self.index_digest(host, reference).await
        } else {
            None
        };
        Ok(Found {
            digest,
            index_digest,
        })
    }

    /// Digest of the manifest list itself, from the plain imagetools summary.
    async fn index_digest(&self, host: &Host, reference: &str) -> Option<String> {
        let plain = args(&["buildx", "imagetools", "inspect", reference]);
        let out = match self.docker.run_with_retry(host, &plain).await {
            Ok(out) if out.success() => out,
            Ok(out) => {
                debug!(stderr = %out.stderr.trim(), "index digest unavailable");
                return None;
            }
            Err(e) => {
                debug!(error = %e, "index digest unavailable");
                return None;
            }
        };
        summary_digest(&out.stdout).ok()
    }

    async fn via_inspector(
        &self,
        host: &Host,
        reference: &str,
        platform: &Platform,
    ) -> Result<Found, String> {
        let target = format!("docker://{reference}");
        let cmd = args(&[
            "run",
            "--rm",
            &self.inspector_image,
            "inspect",
            "--override-arch",
            &platform.architecture,
            "--override-os",
            &platform.os,
            &target,
        ]);
        let out = self.docker.run(host, &cmd).await.map_err(|e| e.to_string())?;
        let out = succeeded(out)?;
        // the inspector reports the top-level digest, index or single manifest
        let digest = inspector_digest(&out.stdout).map_err(|e| e.to_string())?;
        Ok(Found {
            index_digest: Some(digest.clone()),
            digest,
        })
    }
}

fn succeeded(out: ExecOutput) -> Result<ExecOutput, String> {
    if out.success() {
        Ok(out)
    } else {
        Err(if out.stderr.trim().is_empty() {
            out.failure_message()
        } else {
            out.stderr.trim().to_string()
        })
    }
}

// ── Update checks over the registry ──────────────────────────────────────────

/// Per-container result of an update check.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateCheckResult {
    pub host_id: String,
    pub container_id: String,
    pub name: String,
    pub image: String,
    pub update_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub rate_limited: bool,
}

/// Checks recorded containers against their registries.
pub struct UpdateChecker {
    resolver: DigestResolver,
    repo: Arc<dyn ContainerRepository>,
    hosts: Arc<dyn HostDirectory>,
}

impl UpdateChecker {
    #[must_use]
    pub fn new(
        resolver: DigestResolver,
        repo: Arc<dyn ContainerRepository>,
        hosts: Arc<dyn HostDirectory>,
    ) -> Self {
        Self {
            resolver,
            repo,
            hosts,
        }
    }

    /// Check one record and persist the result.
    ///
    /// On lookup failure only `update_checked_at` advances; the previous
    /// `update_available` and `remote_digest` are left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be persisted.
    pub async fn check_record(&self, host: &Host, record: &mut ContainerRecord) -> Result<UpdateCheckResult> {
        let lookup = self.lookup_for(host, record).await;
        apply_lookup(record, &lookup);
        self.repo.update(record).await?;
        Ok(result_for(record, &lookup))
    }

    async fn lookup_for(&self, host: &Host, record: &ContainerRecord) -> DigestLookup {
        let reference = record.image_ref();
        if reference.is_empty() || reference.starts_with("sha256:") {
            return DigestLookup {
                error: Some("image has no registry reference".to_string()),
                ..DigestLookup::default()
            };
        }
        let platform = record.platform.clone().unwrap_or_default();
        self.resolver.resolve(host, &reference, &platform).await
    }

    /// Check a single container by id on a host.
    ///
    /// # Errors
    ///
    /// Returns an error if the host or container is unknown.
    pub async fn check_container(&self, host_id: &str, reference: &str) -> Result<UpdateCheckResult> {
        let host = self.hosts.get(host_id)?;
        let records = self.repo.list_by_host(host_id).await?;
        let mut record = crate::application::services::discovery::find_record(&records, host_id, reference)?;
        self.check_record(&host, &mut record).await
    }

    /// Check every container recorded for a host. Lookups are shared between
    /// containers running the same image on the same platform.
    ///
    /// # Errors
    ///
    /// Returns an error if the host is unknown or the registry cannot be read.
    #[instrument(skip(self))]
    pub async fn check_host(&self, host_id: &str) -> Result<Vec<UpdateCheckResult>> {
        let host = self.hosts.get(host_id)?;
        let records = self.repo.list_by_host(host_id).await?;
        let mut cache: HashMap<(String, String), DigestLookup> = HashMap::new();
        let mut results = Vec::with_capacity(records.len());
        for mut record in records {
            let key = (
                record.image_ref(),
                record.platform.clone().unwrap_or_default().to_string(),
            );
            let lookup = match cache.get(&key) {
                Some(hit) => hit.clone(),
                None => {
                    let fresh = self.lookup_for(&host, &record).await;
                    cache.insert(key, fresh.clone());
                    fresh
                }
            };
            apply_lookup(&mut record, &lookup);
            self.repo.update(&record).await?;
            results.push(result_for(&record, &lookup));
        }
        Ok(results)
    }

    /// Check every host; hosts run concurrently, a failing host is logged
    /// and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the host inventory cannot be read.
    pub async fn check_all(self: &Arc<Self>) -> Result<Vec<UpdateCheckResult>> {
        let hosts = self.hosts.list()?;
        let mut set = tokio::task::JoinSet::new();
        for host in hosts {
            let this = Arc::clone(self);
            set.spawn(async move {
                let res = this.check_host(&host.id).await;
                (host.id, res)
            });
        }
        let mut all = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(results))) => all.extend(results),
                Ok((host_id, Err(e))) => warn!(%host_id, error = %e, "update check failed"),
                Err(e) => warn!(error = %e, "update check task panicked"),
            }
        }
        all.sort_by(|a, b| (&a.host_id, &a.name).cmp(&(&b.host_id, &b.name)));
        Ok(all)
    }
}

/// Fold a lookup into the record.
pub fn apply_lookup(record: &mut ContainerRecord, lookup: &DigestLookup) {
    let now = Utc::now();
    record.update_checked_at = Some(now);
    record.updated_at = now;
    if let Some(remote) = &lookup.digest {
        let mut local: Vec<String> = record.repo_digests.clone();
        local.extend(record.repo_digest.clone());
        let current = digest_matches(remote, &local)
            || lookup
                .index_digest
                .as_deref()
                .is_some_and(|index| digest_matches(index, &local));
        record.update_available = !current;
        record.remote_digest = Some(remote.clone());
    }
}

fn result_for(record: &ContainerRecord, lookup: &DigestLookup) -> UpdateCheckResult {
    UpdateCheckResult {
        host_id: record.host_id.clone(),
        container_id: record.container_id.clone(),
        name: record.name.clone(),
        image: record.image_ref(),
        update_available: record.update_available,
        remote_digest: record.remote_digest.clone(),
        error: lookup.error.clone(),
        rate_limited: lookup.rate_limited,
    }
}
