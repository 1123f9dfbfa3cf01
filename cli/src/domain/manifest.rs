//! Registry manifest parsing and digest normalization.
//!
//! Three tools report digests in three shapes: `docker manifest inspect`
//! (manifest list or single manifest), `docker buildx imagetools inspect`
//! (raw JSON or a human summary) and the throwaway inspector container
//! (`{"Digest": ...}`). Everything is reduced to a bare `sha256:<hex>` here.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use dockhand_common::Platform;

static DIGEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"sha256:[0-9a-f]{64}").unwrap_or_else(|_| unreachable!("static regex"))
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManifestError {
    #[error("manifest is not valid JSON: {0}")]
    Json(String),
    #[error("manifest contains no digest")]
    NoDigest,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDoc {
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub manifests: Option<Vec<ManifestEntry>>,
    #[serde(default)]
    pub config: Option<Descriptor>,
    #[serde(default)]
    pub digest: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    pub digest: String,
    #[serde(default)]
    pub platform: Option<ManifestPlatform>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ManifestPlatform {
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub variant: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Descriptor {
    pub digest: String,
}

impl ManifestPlatform {
    fn is_known(&self) -> bool {
        !self.architecture.is_empty()
            && self.architecture != "unknown"
            && !self.os.is_empty()
            && self.os != "unknown"
    }

    fn matches(&self, target: &Platform) -> bool {
        self.architecture == target.architecture && self.os == target.os
    }
}

fn parse_doc(json: &str) -> Result<ManifestDoc, ManifestError> {
    serde_json::from_str(json.trim()).map_err(|e| ManifestError::Json(e.to_string()))
}

/// Digest from `docker manifest inspect` output for the target platform.
///
/// Manifest list: exact platform match (variant-exact preferred), else the
/// first entry with a known platform, else the first entry. Single manifest:
/// its config digest.
///
/// # Errors
///
/// Returns an error when the text is not JSON or holds no usable digest.
pub fn select_manifest_digest(json: &str, target: &Platform) -> Result<String, ManifestError> {
    let doc = parse_doc(json)?;
    if let Some(entries) = doc.manifests.as_deref().filter(|m| !m.is_empty()) {
        let platform_of = |e: &ManifestEntry| e.platform.clone().unwrap_or_default();
        let exact: Vec<&ManifestEntry> = entries
            .iter()
            .filter(|e| platform_of(e).matches(target))
            .collect();
        let chosen = exact
            .iter()
            .find(|e| platform_of(e).variant == target.variant)
            .or_else(|| exact.first())
            .copied()
            .or_else(|| entries.iter().find(|e| platform_of(e).is_known()))
            .unwrap_or(&entries[0]);
        return Ok(chosen.digest.clone());
    }
    doc.config
        .map(|c| c.digest)
        .filter(|d| !d.is_empty())
        .ok_or(ManifestError::NoDigest)
}

/// Digest from `buildx imagetools inspect` output.
///
/// Raw JSON: `config.digest`, else the first `manifests[].digest`, else a
/// top-level `digest`. Non-JSON summaries: the `Digest:` line.
///
/// # Errors
///
/// Returns an error when no digest can be found.
pub fn imagetools_digest(output: &str) -> Result<String, ManifestError> {
    if let Ok(doc) = parse_doc(output) {
        if let Some(d) = doc.config.map(|c| c.digest).filter(|d| !d.is_empty()) {
            return Ok(d);
        }
        if let Some(d) = doc
            .manifests
            .and_then(|m| m.into_iter().next())
            .map(|e| e.digest)
        {
            return Ok(d);
        }
        return doc.digest.ok_or(ManifestError::NoDigest);
    }
    summary_digest(output)
}

/// The `Digest:` line of a plain `buildx imagetools inspect` summary. For a
/// manifest list this is the index digest that `RepoDigests` records.
///
/// # Errors
///
/// Returns an error when the summary has no `Digest:` line.
pub fn summary_digest(output: &str) -> Result<String, ManifestError> {
    output
        .lines()
        .find_map(|l| l.trim().strip_prefix("Digest:"))
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .ok_or(ManifestError::NoDigest)
}

/// Whether registry JSON is a manifest list (image index).
#[must_use]
pub fn is_manifest_list(json: &str) -> bool {
    parse_doc(json).is_ok_and(|doc| doc.manifests.is_some_and(|m| !m.is_empty()))
}

#[derive(Deserialize)]
struct InspectorOutput {
    #[serde(rename = "Digest")]
    digest: String,
}

/// Digest from the throwaway inspector container's JSON.
///
/// # Errors
///
/// Returns an error when the output has no `Digest` field.
pub fn inspector_digest(output: &str) -> Result<String, ManifestError> {
    let parsed: InspectorOutput =
        serde_json::from_str(output.trim()).map_err(|e| ManifestError::Json(e.to_string()))?;
    Some(parsed.digest)
        .filter(|d| !d.is_empty())
        .ok_or(ManifestError::NoDigest)
}

/// Reduce any digest form (`repo@sha256:...`, upper-case hex, padded) to
/// `sha256:<64 lowercase hex>`.
#[must_use]
pub fn normalize_digest(raw: &str) -> Option<String> {
    let lower = raw.trim().to_ascii_lowercase();
    let candidate = lower.rsplit('@').next().unwrap_or(&lower);
    DIGEST_RE.find(candidate).map(|m| m.as_str().to_string())
}

/// Whether `remote` is one of the digests the running image is known under.
///
/// `local` holds the running image ID plus every `RepoDigest`. A single
/// manifest's config digest matches the image ID; a manifest list's index
/// digest matches a `RepoDigest`.
#[must_use]
pub fn digest_matches(remote: &str, local: &[String]) -> bool {
    let Some(remote) = normalize_digest(remote) else {
        return false;
    };
    local
        .iter()
        .filter_map(|d| normalize_digest(d))
        .any(|d| d == remote)
}
