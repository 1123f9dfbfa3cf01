//! Duplicate detection over container records.
//!
//! Two rules, applied in order:
//! 1. ID rule: rows on one host whose IDs share the 12-char short form are
//!    the same container; the most recently created row survives and takes
//!    the full 64-hex ID if any sibling carried it.
//! 2. Name rule: rows on one host with the same name keep the latest
//!    `started_at` (`created_at` for never-started rows).

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};

use dockhand_common::{ContainerRecord, short_id};

/// Row mutations needed to restore the uniqueness invariants.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DedupPlan {
    /// Row ids to delete.
    pub delete: Vec<u64>,
    /// Surviving rows whose `container_id` should become the full ID.
    pub promote: Vec<(u64, String)>,
}

fn newest_by<F>(rows: &[&ContainerRecord], key: F) -> u64
where
    F: Fn(&ContainerRecord) -> DateTime<Utc>,
{
    rows.iter()
        .max_by(|a, b| key(a).cmp(&key(b)).then(a.row_id.cmp(&b.row_id)))
        .map_or(0, |r| r.row_id)
}

/// Plan for the ID rule.
#[must_use]
pub fn plan_id_dedup(records: &[ContainerRecord]) -> DedupPlan {
    let mut groups: BTreeMap<(&str, &str), Vec<&ContainerRecord>> = BTreeMap::new();
    for r in records {
        groups
            .entry((r.host_id.as_str(), short_id(&r.container_id)))
            .or_default()
            .push(r);
    }
    let mut plan = DedupPlan::default();
    for rows in groups.values().filter(|rows| rows.len() > 1) {
        let keep = newest_by(rows, |r| r.created_at);
        plan.delete
            .extend(rows.iter().map(|r| r.row_id).filter(|id| *id != keep));
        let full = rows
            .iter()
            .map(|r| r.container_id.as_str())
            .max_by_key(|id| id.len());
        if let Some(full) = full {
            let kept_id = rows
                .iter()
                .find(|r| r.row_id == keep)
                .map(|r| r.container_id.as_str());
            if kept_id.is_some_and(|k| k.len() < full.len()) {
                plan.promote.push((keep, full.to_string()));
            }
        }
    }
    plan
}

/// Plan for the name rule.
#[must_use]
pub fn plan_name_dedup(records: &[ContainerRecord]) -> DedupPlan {
    let mut groups: BTreeMap<(&str, &str), Vec<&ContainerRecord>> = BTreeMap::new();
    for r in records.iter().filter(|r| !r.name.is_empty()) {
        groups
            .entry((r.host_id.as_str(), r.name.as_str()))
            .or_default()
            .push(r);
    }
    let mut plan = DedupPlan::default();
    for rows in groups.values().filter(|rows| rows.len() > 1) {
        let keep = newest_by(rows, |r| r.started_at.unwrap_or(r.created_at));
        plan.delete
            .extend(rows.iter().map(|r| r.row_id).filter(|id| *id != keep));
    }
    plan
}

/// Both rules; the name rule sees the records that survive the ID rule.
#[must_use]
pub fn plan_dedup(records: &[ContainerRecord]) -> DedupPlan {
    let mut plan = plan_id_dedup(records);
    let gone: HashSet<u64> = plan.delete.iter().copied().collect();
    let survivors: Vec<ContainerRecord> = records
        .iter()
        .filter(|r| !gone.contains(&r.row_id))
        .cloned()
        .collect();
    let by_name = plan_name_dedup(&survivors);
    plan.promote.retain(|(row, _)| !by_name.delete.contains(row));
    plan.delete.extend(by_name.delete);
    plan.delete.sort_unstable();
    plan
}
