//! `docker ps -a` table parsing.
//!
//! The default table format has free-text columns (COMMAND, CREATED, STATUS)
//! whose width varies between Docker versions, so the parser works on
//! whitespace tokens instead of column offsets: first token is the ID, last
//! token is the name, and the status is recovered by keyword.

use dockhand_common::{STATE_EXITED, STATE_RUNNING};

const STATUS_KEYWORDS: &[&str] = &["Up", "Exited", "Created", "Restarting", "Paused", "Dead", "Removal"];

/// One container row recovered from `docker ps -a`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsEntry {
    /// ID as printed (normally the 12-char short form).
    pub id: String,
    pub name: String,
    /// Human status such as `Up 2 hours (healthy)`; `unknown` from the fallback parse.
    pub status: String,
    /// `running` iff the status contains `Up`, else `exited`.
    pub state: String,
}

/// Result of scanning a full `ps` output.
#[derive(Debug, Default)]
pub struct PsScan {
    pub entries: Vec<PsEntry>,
    /// Lines that could not be parsed at all.
    pub rejected: Vec<String>,
}

/// Parse a whole `docker ps -a` output. Never fails as a whole: lines that
/// cannot be parsed are collected in [`PsScan::rejected`].
#[must_use]
pub fn parse_ps_output(text: &str) -> PsScan {
    let mut scan = PsScan::default();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("CONTAINER ID") {
            continue;
        }
        match parse_ps_line(trimmed).or_else(|| parse_minimal(trimmed)) {
            Some(entry) => scan.entries.push(entry),
            None => scan.rejected.push(trimmed.to_string()),
        }
    }
    scan
}

/// Primary heuristic parse of one data line.
#[must_use]
pub fn parse_ps_line(line: &str) -> Option<PsEntry> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 3 || !looks_like_id(tokens[0]) {
        return None;
    }
    let last = tokens.len() - 1;
    let start = (1..last).find(|&i| STATUS_KEYWORDS.contains(&tokens[i]))?;
    let end = (start + 1..last)
        .find(|&i| looks_like_port(tokens[i]))
        .unwrap_or(last);
    let status = tokens[start..end].join(" ");
    Some(PsEntry {
        id: tokens[0].to_string(),
        name: tokens[last].to_string(),
        state: state_for_status(&status).to_string(),
        status,
    })
}

/// Two-token fallback: ID and name only.
fn parse_minimal(line: &str) -> Option<PsEntry> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 2 || !looks_like_id(tokens[0]) {
        return None;
    }
    Some(PsEntry {
        id: tokens[0].to_string(),
        name: tokens[tokens.len() - 1].to_string(),
        status: "unknown".to_string(),
        state: STATE_EXITED.to_string(),
    })
}

#[must_use]
pub fn state_for_status(status: &str) -> &'static str {
    if status.split_whitespace().any(|t| t == "Up") {
        STATE_RUNNING
    } else {
        STATE_EXITED
    }
}

fn looks_like_id(token: &str) -> bool {
    token.len() >= 12 && token.chars().all(|c| c.is_ascii_hexdigit())
}

fn looks_like_port(token: &str) -> bool {
    let t = token.trim_end_matches(',');
    t.contains("->") || t.ends_with("/tcp") || t.ends_with("/udp") || t.ends_with("/sctp")
}
