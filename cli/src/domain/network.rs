//! Classification of docker/registry failures and the retry schedule for
//! transient network errors.

use std::time::Duration;

/// Lower-case stderr fragments that mark a failure as transient.
pub const NETWORK_ERROR_SIGNATURES: &[&str] = &[
    "eof",
    "connection reset",
    "connection refused",
    "timeout",
    "timed out",
    "network is unreachable",
    "no route to host",
    "no such host",
    "temporary failure in name resolution",
    "server misbehaving",
    "unable to reach registry",
];

const RATE_LIMIT_SIGNATURES: &[&str] = &["toomanyrequests", "too many requests"];

/// Docker sub-commands that talk to a registry. Two-word entries match the
/// first two arguments.
pub const NETWORK_SUBCOMMANDS: &[&[&str]] = &[
    &["pull"],
    &["push"],
    &["search"],
    &["login"],
    &["logout"],
    &["manifest", "inspect"],
    &["buildx", "imagetools"],
];

/// Whether `stderr` matches a transient network failure.
///
/// `EOF` only counts as a whole word so that image names like `geofence`
/// do not trigger retries.
#[must_use]
pub fn is_network_error(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    NETWORK_ERROR_SIGNATURES.iter().any(|sig| {
        if *sig == "eof" {
            lower
                .split(|c: char| !c.is_ascii_alphanumeric())
                .any(|word| word == "eof")
        } else {
            lower.contains(sig)
        }
    })
}

/// Whether `stderr` reports registry rate limiting.
#[must_use]
pub fn is_rate_limited(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    RATE_LIMIT_SIGNATURES.iter().any(|sig| lower.contains(sig))
}

/// Whether `docker <args>` needs registry access.
#[must_use]
pub fn needs_registry<S: AsRef<str>>(args: &[S]) -> bool {
    NETWORK_SUBCOMMANDS.iter().any(|pattern| {
        pattern.len() <= args.len()
            && pattern
                .iter()
                .zip(args)
                .all(|(want, got)| *want == got.as_ref())
    })
}

/// Exponential backoff for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base: Duration,
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base: Duration::from_secs(1),
            max: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based): `base * 2^retry`, capped.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base.saturating_mul(factor).min(self.max)
    }
}
