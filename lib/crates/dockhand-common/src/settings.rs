use std::ops::RangeInclusive;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const SSH_CONCURRENCY_RANGE: RangeInclusive<usize> = 10..=100;
pub const COMMAND_TIMEOUT_RANGE: RangeInclusive<u64> = 10..=900;

/// Operator tunables stored in `~/.dockhand/settings.yaml`.
///
/// Read fresh on every call that depends on them so that edits take effect
/// for the next command without restarting anything.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Worker pool size for fleet tasks.
    pub ssh_concurrency: usize,
    /// Hard kill timeout for a single remote command, in seconds.
    pub command_timeout_secs: u64,
    /// SSH handshake timeout, in seconds.
    pub connect_timeout_secs: u64,
    pub proxy: ProxySettings,
    pub registry: RegistrySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ssh_concurrency: 30,
            command_timeout_secs: 100,
            connect_timeout_secs: 10,
            proxy: ProxySettings::default(),
            registry: RegistrySettings::default(),
        }
    }
}

impl Settings {
    /// Concurrency clamped to the supported range.
    #[must_use]
    pub fn effective_concurrency(&self) -> usize {
        self.ssh_concurrency
            .clamp(*SSH_CONCURRENCY_RANGE.start(), *SSH_CONCURRENCY_RANGE.end())
    }

    /// Kill-after timeout clamped to the supported range.
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(
            self.command_timeout_secs
                .clamp(*COMMAND_TIMEOUT_RANGE.start(), *COMMAND_TIMEOUT_RANGE.end()),
        )
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }
}

/// HTTP(S) proxy injected into registry-bound docker commands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ProxySettings {
    pub enabled: bool,
    pub http: Option<String>,
    pub https: Option<String>,
    pub no_proxy: Option<String>,
    /// Only inject the proxy for hosts with role `local` or tagged `local`.
    pub local_only: bool,
}

/// Credentials used for `docker login` before registry-bound commands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct RegistrySettings {
    pub enabled: bool,
    /// Registry host; empty means Docker Hub.
    pub server: Option<String>,
    pub username: Option<String>,
    /// Secret-store ciphertext (or legacy plaintext).
    pub password: Option<String>,
}
