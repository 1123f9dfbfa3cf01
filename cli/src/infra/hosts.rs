//! Infrastructure implementation of the `HostDirectory` port.
//!
//! The inventory is a YAML file (`hosts.yaml`) maintained by the operator:
//!
//! ```yaml
//! hosts:
//!   - id: web-1
//!     address: 10.0.0.5
//!     user: deploy
//!     tags: [edge]
//!     auth:
//!       private_key: "v1:..."
//! ```

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use dockhand_common::Host;

use crate::application::ports::HostDirectory;
use crate::domain::error::HostError;
use crate::infra::paths::data_file;

/// Overrides the inventory path.
pub const HOSTS_ENV: &str = "DOCKHAND_HOSTS";

#[derive(Debug, Default, Deserialize)]
struct Inventory {
    #[serde(default)]
    hosts: Vec<Host>,
}

/// Read-only host inventory, re-read on every call.
#[derive(Default)]
pub struct YamlHostDirectory {
    path: Option<PathBuf>,
}

impl YamlHostDirectory {
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    /// Inventory file location.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(p) => Ok(p.clone()),
            None => data_file(HOSTS_ENV, "hosts.yaml"),
        }
    }
}

impl HostDirectory for YamlHostDirectory {
    fn list(&self) -> Result<Vec<Host>> {
        let path = self.path()?;
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let inventory: Inventory = if content.trim().is_empty() {
            Inventory::default()
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("cannot parse {}", path.display()))?
        };
        validate(&inventory.hosts)?;
        Ok(inventory.hosts)
    }

    fn get(&self, id: &str) -> Result<Host> {
        self.list()?
            .into_iter()
            .find(|h| h.id == id)
            .ok_or_else(|| HostError::NotFound(id.to_string()).into())
    }
}

fn validate(hosts: &[Host]) -> Result<(), HostError> {
    let mut seen = HashSet::new();
    for host in hosts {
        if !seen.insert(host.id.as_str()) {
            return Err(HostError::DuplicateId(host.id.clone()));
        }
        let address = host.address.trim();
        if address.is_empty() || address.starts_with('-') || address.contains(char::is_whitespace) {
            return Err(HostError::InvalidAddress {
                id: host.id.clone(),
                address: host.address.clone(),
            });
        }
    }
    Ok(())
}
