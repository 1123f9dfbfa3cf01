//! Application service — decrypt host credentials at use time.

use anyhow::Result;

use dockhand_common::Host;

use crate::application::ports::{Credentials, SecretStore};
use crate::domain::error::HostError;

/// Decrypt the auth material of `host`.
///
/// # Errors
///
/// Returns `HostError::Credential` naming the field that failed to decrypt.
pub fn resolve_credentials(host: &Host, secrets: &dyn SecretStore) -> Result<Credentials> {
    let decrypt = |value: &Option<String>, field: &'static str| -> Result<Option<String>> {
        match value.as_deref().filter(|v| !v.is_empty()) {
            None => Ok(None),
            Some(v) => secrets.decrypt(v).map(Some).ok_or_else(|| {
                HostError::Credential {
                    id: host.id.clone(),
                    field,
                }
                .into()
            }),
        }
    };
    Ok(Credentials {
        password: decrypt(&host.auth.password, "password")?,
        private_key: decrypt(&host.auth.private_key, "private key")?,
        passphrase: decrypt(&host.auth.passphrase, "passphrase")?,
    })
}
