//! Infrastructure implementation of the `SecretStore` port.
//!
//! Ciphertext format: `v1:<iv>:<tag>:<payload>`, each segment standard
//! base64, AES-256-GCM with a 12-byte IV and 16-byte tag. Values without the
//! `v1:` prefix are legacy plaintext and pass through unchanged.

use aes_gcm::aead::{Aead, AeadCore, OsRng};
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use anyhow::Result;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use tracing::warn;

use crate::application::ports::SecretStore;
use crate::domain::error::SecretError;

/// Environment variable holding the base64 32-byte key.
pub const SECRET_KEY_ENV: &str = "DOCKHAND_SECRET_KEY";

const PREFIX: &str = "v1:";
const KEY_SIZE: usize = 32;
const IV_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

pub struct AesGcmSecretStore {
    key: Option<[u8; KEY_SIZE]>,
}

impl AesGcmSecretStore {
    /// Store keyed from [`SECRET_KEY_ENV`]. Without the variable only legacy
    /// plaintext can be read and nothing can be encrypted.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable is set but is not 32 bytes of base64.
    pub fn from_env() -> Result<Self> {
        match std::env::var(SECRET_KEY_ENV) {
            Ok(value) if !value.trim().is_empty() => Ok(Self::with_key(&decode_key(&value)?)),
            _ => Ok(Self { key: None }),
        }
    }

    #[must_use]
    pub fn with_key(key: &[u8; KEY_SIZE]) -> Self {
        Self { key: Some(*key) }
    }

    fn cipher(&self) -> Result<Aes256Gcm, SecretError> {
        let key = self.key.as_ref().ok_or(SecretError::MissingKey)?;
        Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)))
    }

    fn open(&self, value: &str) -> Result<String, SecretError> {
        let body = value.strip_prefix(PREFIX).ok_or(SecretError::Malformed)?;
        let mut parts = body.split(':');
        let (Some(iv), Some(tag), Some(payload), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(SecretError::Malformed);
        };
        let iv = BASE64.decode(iv).map_err(|_| SecretError::Malformed)?;
        let tag = BASE64.decode(tag).map_err(|_| SecretError::Malformed)?;
        let mut sealed = BASE64.decode(payload).map_err(|_| SecretError::Malformed)?;
        if iv.len() != IV_SIZE || tag.len() != TAG_SIZE {
            return Err(SecretError::Malformed);
        }
        sealed.extend_from_slice(&tag);
        let plain = self
            .cipher()?
            .decrypt(Nonce::from_slice(&iv), sealed.as_slice())
            .map_err(|_| SecretError::Authentication)?;
        String::from_utf8(plain).map_err(|_| SecretError::Malformed)
    }
}

impl SecretStore for AesGcmSecretStore {
    fn decrypt(&self, value: &str) -> Option<String> {
        if !value.starts_with(PREFIX) {
            return Some(value.to_string());
        }
        match self.open(value) {
            Ok(plain) => Some(plain),
            Err(e) => {
                warn!(error = %e, "cannot decrypt secret");
                None
            }
        }
    }

    fn encrypt(&self, plaintext: &str) -> Result<String> {
        let cipher = self.cipher()?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| SecretError::Authentication)?;
        // aes-gcm appends the tag to the ciphertext.
        let (payload, tag) = sealed.split_at(sealed.len() - TAG_SIZE);
        Ok(format!(
            "{PREFIX}{}:{}:{}",
            BASE64.encode(nonce),
            BASE64.encode(tag),
            BASE64.encode(payload)
        ))
    }
}

fn decode_key(value: &str) -> Result<[u8; KEY_SIZE], SecretError> {
    let bytes = BASE64
        .decode(value.trim())
        .map_err(|_| SecretError::InvalidKey)?;
    bytes.try_into().map_err(|_| SecretError::InvalidKey)
}
