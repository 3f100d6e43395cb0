//! Vault — AES-256-GCM encryption at rest for credential values.
//!
//! Secrets are encrypted with a randomly generated 256-bit key stored in
//! `~/.docpilot/vault.key`. The key file is created the first time a value
//! is encrypted; decryption never creates it.
//!
//! Encrypted values are prefixed with `vault:` followed by the base64-encoded
//! nonce + ciphertext. Plain values (without the prefix) pass through
//! unchanged, so a credentials file can mix both.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as B64, Engine};
use rand::RngCore;
use std::fs;
use std::path::{Path, PathBuf};

use super::CredentialError;

/// Prefix for encrypted values.
pub const VAULT_PREFIX: &str = "vault:";

/// Length of AES-256-GCM nonce (96 bits).
const NONCE_LEN: usize = 12;

/// Length of AES-256 key (256 bits).
const KEY_LEN: usize = 32;

/// Handle on a vault key file.
#[derive(Debug, Clone)]
pub struct Vault {
    key_path: PathBuf,
}

impl Vault {
    pub fn new(key_path: impl Into<PathBuf>) -> Self {
        Self {
            key_path: key_path.into(),
        }
    }

    /// `~/.docpilot/vault.key`
    pub fn default_location() -> Self {
        Self::new(
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".docpilot")
                .join("vault.key"),
        )
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    fn read_key(&self) -> Result<[u8; KEY_LEN], CredentialError> {
        let data = fs::read(&self.key_path).map_err(|e| CredentialError::Vault(format!(
            "cannot read {}: {}",
            self.key_path.display(),
            e
        )))?;
        if data.len() != KEY_LEN {
            return Err(CredentialError::Vault(format!(
                "vault.key has invalid length: {} (expected {})",
                data.len(),
                KEY_LEN
            )));
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&data);
        Ok(key)
    }

    fn load_or_create_key(&self) -> Result<[u8; KEY_LEN], CredentialError> {
        if self.key_path.exists() {
            return self.read_key();
        }

        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);

        if let Some(parent) = self.key_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.key_path, key)?;
        tracing::info!("Generated new vault key at {}", self.key_path.display());

        Ok(key)
    }

    /// Encrypt a plaintext secret and return a `vault:...` string for storage.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CredentialError> {
        let key = self.load_or_create_key()?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| CredentialError::Vault(format!("cipher init: {}", e)))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        #[allow(deprecated)]
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| CredentialError::Vault(format!("encrypt: {}", e)))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(format!("{}{}", VAULT_PREFIX, B64.encode(&combined)))
    }

    /// Decrypt a `vault:...` string. Values without the prefix are returned as-is.
    pub fn decrypt(&self, value: &str) -> Result<String, CredentialError> {
        let Some(encoded) = value.strip_prefix(VAULT_PREFIX) else {
            return Ok(value.to_string());
        };

        let combined = B64
            .decode(encoded)
            .map_err(|e| CredentialError::Vault(format!("base64 decode: {}", e)))?;

        if combined.len() < NONCE_LEN {
            return Err(CredentialError::Vault("encrypted value too short".into()));
        }

        let key = self.read_key()?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| CredentialError::Vault(format!("cipher init: {}", e)))?;

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        #[allow(deprecated)]
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| CredentialError::Vault(format!("decrypt: {} (wrong vault.key?)", e)))?;

        String::from_utf8(plaintext)
            .map_err(|e| CredentialError::Vault(format!("utf8 decode: {}", e)))
    }
}

/// Returns `true` if the value looks like a vault-encrypted string.
pub fn is_encrypted(value: &str) -> bool {
    value.starts_with(VAULT_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_vault() -> (tempfile::TempDir, Vault) {
        let dir = tempfile::tempdir().unwrap();
        let vault = Vault::new(dir.path().join("vault.key"));
        (dir, vault)
    }

    #[test]
    fn test_roundtrip() {
        let (_dir, vault) = temp_vault();
        let secret = "pat_super_secret_1234567890";
        let encrypted = vault.encrypt(secret).unwrap();
        assert!(is_encrypted(&encrypted));
        assert_ne!(encrypted, secret);
        assert_eq!(vault.decrypt(&encrypted).unwrap(), secret);
    }

    #[test]
    fn test_plaintext_passthrough() {
        let (_dir, vault) = temp_vault();
        assert_eq!(vault.decrypt("gsk_plain").unwrap(), "gsk_plain");
        assert!(!vault.key_path().exists());
    }

    #[test]
    fn test_decrypt_without_key_fails() {
        let (_dir, vault) = temp_vault();
        let err = vault.decrypt("vault:AAAAAAAAAAAAAAAAAAAAAAAA").unwrap_err();
        assert!(matches!(err, CredentialError::Vault(_)));
    }

    #[test]
    fn test_wrong_key_fails() {
        let (_dir_a, a) = temp_vault();
        let (_dir_b, b) = temp_vault();
        let encrypted = a.encrypt("same-secret").unwrap();
        b.encrypt("bootstrap").unwrap();
        assert!(b.decrypt(&encrypted).is_err());
    }
}
