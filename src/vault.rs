//! Vault for encrypted secrets in config and inventory values.
//!
//! Encrypted strings carry the literal prefix `$FORVAULT;` followed by
//! base64(nonce || ciphertext). The AES-256-GCM key is derived as
//! SHA-256(password). Strings without the prefix pass through `decrypt`
//! unchanged, so plain and encrypted values can be mixed freely.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::error::{Error, Result};

/// Prefix identifying vault-encrypted strings.
pub const VAULT_PREFIX: &str = "$FORVAULT;";

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Vault for encrypting and decrypting marked strings.
pub struct Vault {
    key: Key<Aes256Gcm>,
}

impl Vault {
    /// Create a vault from a password. The key is SHA-256 of the password
    /// bytes.
    pub fn new(password: impl AsRef<str>) -> Self {
        let digest = Sha256::digest(password.as_ref().as_bytes());
        Self {
            key: *Key::<Aes256Gcm>::from_slice(&digest),
        }
    }

    /// Encrypt plaintext into a vault token with a freshly drawn random
    /// nonce. Two encryptions of the same plaintext produce distinct tokens.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let cipher = Aes256Gcm::new(&self.key);
        let nonce_bytes: [u8; NONCE_LEN] = rand::random();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| Error::VaultEncrypt(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);

        Ok(format!("{}{}", VAULT_PREFIX, BASE64.encode(&sealed)))
    }

    /// Decrypt a vault token. Strings without the vault prefix are returned
    /// unchanged.
    pub fn decrypt(&self, value: &str) -> Result<String> {
        let Some(encoded) = value.strip_prefix(VAULT_PREFIX) else {
            return Ok(value.to_string());
        };

        let sealed = BASE64
            .decode(encoded)
            .map_err(|e| Error::VaultDecrypt(format!("corrupt base64: {}", e)))?;

        if sealed.len() < NONCE_LEN {
            return Err(Error::VaultDecrypt("ciphertext too short".into()));
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);

        let cipher = Aes256Gcm::new(&self.key);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| Error::VaultDecrypt("authentication failed - wrong password?".into()))?;

        String::from_utf8(plaintext)
            .map_err(|_| Error::VaultDecrypt("invalid UTF-8 in decrypted value".into()))
    }

    /// Decrypt every vault-encrypted value in the map in place.
    pub fn decrypt_map(&self, map: &mut IndexMap<String, String>) -> Result<()> {
        for (key, value) in map.iter_mut() {
            if is_encrypted(value) {
                *value = self
                    .decrypt(value)
                    .map_err(|e| Error::VaultDecrypt(format!("key {:?}: {}", key, e)))?;
            }
        }
        Ok(())
    }
}

/// Reports whether a string is vault-encrypted.
pub fn is_encrypted(value: &str) -> bool {
    value.starts_with(VAULT_PREFIX)
}

/// Read the vault password from a file, stripping surrounding whitespace.
pub fn load_password(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let data = std::fs::read_to_string(path).map_err(|e| Error::VaultPassword {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(data.trim().to_string())
}
