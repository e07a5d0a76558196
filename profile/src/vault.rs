//! Credential sealing.
//!
//! Venue API keys are encrypted with AES-256-GCM before persistence. The
//! data key is derived from the configured `encryption_key_ref` with
//! SHA-256; the random 96-bit nonce is prepended to each ciphertext blob.
//! Plaintext exists only in memory, inside this module.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("ciphertext too short or malformed")]
    Malformed,

    #[error("decryption failed; wrong key or corrupted blob")]
    Unsealable,

    #[error("credential serialization failed: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Plaintext venue credential as held in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueCredential {
    pub api_key: String,
    pub api_secret: String,
    /// Some venues need a passphrase alongside key and secret.
    pub passphrase: Option<String>,
}

pub struct CredentialVault {
    cipher: Aes256Gcm,
}

impl CredentialVault {
    /// Derive the sealing key from an opaque key reference.
    pub fn new(encryption_key_ref: &str) -> Self {
        let digest = Sha256::digest(encryption_key_ref.as_bytes());
        let cipher = Aes256Gcm::new_from_slice(&digest).expect("sha256 digest is a valid key");
        Self { cipher }
    }

    pub fn seal(&self, credential: &VenueCredential) -> Result<Vec<u8>, VaultError> {
        let plaintext = serde_json::to_vec(credential)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_slice())
            .map_err(|_| VaultError::Unsealable)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    pub fn unseal(&self, blob: &[u8]) -> Result<VenueCredential, VaultError> {
        if blob.len() <= NONCE_LEN {
            return Err(VaultError::Malformed);
        }

        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| VaultError::Unsealable)?;

        Ok(serde_json::from_slice(&plaintext)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cred() -> VenueCredential {
        VenueCredential {
            api_key: "key-123".into(),
            api_secret: "secret-456".into(),
            passphrase: Some("phrase".into()),
        }
    }

    #[test]
    fn seal_unseal_round_trip() {
        let vault = CredentialVault::new("kms://test-ref");
        let blob = vault.seal(&cred()).unwrap();

        assert_ne!(blob, serde_json::to_vec(&cred()).unwrap());
        assert_eq!(vault.unseal(&blob).unwrap(), cred());
    }

    #[test]
    fn nonces_differ_between_seals() {
        let vault = CredentialVault::new("kms://test-ref");
        let a = vault.seal(&cred()).unwrap();
        let b = vault.seal(&cred()).unwrap();
        assert_ne!(a, b, "same plaintext must never produce the same blob");
    }

    #[test]
    fn wrong_key_cannot_unseal() {
        let vault = CredentialVault::new("kms://ref-a");
        let other = CredentialVault::new("kms://ref-b");

        let blob = vault.seal(&cred()).unwrap();
        assert!(matches!(other.unseal(&blob), Err(VaultError::Unsealable)));
    }

    #[test]
    fn truncated_blob_is_malformed() {
        let vault = CredentialVault::new("kms://test-ref");
        assert!(matches!(vault.unseal(&[0u8; 8]), Err(VaultError::Malformed)));
    }

    #[test]
    fn plaintext_never_appears_in_blob() {
        let vault = CredentialVault::new("kms://test-ref");
        let blob = vault.seal(&cred()).unwrap();
        let haystack = String::from_utf8_lossy(&blob);
        assert!(!haystack.contains("secret-456"));
    }
}
