//! At-rest token wrapping using AES-256-GCM.
//!
//! The vault sees opaque strings; it knows nothing about token semantics.
//! The key is derived deterministically from the deployment secret
//! (SHA-256, yielding the 32-byte AES key), and the wrap format is
//! self-describing: the algorithm tag and nonce travel with the
//! ciphertext so the key or algorithm can be rotated later.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use calbridge_domain::{CalbridgeError, Result};

const ALGORITHM: &str = "AES-256-GCM";
const NONCE_LEN: usize = 12;

/// Serializable wrapped-credential container.
///
/// GCM appends the authentication tag to `ciphertext`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrappedPayload {
    pub algorithm: String,
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

/// AES-256-GCM vault with a secret-derived key.
pub struct TokenVault {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for TokenVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVault").field("key", &"[REDACTED]").finish()
    }
}

impl TokenVault {
    /// Derive the vault key from the deployment secret.
    pub fn from_secret(secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(CalbridgeError::Config("vault secret must not be empty".to_string()));
        }

        let key = Sha256::digest(secret.as_bytes());
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| CalbridgeError::Security(format!("failed to build cipher: {e}")))?;

        Ok(Self { cipher })
    }

    /// Wrap a plaintext credential into a base64 payload.
    pub fn wrap(&self, plaintext: &str) -> Result<String> {
        let nonce_bytes = Self::generate_nonce();
        let ciphertext = self
            .cipher
            .encrypt(&Nonce::from(nonce_bytes), plaintext.as_bytes())
            .map_err(|e| CalbridgeError::Security(format!("encryption failed: {e}")))?;

        let payload = WrappedPayload {
            algorithm: ALGORITHM.to_string(),
            nonce: nonce_bytes.to_vec(),
            ciphertext,
        };

        let serialized = serde_json::to_vec(&payload)
            .map_err(|e| CalbridgeError::Security(format!("payload serialization failed: {e}")))?;

        Ok(BASE64.encode(serialized))
    }

    /// Unwrap a base64 payload back into the plaintext credential.
    pub fn unwrap(&self, wrapped: &str) -> Result<String> {
        let decoded = BASE64
            .decode(wrapped)
            .map_err(|e| CalbridgeError::Security(format!("base64 decode failed: {e}")))?;

        let payload: WrappedPayload = serde_json::from_slice(&decoded)
            .map_err(|e| CalbridgeError::Security(format!("payload parse failed: {e}")))?;

        if payload.algorithm != ALGORITHM {
            return Err(CalbridgeError::Security(format!(
                "unsupported wrap algorithm: {}",
                payload.algorithm
            )));
        }

        if payload.nonce.len() != NONCE_LEN {
            return Err(CalbridgeError::Security(
                "invalid nonce length for AES-256-GCM payload".to_string(),
            ));
        }

        let nonce: [u8; NONCE_LEN] = payload
            .nonce
            .as_slice()
            .try_into()
            .map_err(|_| CalbridgeError::Security("nonce must be exactly 12 bytes".to_string()))?;

        let plaintext = self
            .cipher
            .decrypt(&Nonce::from(nonce), payload.ciphertext.as_ref())
            .map_err(|e| CalbridgeError::Security(format!("decryption failed: {e}")))?;

        String::from_utf8(plaintext)
            .map_err(|e| CalbridgeError::Security(format!("invalid UTF-8 in plaintext: {e}")))
    }

    fn generate_nonce() -> [u8; NONCE_LEN] {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        nonce
    }
}
