//! Symmetric encryption for the local store.
//!
//! AES-256-GCM for encrypting entity collections at rest. The per-install
//! key lives unencrypted beside the data it protects: this holds against
//! casual inspection of individual blobs only, never against an attacker
//! with full storage access, and callers must not treat it as a substitute
//! for server-side secret management.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};

use rand::rngs::OsRng;
use rand::TryRngCore;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;

use std::fs;
use std::path::Path;

use crate::errors::{SyncError, SyncResult};

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;

/// GCM nonce size in bytes (96-bit).
pub const NONCE_SIZE: usize = 12;

/// Generate a new random 256-bit key.
pub fn generate_key() -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    let mut rng = OsRng;

    // If OsRng fails here, the environment is badly broken → hard panic is acceptable.
    rng.try_fill_bytes(&mut key)
        .expect("OsRng failed to generate encryption key");

    key
}

/// Load the per-install key from `path`, generating and persisting one on
/// first use. The key file is hex-encoded.
pub fn load_or_create_key(path: &Path) -> SyncResult<[u8; KEY_SIZE]> {
    if path.exists() {
        let hex_key = fs::read_to_string(path)?;
        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| SyncError::DecryptionError(format!("invalid key file: {e}")))?;
        if bytes.len() != KEY_SIZE {
            return Err(SyncError::DecryptionError(format!(
                "invalid key length in key file: expected {} bytes, got {}",
                KEY_SIZE,
                bytes.len()
            )));
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&bytes);
        return Ok(key);
    }

    let key = generate_key();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, hex::encode(key))?;
    Ok(key)
}

/// Encrypt arbitrary bytes using AES-256-GCM.
///
/// Output format:
///   [nonce (12 bytes)] || [ciphertext+tag]
pub fn encrypt_bytes(plaintext: &[u8], key: &[u8]) -> SyncResult<Vec<u8>> {
    if key.len() != KEY_SIZE {
        return Err(SyncError::EncryptionError(format!(
            "invalid key length: expected {} bytes, got {}",
            KEY_SIZE,
            key.len()
        )));
    }

    let key = Key::<Aes256Gcm>::from_slice(key);
    let cipher = Aes256Gcm::new(key);

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    let mut rng = OsRng;
    rng.try_fill_bytes(&mut nonce_bytes)
        .expect("OsRng failed to generate nonce");
    let nonce = Nonce::from_slice(&nonce_bytes);

    let mut ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| SyncError::EncryptionError(format!("encryption failed: {e}")))?;

    let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    output.extend_from_slice(&nonce_bytes);
    output.append(&mut ciphertext);

    Ok(output)
}

/// Decrypt bytes produced by `encrypt_bytes`.
pub fn decrypt_bytes(ciphertext: &[u8], key: &[u8]) -> SyncResult<Vec<u8>> {
    if key.len() != KEY_SIZE {
        return Err(SyncError::DecryptionError(format!(
            "invalid key length: expected {} bytes, got {}",
            KEY_SIZE,
            key.len()
        )));
    }

    if ciphertext.len() <= NONCE_SIZE {
        return Err(SyncError::DecryptionError(
            "ciphertext too short".to_string(),
        ));
    }

    let (nonce_bytes, ct) = ciphertext.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);

    let key = Key::<Aes256Gcm>::from_slice(key);
    let cipher = Aes256Gcm::new(key);

    let plaintext = cipher
        .decrypt(nonce, ct)
        .map_err(|e| SyncError::DecryptionError(format!("decryption failed: {e}")))?;

    Ok(plaintext)
}

/// Encrypt bytes and return a Base64 string.
pub fn encrypt_to_base64(plaintext: &[u8], key: &[u8]) -> SyncResult<String> {
    let encrypted = encrypt_bytes(plaintext, key)?;
    Ok(B64.encode(encrypted))
}

/// Decrypt a Base64 ciphertext previously produced by `encrypt_to_base64`.
pub fn decrypt_from_base64(ciphertext_b64: &str, key: &[u8]) -> SyncResult<Vec<u8>> {
    let decoded = B64
        .decode(ciphertext_b64.trim())
        .map_err(|e| SyncError::DecryptionError(format!("base64 decode failed: {e}")))?;
    decrypt_bytes(&decoded, key)
}
