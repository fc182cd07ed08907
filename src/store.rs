//! Encrypted local store with versioned backups.
//!
//! Gives the facade a place to persist entity collections locally with
//! confidentiality at rest and corruption resilience, independent of the
//! remote gateway. One encrypted file per entity collection, plus timestamped
//! backup generations pruned to the most recent few.
//!
//! Failure semantics: write failures are caught, recorded as a security
//! event, and swallowed. This store is a cache/offline-tolerance layer, not a
//! system of record — the caller never sees a storage error.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::audit::{AuditLog, SecurityEventKind};
use crate::config::StorageConfig;
use crate::encryption::{decrypt_from_base64, encrypt_to_base64, load_or_create_key, KEY_SIZE};
use crate::errors::{SyncError, SyncResult};

/// File name of the per-install symmetric key, stored beside the data.
const KEY_FILE: &str = "store.key";

/// Extension for encrypted blobs.
const BLOB_EXT: &str = "enc";

/// Encrypted key/value persistence over a data directory.
pub struct SecureStore {
    data_dir: PathBuf,
    key: [u8; KEY_SIZE],
    backup_generations: usize,
    audit: Arc<AuditLog>,
}

impl SecureStore {
    /// Open (or initialize) the store under the configured data directory.
    ///
    /// Generates and persists the symmetric key on first use.
    pub fn open(config: &StorageConfig, audit: Arc<AuditLog>) -> SyncResult<Self> {
        let data_dir = PathBuf::from(&config.data_dir);
        fs::create_dir_all(&data_dir)?;
        let key = load_or_create_key(&data_dir.join(KEY_FILE))?;

        Ok(Self {
            data_dir,
            key,
            backup_generations: config.backup_generations,
            audit,
        })
    }

    /// Directory backing this store.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn primary_path(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.{BLOB_EXT}"))
    }

    fn backup_path(&self, key: &str, epoch_ms: i64) -> PathBuf {
        self.data_dir
            .join(format!("{key}_backup_{epoch_ms}.{BLOB_EXT}"))
    }

    /// Serialize, encrypt and persist `value` under `key`, writing a
    /// timestamped backup generation and pruning old ones.
    ///
    /// Failures are audited and swallowed.
    pub fn secure_set<T: Serialize>(&self, key: &str, value: &T) {
        if let Err(e) = self.try_set(key, value) {
            error!(key = %key, error = %e, "Encrypted store write failed");
            self.audit.record(
                SecurityEventKind::SecurityAlert,
                format!("store write failed for '{key}': {e}"),
            );
        }
    }

    fn try_set<T: Serialize>(&self, key: &str, value: &T) -> SyncResult<()> {
        let json = serde_json::to_vec(value)?;
        let blob = encrypt_to_base64(&json, &self.key)?;

        fs::write(self.primary_path(key), &blob)?;

        // Backup generation; bump the timestamp if two writes land in the
        // same millisecond so generations never overwrite each other.
        let mut epoch_ms = chrono::Utc::now().timestamp_millis();
        while self.backup_path(key, epoch_ms).exists() {
            epoch_ms += 1;
        }
        fs::write(self.backup_path(key, epoch_ms), &blob)?;

        self.prune_backups(key)?;
        Ok(())
    }

    /// Read, decrypt and deserialize the value under `key`.
    ///
    /// On any decryption or parse failure the backup chain is tried newest to
    /// oldest; the final fallback is the caller-supplied default.
    pub fn secure_get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.try_get(&self.primary_path(key)) {
            Ok(Some(value)) => return value,
            Ok(None) => {
                debug!(key = %key, "No primary blob, trying backups");
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Primary blob unreadable, trying backups");
                self.audit.record(
                    SecurityEventKind::SecurityAlert,
                    format!("store read failed for '{key}': {e}"),
                );
            }
        }

        for (epoch_ms, path) in self.backups_newest_first(key) {
            match self.try_get(&path) {
                Ok(Some(value)) => {
                    warn!(key = %key, backup = epoch_ms, "Recovered value from backup");
                    return value;
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(key = %key, backup = epoch_ms, error = %e, "Backup unreadable");
                }
            }
        }

        default
    }

    fn try_get<T: DeserializeOwned>(&self, path: &Path) -> SyncResult<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }
        let blob = fs::read_to_string(path)?;
        let json = decrypt_from_base64(&blob, &self.key)?;
        let value = serde_json::from_slice(&json)?;
        Ok(Some(value))
    }

    /// Remove the primary blob and all backups for `key`.
    pub fn remove(&self, key: &str) -> SyncResult<()> {
        let primary = self.primary_path(key);
        if primary.exists() {
            fs::remove_file(primary)?;
        }
        for (_, path) in self.backups_newest_first(key) {
            let _ = fs::remove_file(path);
        }
        Ok(())
    }

    /// Backup generations for `key`, newest first.
    fn backups_newest_first(&self, key: &str) -> Vec<(i64, PathBuf)> {
        let prefix = format!("{key}_backup_");
        let suffix = format!(".{BLOB_EXT}");

        let mut backups: Vec<(i64, PathBuf)> = match fs::read_dir(&self.data_dir) {
            Ok(entries) => entries
                .flatten()
                .filter_map(|entry| {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    let ts = name
                        .strip_prefix(&prefix)?
                        .strip_suffix(&suffix)?
                        .parse::<i64>()
                        .ok()?;
                    Some((ts, entry.path()))
                })
                .collect(),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to list backup directory");
                Vec::new()
            }
        };

        backups.sort_by(|a, b| b.0.cmp(&a.0));
        backups
    }

    /// Number of backup generations currently retained for `key`.
    pub fn backup_count(&self, key: &str) -> usize {
        self.backups_newest_first(key).len()
    }

    fn prune_backups(&self, key: &str) -> SyncResult<()> {
        let backups = self.backups_newest_first(key);
        for (_, path) in backups.into_iter().skip(self.backup_generations) {
            if let Err(e) = fs::remove_file(&path) {
                warn!(key = %key, path = %path.display(), error = %e, "Failed to prune backup");
            }
        }
        Ok(())
    }
}
