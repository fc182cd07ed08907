//! One-time migration of legacy plaintext data files into the encrypted
//! store.
//!
//! Earlier deployments persisted each data category as a plain `<key>.json`
//! file. This module moves those into the encrypted store on startup, once:
//! a marker file records completion so subsequent starts skip the scan.
//! Categories migrate independently, so one corrupt legacy file never blocks
//! the others.

use std::fs;
use std::path::PathBuf;

use serde_json::Value;
use tracing::{info, warn};

use crate::audit::{AuditLog, SecurityEventKind};
use crate::errors::SyncResult;
use crate::store::SecureStore;

const MARKER_FILE: &str = ".migration_done";

/// Data categories that may have legacy plaintext files.
const LEGACY_KEYS: [&str; 8] = [
    "settings",
    "content",
    "applications",
    "licenses",
    "payment_addresses",
    "license_categories",
    "contacts",
    "security_events",
];

/// Outcome of a migration run.
#[derive(Debug, Default)]
pub struct MigrationReport {
    /// Categories moved into the encrypted store.
    pub migrated: Vec<String>,
    /// Categories whose legacy file could not be read or parsed.
    pub failed: Vec<String>,
    /// True when the marker file was present and nothing was scanned.
    pub skipped: bool,
}

fn marker_path(store: &SecureStore) -> PathBuf {
    store.data_dir().join(MARKER_FILE)
}

fn legacy_path(store: &SecureStore, key: &str) -> PathBuf {
    store.data_dir().join(format!("{key}.json"))
}

/// Migrate any legacy plaintext files into the encrypted store.
///
/// Each category is handled independently: a parse failure is audited and
/// the legacy file left in place, while the rest continue. The completion
/// marker is only written when no category failed, so a later run retries
/// the stragglers.
pub fn migrate_legacy_plaintext(store: &SecureStore, audit: &AuditLog) -> SyncResult<MigrationReport> {
    let mut report = MigrationReport::default();

    if marker_path(store).exists() {
        report.skipped = true;
        return Ok(report);
    }

    for key in LEGACY_KEYS {
        let path = legacy_path(store, key);
        if !path.exists() {
            continue;
        }

        let parsed: Result<Value, _> =
            fs::read_to_string(&path).map_err(Into::into).and_then(|raw| {
                serde_json::from_str(&raw).map_err(crate::errors::SyncError::from)
            });

        match parsed {
            Ok(value) => {
                store.secure_set(key, &value);
                if let Err(e) = fs::remove_file(&path) {
                    warn!(key, error = %e, "Migrated legacy file could not be removed");
                }
                audit.record(
                    SecurityEventKind::DataChange,
                    format!("migrated legacy plaintext category '{key}'"),
                );
                info!(key, "Migrated legacy plaintext file into encrypted store");
                report.migrated.push(key.to_string());
            }
            Err(e) => {
                warn!(key, error = %e, "Legacy file failed to migrate; leaving in place");
                audit.record(
                    SecurityEventKind::SecurityAlert,
                    format!("legacy migration failed for '{key}': {e}"),
                );
                report.failed.push(key.to_string());
            }
        }
    }

    if report.failed.is_empty() {
        fs::write(marker_path(store), b"1")?;
    }

    Ok(report)
}
