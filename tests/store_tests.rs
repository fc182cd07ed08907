use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};
use uuid::Uuid;

use certsync::audit::AuditLog;
use certsync::config::StorageConfig;
use certsync::store::SecureStore;

fn temp_store() -> (SecureStore, PathBuf) {
    let dir = std::env::temp_dir().join(format!("certsync_store_it_{}", Uuid::new_v4()));
    let config = StorageConfig {
        data_dir: dir.to_string_lossy().to_string(),
        backup_generations: 5,
    };
    let store = SecureStore::open(&config, Arc::new(AuditLog::new())).expect("store should open");
    (store, dir)
}

/// A value survives an encrypt/persist/decrypt round trip.
#[test]
fn test_round_trip_through_encrypted_files() {
    let (store, dir) = temp_store();

    let original = json!([{"key": "site_name", "value": "CTL Storefront", "category": "general"}]);
    store.secure_set("settings", &original);

    let loaded: Value = store.secure_get("settings", Value::Null);
    assert_eq!(loaded, original);

    // Nothing on disk is plaintext.
    let raw = fs::read(dir.join("settings.enc")).expect("blob should exist");
    let raw_str = String::from_utf8_lossy(&raw);
    assert!(!raw_str.contains("CTL Storefront"));

    let _ = fs::remove_dir_all(&dir);
}

/// A corrupted primary blob falls back to the newest good backup generation.
#[test]
fn test_backup_recovery_after_primary_corruption() {
    let (store, dir) = temp_store();

    store.secure_set("licenses", &json!(["generation-one"]));
    store.secure_set("licenses", &json!(["generation-two"]));

    // Corrupt the primary blob in place.
    fs::write(dir.join("licenses.enc"), b"garbage").expect("overwrite should succeed");

    let recovered: Value = store.secure_get("licenses", Value::Null);
    assert_eq!(recovered, json!(["generation-two"]));

    let _ = fs::remove_dir_all(&dir);
}

/// Seven writes leave exactly five backup generations on disk.
#[test]
fn test_backup_pruning_keeps_five_generations() {
    let (store, dir) = temp_store();

    for i in 0..7 {
        store.secure_set("contacts", &json!([format!("revision-{i}")]));
    }

    assert_eq!(store.backup_count("contacts"), 5);

    // The surviving newest backup is the latest revision.
    let loaded: Value = store.secure_get("contacts", Value::Null);
    assert_eq!(loaded, json!(["revision-6"]));

    let _ = fs::remove_dir_all(&dir);
}

/// Missing key and unrecoverable data both yield the caller's default.
#[test]
fn test_missing_key_returns_default() {
    let (store, dir) = temp_store();

    let value: Vec<String> = store.secure_get("never_written", Vec::new());
    assert!(value.is_empty());

    let fallback: Value = store.secure_get("never_written", json!({"empty": true}));
    assert_eq!(fallback, json!({"empty": true}));

    let _ = fs::remove_dir_all(&dir);
}

/// remove() deletes the primary blob; the key then reads as default.
#[test]
fn test_remove_clears_key() {
    let (store, dir) = temp_store();

    store.secure_set("admin_session", &json!({"id": "s-1"}));
    store.remove("admin_session").expect("remove should succeed");

    let value: Value = store.secure_get("admin_session", Value::Null);
    assert_eq!(value, Value::Null);

    let _ = fs::remove_dir_all(&dir);
}

/// A fresh store instance over the same directory reads data written by the
/// previous instance (key file reuse).
#[test]
fn test_reopen_with_persisted_key() {
    let dir = std::env::temp_dir().join(format!("certsync_store_it_{}", Uuid::new_v4()));
    let config = StorageConfig {
        data_dir: dir.to_string_lossy().to_string(),
        backup_generations: 5,
    };

    {
        let store =
            SecureStore::open(&config, Arc::new(AuditLog::new())).expect("store should open");
        store.secure_set("settings", &json!({"persisted": true}));
    }

    let reopened =
        SecureStore::open(&config, Arc::new(AuditLog::new())).expect("reopen should succeed");
    let value: Value = reopened.secure_get("settings", Value::Null);
    assert_eq!(value, json!({"persisted": true}));

    let _ = fs::remove_dir_all(&dir);
}
