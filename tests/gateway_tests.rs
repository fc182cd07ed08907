#![cfg(feature = "sqlite")]

use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use certsync::gateway::{Database, RemoteGateway, Table};
use certsync::models::{License, LicenseStatus, NewLicense};

async fn memory_gateway() -> RemoteGateway {
    let db = Database::connect_sqlite_memory()
        .await
        .expect("in-memory sqlite should open");
    RemoteGateway::new(db).await.expect("gateway should build")
}

fn license(code: &str, status: LicenseStatus) -> License {
    License::from_new(NewLicense {
        license_id: code.to_string(),
        holder_name: "Test Holder".to_string(),
        license_type: "individual".to_string(),
        status: Some(status),
        issue_date: Utc::now(),
        expiry_date: Utc::now() + Duration::days(365),
        platforms: None,
        application_id: None,
    })
}

/// Basic row lifecycle: upsert, visible in load and snapshot, delete.
#[tokio::test]
async fn test_row_crud() {
    let gateway = memory_gateway().await;

    gateway
        .upsert(Table::Settings, "site_name", &json!({"value": "CTL"}))
        .await
        .expect("upsert should succeed");

    let rows = gateway.snapshot(Table::Settings);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, "site_name");
    assert_eq!(rows[0].data["value"], json!("CTL"));

    assert!(gateway
        .delete(Table::Settings, "site_name")
        .await
        .expect("delete should succeed"));
    assert!(gateway.snapshot(Table::Settings).is_empty());

    // Deleting again reports no row removed.
    assert!(!gateway
        .delete(Table::Settings, "site_name")
        .await
        .expect("second delete should not error"));
}

/// Updating a row preserves created_at and refreshes updated_at.
#[tokio::test]
async fn test_upsert_preserves_created_at() {
    let gateway = memory_gateway().await;

    gateway
        .upsert(Table::Content, "home:title", &json!({"value": "v1"}))
        .await
        .expect("insert should succeed");
    let first = gateway.snapshot(Table::Content)[0].clone();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    gateway
        .upsert(Table::Content, "home:title", &json!({"value": "v2"}))
        .await
        .expect("update should succeed");
    let second = gateway.snapshot(Table::Content)[0].clone();

    assert_eq!(second.created_at, first.created_at);
    assert!(second.updated_at >= first.updated_at);
    assert_eq!(second.data["value"], json!("v2"));
}

/// A writer's own subsequent read observes the write without an explicit
/// refresh call.
#[tokio::test]
async fn test_snapshot_reflects_own_write() {
    let gateway = memory_gateway().await;

    let active = license("CTL-2025-AAAA", LicenseStatus::Active);
    gateway
        .upsert(Table::Licenses, &active.id.to_string(), &active)
        .await
        .expect("upsert should succeed");

    let licenses: Vec<License> = gateway.typed_snapshot(Table::Licenses);
    assert_eq!(licenses.len(), 1);
    assert_eq!(licenses[0].license_id, "CTL-2025-AAAA");
}

/// Watch subscribers observe the refreshed snapshot after a write.
#[tokio::test]
async fn test_watch_receives_refreshed_snapshot() {
    let gateway = memory_gateway().await;
    let mut rx = gateway.watch(Table::Contacts);

    gateway
        .upsert(Table::Contacts, &Uuid::new_v4().to_string(), &json!({"name": "A"}))
        .await
        .expect("upsert should succeed");

    rx.changed().await.expect("watch should receive an update");
    assert_eq!(rx.borrow().len(), 1);
}

/// Verification returns only active licenses: pending, expired and unknown
/// codes all come back as None.
#[tokio::test]
async fn test_verify_license_filters_non_active() {
    let gateway = memory_gateway().await;

    let active = license("CTL-2025-GOOD", LicenseStatus::Active);
    let pending = license("CTL-2025-WAIT", LicenseStatus::Pending);
    let expired = license("CTL-2025-OLD", LicenseStatus::Expired);

    for l in [&active, &pending, &expired] {
        gateway
            .upsert(Table::Licenses, &l.id.to_string(), l)
            .await
            .expect("upsert should succeed");
    }

    let verified = gateway
        .verify_license("CTL-2025-GOOD")
        .await
        .expect("active license should verify");
    assert_eq!(verified.id, active.id);
    assert_eq!(verified.status, LicenseStatus::Active);

    assert!(gateway.verify_license("CTL-2025-WAIT").await.is_none());
    assert!(gateway.verify_license("CTL-2025-OLD").await.is_none());
    assert!(gateway.verify_license("CTL-2025-NONE").await.is_none());
}

/// A license flipped away from active stops verifying immediately.
#[tokio::test]
async fn test_verification_follows_status_change() {
    let gateway = memory_gateway().await;

    let mut l = license("CTL-2025-FLIP", LicenseStatus::Active);
    gateway
        .upsert(Table::Licenses, &l.id.to_string(), &l)
        .await
        .expect("upsert should succeed");
    assert!(gateway.verify_license("CTL-2025-FLIP").await.is_some());

    l.status = LicenseStatus::Suspended;
    gateway
        .upsert(Table::Licenses, &l.id.to_string(), &l)
        .await
        .expect("update should succeed");
    assert!(gateway.verify_license("CTL-2025-FLIP").await.is_none());
}
