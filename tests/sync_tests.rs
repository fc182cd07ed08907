use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use certsync::broadcast::BroadcastTransport;
use certsync::config::SyncTimingConfig;
use certsync::events::{Envelope, EventKind};
use certsync::poller::FallbackPoller;

fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!("certsync_sync_it_{}", Uuid::new_v4()))
}

fn timing(poll_ms: u64, window_ms: u64) -> SyncTimingConfig {
    SyncTimingConfig {
        channel_capacity: 16,
        poll_interval_ms: poll_ms,
        freshness_window_ms: window_ms,
        refresh_interval_ms: 0,
    }
}

fn write_fallback(transport: &BroadcastTransport, envelope: &Envelope) {
    if let Some(parent) = transport.fallback_path().parent() {
        fs::create_dir_all(parent).expect("data dir created");
    }
    fs::write(
        transport.fallback_path(),
        serde_json::to_vec(envelope).expect("envelope serializes"),
    )
    .expect("fallback record written");
}

/// Every subscribed receiver observes the same emission: two "tabs"
/// converge on the payload carried by one emit.
#[tokio::test]
async fn test_cross_receiver_convergence() {
    let dir = temp_dir();
    let transport = BroadcastTransport::new(16, &dir);

    let mut tab_a = transport.subscribe();
    let mut tab_b = transport.subscribe();

    let sent = transport.emit(EventKind::SettingsUpdated, json!([{"key": "v"}]));

    let got_a = tokio_test::assert_ok!(tab_a.recv().await, "tab A receives");
    let got_b = tokio_test::assert_ok!(tab_b.recv().await, "tab B receives");
    assert_eq!(got_a.id, sent.id);
    assert_eq!(got_b.id, sent.id);
    assert_eq!(got_a.data, got_b.data);

    let _ = fs::remove_dir_all(&dir);
}

/// Delivery is at-least-once, so consumers apply full-collection payloads
/// idempotently: replaying the same envelope leaves the state unchanged.
#[tokio::test]
async fn test_replayed_envelope_is_idempotent() {
    let dir = temp_dir();
    let transport = Arc::new(BroadcastTransport::new(16, &dir));

    // Consumer state: the latest settings collection, replaced wholesale.
    let state: Arc<Mutex<HashMap<String, String>>> = Arc::new(Mutex::new(HashMap::new()));
    let applied = Arc::new(AtomicUsize::new(0));

    {
        let state = state.clone();
        let applied = applied.clone();
        transport.add_event_listener(
            EventKind::SettingsUpdated,
            Arc::new(move |envelope: &Envelope| {
                let mut next = HashMap::new();
                for item in envelope.data.as_array().cloned().unwrap_or_default() {
                    if let (Some(k), Some(v)) = (item["key"].as_str(), item["value"].as_str()) {
                        next.insert(k.to_string(), v.to_string());
                    }
                }
                *state.lock().unwrap() = next;
                applied.fetch_add(1, Ordering::SeqCst);
            }),
        );
    }

    let envelope = transport.emit(
        EventKind::SettingsUpdated,
        json!([{"key": "site_name", "value": "CTL"}]),
    );
    let after_first = state.lock().unwrap().clone();

    // Replay, as the fallback poller would.
    transport.emit_local_only(&envelope);
    transport.emit_local_only(&envelope);

    assert_eq!(*state.lock().unwrap(), after_first);
    assert_eq!(applied.load(Ordering::SeqCst), 3);

    let _ = fs::remove_dir_all(&dir);
}

/// A durable record just inside the freshness window is re-asserted; the
/// same record is never re-asserted twice by one poller.
#[tokio::test]
async fn test_fresh_record_reasserted_once() {
    let dir = temp_dir();
    let transport = Arc::new(BroadcastTransport::new(16, &dir));
    let poller = FallbackPoller::new(transport.clone(), &timing(3_000, 5_000));

    let delivered = Arc::new(AtomicUsize::new(0));
    {
        let delivered = delivered.clone();
        transport.add_event_listener(
            EventKind::LicensesUpdated,
            Arc::new(move |_| {
                delivered.fetch_add(1, Ordering::SeqCst);
            }),
        );
    }

    // Record aged well inside the window.
    let mut envelope = Envelope::new(EventKind::LicensesUpdated, json!([]));
    envelope.timestamp = Utc::now().timestamp_millis() - 4_800;
    write_fallback(&transport, &envelope);

    assert!(poller.check_once());
    assert!(!poller.check_once());
    assert_eq!(delivered.load(Ordering::SeqCst), 1);

    let _ = fs::remove_dir_all(&dir);
}

/// A record just past the freshness window is ignored.
#[tokio::test]
async fn test_stale_record_ignored() {
    let dir = temp_dir();
    let transport = Arc::new(BroadcastTransport::new(16, &dir));
    let poller = FallbackPoller::new(transport.clone(), &timing(3_000, 5_000));

    let mut envelope = Envelope::new(EventKind::LicensesUpdated, json!([]));
    envelope.timestamp = Utc::now().timestamp_millis() - 5_200;
    write_fallback(&transport, &envelope);

    assert!(!poller.check_once());

    let _ = fs::remove_dir_all(&dir);
}

/// A removed listener stops receiving; other listeners for the same kind
/// are unaffected.
#[tokio::test]
async fn test_listener_removal_is_scoped() {
    let dir = temp_dir();
    let transport = BroadcastTransport::new(16, &dir);

    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    let first_id = {
        let first = first.clone();
        transport.add_event_listener(
            EventKind::ContentUpdated,
            Arc::new(move |_| {
                first.fetch_add(1, Ordering::SeqCst);
            }),
        )
    };
    {
        let second = second.clone();
        transport.add_event_listener(
            EventKind::ContentUpdated,
            Arc::new(move |_| {
                second.fetch_add(1, Ordering::SeqCst);
            }),
        );
    }

    transport.emit(EventKind::ContentUpdated, json!({}));
    transport.remove_event_listener(EventKind::ContentUpdated, first_id);
    transport.emit(EventKind::ContentUpdated, json!({}));

    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 2);

    let _ = fs::remove_dir_all(&dir);
}
