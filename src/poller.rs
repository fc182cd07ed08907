//! Fallback poller: timer-driven backstop for missed channel messages.
//!
//! A context that was not yet subscribed (or whose channel delivery failed)
//! still converges: every emission persists a durable fallback record, and
//! this poller re-derives the event from that record while it is fresh.
//!
//! The poll interval and freshness window bound worst-case propagation delay
//! and duplicate-delivery risk; they are tuned together (window > interval,
//! with margin — enforced by config validation).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::broadcast::BroadcastTransport;
use crate::config::SyncTimingConfig;

/// Re-asserts the last durable envelope through the local listener path.
pub struct FallbackPoller {
    transport: Arc<BroadcastTransport>,
    poll_interval: Duration,
    freshness_window_ms: i64,
    last_seen: Mutex<Option<Uuid>>,
}

impl FallbackPoller {
    pub fn new(transport: Arc<BroadcastTransport>, timing: &SyncTimingConfig) -> Self {
        Self {
            transport,
            poll_interval: Duration::from_millis(timing.poll_interval_ms),
            freshness_window_ms: timing.freshness_window_ms as i64,
            last_seen: Mutex::new(None),
        }
    }

    /// One poller tick: read the durable record and, if it is fresh and not
    /// yet re-asserted by this poller, re-emit it locally.
    ///
    /// Re-emission goes through the local listener path only — the durable
    /// record is never rewritten here, so pollers cannot feed each other
    /// forever. Returns `true` when an envelope was re-emitted.
    pub fn check_once(&self) -> bool {
        let envelope = match self.transport.read_fallback() {
            Ok(Some(envelope)) => envelope,
            Ok(None) => return false,
            Err(e) => {
                warn!(error = %e, "Failed to read fallback record");
                return false;
            }
        };

        let age = envelope.age_ms(Utc::now().timestamp_millis());
        if age > self.freshness_window_ms {
            return false;
        }

        {
            let mut last_seen = self.last_seen.lock().expect("poller state poisoned");
            if *last_seen == Some(envelope.id) {
                return false;
            }
            *last_seen = Some(envelope.id);
        }

        debug!(event = %envelope.event, age_ms = age, "Re-asserting fallback envelope");
        self.transport.emit_local_only(&envelope);
        true
    }

    /// Spawn the background polling task. The caller owns the handle and
    /// aborts it on shutdown.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let poller = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poller.poll_interval);
            // The first tick fires immediately; skip it so a just-started
            // context does not instantly replay its own emission.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                poller.check_once();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Envelope, EventKind};
    use serde_json::json;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("certsync_poller_{}", Uuid::new_v4()))
    }

    fn timing() -> SyncTimingConfig {
        SyncTimingConfig {
            channel_capacity: 16,
            poll_interval_ms: 30,
            freshness_window_ms: 5_000,
            refresh_interval_ms: 0,
        }
    }

    fn write_record(transport: &BroadcastTransport, envelope: &Envelope) {
        fs::create_dir_all(transport.fallback_path().parent().unwrap()).unwrap();
        fs::write(
            transport.fallback_path(),
            serde_json::to_vec(envelope).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn fresh_record_is_reasserted_once() {
        let dir = temp_dir();
        let transport = Arc::new(BroadcastTransport::new(16, &dir));
        let poller = FallbackPoller::new(Arc::clone(&transport), &timing());

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        transport.add_event_listener(
            EventKind::SettingsUpdated,
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let envelope = Envelope::new(EventKind::SettingsUpdated, json!({"x": 1}));
        write_record(&transport, &envelope);

        assert!(poller.check_once(), "fresh record should be re-emitted");
        assert!(!poller.check_once(), "same id must not be re-emitted twice");
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn stale_record_is_ignored() {
        let dir = temp_dir();
        let transport = Arc::new(BroadcastTransport::new(16, &dir));
        let poller = FallbackPoller::new(Arc::clone(&transport), &timing());

        let mut envelope = Envelope::new(EventKind::ContentUpdated, json!({}));
        envelope.timestamp = Utc::now().timestamp_millis() - 5_200;
        write_record(&transport, &envelope);

        assert!(!poller.check_once());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn record_just_inside_window_is_reasserted() {
        let dir = temp_dir();
        let transport = Arc::new(BroadcastTransport::new(16, &dir));
        let poller = FallbackPoller::new(Arc::clone(&transport), &timing());

        let mut envelope = Envelope::new(EventKind::ContentUpdated, json!({}));
        envelope.timestamp = Utc::now().timestamp_millis() - 4_500;
        write_record(&transport, &envelope);

        assert!(poller.check_once());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_record_is_a_noop() {
        let dir = temp_dir();
        let transport = Arc::new(BroadcastTransport::new(16, &dir));
        let poller = FallbackPoller::new(Arc::clone(&transport), &timing());

        assert!(!poller.check_once());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn reassertion_does_not_rewrite_the_record() {
        let dir = temp_dir();
        let transport = Arc::new(BroadcastTransport::new(16, &dir));
        let poller = FallbackPoller::new(Arc::clone(&transport), &timing());

        let envelope = Envelope::new(EventKind::LicensesUpdated, json!([]));
        write_record(&transport, &envelope);
        let before = fs::read(transport.fallback_path()).unwrap();

        poller.check_once();
        let after = fs::read(transport.fallback_path()).unwrap();
        assert_eq!(before, after);

        let _ = fs::remove_dir_all(&dir);
    }
}
