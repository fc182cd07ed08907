//! Append-only security audit trail.
//!
//! Every facade mutation and session transition records an event here; the
//! facade persists the trail through the encrypted store. The trail is capped
//! at the most recent 1000 entries.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

/// Maximum number of retained audit entries.
pub const MAX_EVENTS: usize = 1000;

/// Audit event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventKind {
    Login,
    Logout,
    FailedLogin,
    DataChange,
    SecurityAlert,
}

impl std::fmt::Display for SecurityEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SecurityEventKind::Login => "login",
            SecurityEventKind::Logout => "logout",
            SecurityEventKind::FailedLogin => "failed_login",
            SecurityEventKind::DataChange => "data_change",
            SecurityEventKind::SecurityAlert => "security_alert",
        };
        write!(f, "{}", s)
    }
}

/// One audit trail entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub kind: SecurityEventKind,
    pub timestamp: DateTime<Utc>,
    pub details: String,
}

/// In-memory audit trail, owned by the facade.
///
/// Recording is infallible: an audit entry that cannot be persisted is still
/// retained in memory and logged, never surfaced to the caller.
#[derive(Debug, Default)]
pub struct AuditLog {
    events: Mutex<Vec<SecurityEvent>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the trail from a previously persisted snapshot.
    pub fn load(&self, mut events: Vec<SecurityEvent>) {
        if events.len() > MAX_EVENTS {
            let excess = events.len() - MAX_EVENTS;
            events.drain(..excess);
        }
        let mut guard = self.events.lock().expect("audit log lock poisoned");
        *guard = events;
    }

    /// Prepend a persisted snapshot to whatever was recorded since startup,
    /// keeping the newest entries when the cap is exceeded.
    pub fn restore(&self, persisted: Vec<SecurityEvent>) {
        let mut guard = self.events.lock().expect("audit log lock poisoned");
        let mut merged = persisted;
        merged.append(&mut guard);
        if merged.len() > MAX_EVENTS {
            let excess = merged.len() - MAX_EVENTS;
            merged.drain(..excess);
        }
        *guard = merged;
    }

    /// Append an event, dropping the oldest entries beyond the cap.
    pub fn record(&self, kind: SecurityEventKind, details: impl Into<String>) -> SecurityEvent {
        let event = SecurityEvent {
            id: Uuid::new_v4(),
            kind,
            timestamp: Utc::now(),
            details: details.into(),
        };

        match kind {
            SecurityEventKind::FailedLogin | SecurityEventKind::SecurityAlert => {
                warn!(kind = %kind, details = %event.details, "Security event recorded");
            }
            _ => {
                info!(kind = %kind, details = %event.details, "Security event recorded");
            }
        }

        let mut guard = self.events.lock().expect("audit log lock poisoned");
        guard.push(event.clone());
        if guard.len() > MAX_EVENTS {
            let excess = guard.len() - MAX_EVENTS;
            guard.drain(..excess);
        }

        event
    }

    /// Current trail, oldest first.
    pub fn snapshot(&self) -> Vec<SecurityEvent> {
        self.events.lock().expect("audit log lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().expect("audit log lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_appends_in_order() {
        let log = AuditLog::new();
        log.record(SecurityEventKind::Login, "admin login");
        log.record(SecurityEventKind::DataChange, "settings updated");

        let events = log.snapshot();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, SecurityEventKind::Login);
        assert_eq!(events[1].kind, SecurityEventKind::DataChange);
    }

    #[test]
    fn trail_is_capped_at_max_events() {
        let log = AuditLog::new();
        for i in 0..(MAX_EVENTS + 25) {
            log.record(SecurityEventKind::DataChange, format!("change {i}"));
        }

        let events = log.snapshot();
        assert_eq!(events.len(), MAX_EVENTS);
        // Oldest entries were dropped.
        assert_eq!(events[0].details, "change 25");
    }

    #[test]
    fn load_truncates_oversized_snapshots() {
        let log = AuditLog::new();
        for _ in 0..10 {
            log.record(SecurityEventKind::DataChange, "seed");
        }
        let mut events = log.snapshot();
        for _ in 0..5 {
            events.extend(events.clone());
        }

        let other = AuditLog::new();
        other.load(events);
        assert!(other.len() <= MAX_EVENTS);
    }

    #[test]
    fn restore_keeps_startup_events_after_persisted_ones() {
        let persisted = {
            let log = AuditLog::new();
            log.record(SecurityEventKind::Login, "old login");
            log.snapshot()
        };

        let log = AuditLog::new();
        log.record(SecurityEventKind::SecurityAlert, "startup alert");
        log.restore(persisted);

        let events = log.snapshot();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].details, "old login");
        assert_eq!(events[1].details, "startup alert");
    }
}
