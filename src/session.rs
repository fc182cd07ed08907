//! Admin session lifecycle: login, idle tracking, and expiry broadcast.
//!
//! The session record lives in the encrypted store so a restart within the
//! idle window resumes the session. A monitor task checks idleness on an
//! interval and broadcasts expiry so every connected context drops its
//! authenticated state together.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditLog, SecurityEventKind};
use crate::broadcast::BroadcastTransport;
use crate::config::{AdminConfig, SessionConfig};
use crate::events::EventKind;
use crate::store::SecureStore;

const SESSION_KEY: &str = "admin_session";

/// Persisted admin session record. Timestamps are epoch milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminSession {
    pub id: Uuid,
    pub login_time: i64,
    pub last_activity: i64,
    pub is_active: bool,
}

impl AdminSession {
    fn start_now() -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            id: Uuid::new_v4(),
            login_time: now,
            last_activity: now,
            is_active: true,
        }
    }

    fn idle_for_ms(&self, now_ms: i64) -> i64 {
        (now_ms - self.last_activity).max(0)
    }
}

/// Owns the admin session: credential check, idle tracking, expiry.
pub struct SessionManager {
    store: Arc<SecureStore>,
    transport: Arc<BroadcastTransport>,
    audit: Arc<AuditLog>,
    idle_timeout: Duration,
    check_interval: Duration,
    password_sha256: String,
}

impl SessionManager {
    pub fn new(
        session: &SessionConfig,
        admin: &AdminConfig,
        store: Arc<SecureStore>,
        transport: Arc<BroadcastTransport>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            store,
            transport,
            audit,
            idle_timeout: Duration::from_secs(session.idle_timeout_secs),
            check_interval: Duration::from_secs(session.check_interval_secs),
            password_sha256: admin.password_sha256.clone(),
        }
    }

    /// Attempt admin login. An empty configured hash disables login entirely.
    ///
    /// On success the session record is (re)created with a fresh activity
    /// timestamp; a prior session is simply replaced.
    pub fn login(&self, password: &str) -> bool {
        if self.password_sha256.is_empty() {
            warn!("Admin login attempted but no credential is configured");
            self.audit.record(
                SecurityEventKind::FailedLogin,
                "login attempt with no credential configured".to_string(),
            );
            return false;
        }

        let digest = hex::encode(Sha256::digest(password.as_bytes()));
        if !digest.eq_ignore_ascii_case(&self.password_sha256) {
            self.audit.record(
                SecurityEventKind::FailedLogin,
                "admin password mismatch".to_string(),
            );
            return false;
        }

        self.store.secure_set(SESSION_KEY, &AdminSession::start_now());
        self.audit
            .record(SecurityEventKind::Login, "admin login".to_string());
        info!("Admin session started");
        true
    }

    fn current(&self) -> Option<AdminSession> {
        self.store.secure_get::<Option<AdminSession>>(SESSION_KEY, None)
    }

    /// Whether a live, non-expired session exists.
    pub fn is_authenticated(&self) -> bool {
        let now = Utc::now().timestamp_millis();
        match self.current() {
            Some(session) => {
                session.is_active && session.idle_for_ms(now) < self.idle_timeout.as_millis() as i64
            }
            None => false,
        }
    }

    /// Record activity, pushing the idle deadline forward. No-op when no
    /// session exists.
    pub fn touch(&self) {
        if let Some(mut session) = self.current() {
            session.last_activity = Utc::now().timestamp_millis();
            self.store.secure_set(SESSION_KEY, &session);
        }
    }

    /// Explicit logout: clears the session and broadcasts the end so other
    /// contexts drop their authenticated state too.
    pub fn logout(&self) {
        if self.current().is_none() {
            return;
        }
        if let Err(e) = self.store.remove(SESSION_KEY) {
            warn!(error = %e, "Failed to clear session record on logout");
        }
        self.audit
            .record(SecurityEventKind::Logout, "admin logout".to_string());
        self.transport
            .emit(EventKind::SessionEnded, json!({ "reason": "logout" }));
        info!("Admin session ended");
    }

    /// Idle check: expires the session if it has been idle past the timeout.
    /// Returns true when an expiry happened on this call.
    pub fn check_idle(&self) -> bool {
        let now = Utc::now().timestamp_millis();
        let Some(session) = self.current() else {
            return false;
        };
        if !session.is_active || session.idle_for_ms(now) < self.idle_timeout.as_millis() as i64 {
            return false;
        }

        if let Err(e) = self.store.remove(SESSION_KEY) {
            warn!(error = %e, "Failed to clear expired session record");
        }
        self.audit.record(
            SecurityEventKind::SecurityAlert,
            format!(
                "admin session expired after {}s idle",
                self.idle_timeout.as_secs()
            ),
        );
        self.transport
            .emit(EventKind::SessionExpired, json!({ "reason": "idle_timeout" }));
        info!("Admin session expired (idle timeout)");
        true
    }

    /// Periodic idle monitor. The caller owns the handle and aborts it on
    /// shutdown.
    pub fn spawn_monitor(self: Arc<Self>) -> JoinHandle<()> {
        let interval = self.check_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.check_idle();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("certsync_session_{}", Uuid::new_v4()))
    }

    fn manager(dir: &PathBuf, timeout_secs: u64, password_sha256: &str) -> SessionManager {
        let storage = StorageConfig {
            data_dir: dir.to_string_lossy().to_string(),
            backup_generations: 5,
        };
        let audit = Arc::new(AuditLog::new());
        let store = Arc::new(SecureStore::open(&storage, audit.clone()).unwrap());
        let transport = Arc::new(BroadcastTransport::new(16, dir));
        let session = SessionConfig {
            idle_timeout_secs: timeout_secs,
            check_interval_secs: 60,
        };
        let admin = AdminConfig {
            password_sha256: password_sha256.to_string(),
        };
        SessionManager::new(&session, &admin, store, transport, audit)
    }

    fn sha256_hex(s: &str) -> String {
        hex::encode(Sha256::digest(s.as_bytes()))
    }

    #[test]
    fn login_with_correct_password_authenticates() {
        let dir = temp_dir();
        let mgr = manager(&dir, 1800, &sha256_hex("hunter2"));

        assert!(!mgr.is_authenticated());
        assert!(mgr.login("hunter2"));
        assert!(mgr.is_authenticated());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn login_with_wrong_password_is_rejected_and_audited() {
        let dir = temp_dir();
        let mgr = manager(&dir, 1800, &sha256_hex("hunter2"));

        assert!(!mgr.login("wrong"));
        assert!(!mgr.is_authenticated());
        let events = mgr.audit.snapshot();
        assert!(events
            .iter()
            .any(|e| e.kind == SecurityEventKind::FailedLogin));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn empty_configured_hash_disables_login() {
        let dir = temp_dir();
        let mgr = manager(&dir, 1800, "");

        assert!(!mgr.login(""));
        assert!(!mgr.login("anything"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn idle_session_expires_on_check() {
        let dir = temp_dir();
        let mgr = manager(&dir, 0, &sha256_hex("pw"));

        assert!(mgr.login("pw"));
        // Zero timeout: any elapsed idle time is past the deadline.
        assert!(mgr.check_idle());
        assert!(!mgr.is_authenticated());
        // Second check is a no-op; the session is already gone.
        assert!(!mgr.check_idle());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn logout_clears_session() {
        let dir = temp_dir();
        let mgr = manager(&dir, 1800, &sha256_hex("pw"));

        assert!(mgr.login("pw"));
        mgr.logout();
        assert!(!mgr.is_authenticated());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
