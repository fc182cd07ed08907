//! Event kinds and the sync envelope.
//!
//! Every entity collection has exactly one update event kind; producers and
//! consumers agree on the closed enum at compile time instead of matching on
//! ad hoc strings.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The closed set of events emitted by the facade.
///
/// Entity kinds carry the refreshed full collection as payload; session kinds
/// carry the session record that expired or ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ApplicationsUpdated,
    LicensesUpdated,
    SettingsUpdated,
    ContentUpdated,
    PaymentAddressesUpdated,
    LicenseCategoriesUpdated,
    ContactsUpdated,
    SessionExpired,
    SessionEnded,
}

impl EventKind {
    /// Wire/storage name, e.g. `settings_updated`.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ApplicationsUpdated => "applications_updated",
            EventKind::LicensesUpdated => "licenses_updated",
            EventKind::SettingsUpdated => "settings_updated",
            EventKind::ContentUpdated => "content_updated",
            EventKind::PaymentAddressesUpdated => "payment_addresses_updated",
            EventKind::LicenseCategoriesUpdated => "license_categories_updated",
            EventKind::ContactsUpdated => "contacts_updated",
            EventKind::SessionExpired => "session_expired",
            EventKind::SessionEnded => "session_ended",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The message carried by every sync event.
///
/// Delivery is at-least-once: the same envelope may be observed twice, once
/// via the live channel and once via the fallback poller. The `id` lets
/// consumers deduplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub event: EventKind,
    pub data: Value,
    /// Emission time, epoch milliseconds.
    pub timestamp: i64,
    pub id: Uuid,
}

impl Envelope {
    /// Build a new envelope with a fresh random id and the current time.
    pub fn new(event: EventKind, data: Value) -> Self {
        Self {
            event,
            data,
            timestamp: Utc::now().timestamp_millis(),
            id: Uuid::new_v4(),
        }
    }

    /// Age of this envelope relative to `now_ms`, saturating at zero for
    /// clock skew into the future.
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        (now_ms - self.timestamp).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_names_match_wire_contract() {
        assert_eq!(EventKind::SettingsUpdated.as_str(), "settings_updated");
        assert_eq!(
            EventKind::LicenseCategoriesUpdated.as_str(),
            "license_categories_updated"
        );
        assert_eq!(EventKind::SessionExpired.as_str(), "session_expired");
    }

    #[test]
    fn event_kind_serde_round_trip() {
        let json = serde_json::to_string(&EventKind::PaymentAddressesUpdated).unwrap();
        assert_eq!(json, "\"payment_addresses_updated\"");
        let back: EventKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EventKind::PaymentAddressesUpdated);
    }

    #[test]
    fn envelope_carries_fresh_id_and_timestamp() {
        let a = Envelope::new(EventKind::ContactsUpdated, json!({"n": 1}));
        let b = Envelope::new(EventKind::ContactsUpdated, json!({"n": 1}));
        assert_ne!(a.id, b.id);
        assert!(a.timestamp > 0);
    }

    #[test]
    fn envelope_age_saturates_for_future_timestamps() {
        let mut env = Envelope::new(EventKind::SettingsUpdated, json!(null));
        env.timestamp += 10_000;
        assert_eq!(env.age_ms(Utc::now().timestamp_millis()), 0);
    }
}
