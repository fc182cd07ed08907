//! Broadcast transport for cross-context change notification.
//!
//! Delivers a typed [`Envelope`] to every other execution context sharing the
//! sync domain, plus to local subscribers in the emitting context. Local
//! listeners are invoked synchronously on emit so same-context consumers
//! never wait on a channel round trip.
//!
//! Every emission is additionally persisted to a durable fallback record so
//! the [`crate::poller::FallbackPoller`] in other contexts can re-derive the
//! event if the live message was missed. Delivery is at-least-once and
//! unordered across contexts; handlers must be idempotent.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::SyncResult;
use crate::events::{Envelope, EventKind};

/// File name of the durable fallback record inside the data directory.
pub const FALLBACK_FILE: &str = "last_update.json";

/// Callback registered for a single event kind.
pub type Listener = std::sync::Arc<dyn Fn(&Envelope) + Send + Sync>;

/// Handle for removing a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(Uuid);

/// Cross-context publish/subscribe over a broadcast channel, with a local
/// listener registry and a durable fallback record.
pub struct BroadcastTransport {
    channel: broadcast::Sender<Envelope>,
    listeners: Mutex<HashMap<EventKind, Vec<(ListenerId, Listener)>>>,
    fallback_path: PathBuf,
}

impl BroadcastTransport {
    /// Create a transport with the given channel capacity, persisting the
    /// fallback record under `data_dir`.
    pub fn new(channel_capacity: usize, data_dir: &Path) -> Self {
        let (channel, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            channel,
            listeners: Mutex::new(HashMap::new()),
            fallback_path: data_dir.join(FALLBACK_FILE),
        }
    }

    /// Emit an event: construct the envelope, persist the fallback record,
    /// publish on the shared channel and invoke local listeners.
    ///
    /// Never fails: with no remote receivers the transport degrades to
    /// local-only delivery, and a fallback write failure is only logged.
    pub fn emit(&self, event: EventKind, data: Value) -> Envelope {
        let envelope = Envelope::new(event, data);

        if let Err(e) = self.write_fallback(&envelope) {
            warn!(event = %event, error = %e, "Failed to persist fallback record");
        }

        // send() errs only when no receiver is subscribed; that is the
        // degraded local-only mode, not a failure.
        if self.channel.send(envelope.clone()).is_err() {
            debug!(event = %event, "No channel receivers, local-only delivery");
        }

        self.dispatch_local(&envelope);
        envelope
    }

    /// Re-deliver an envelope through the local listener path only.
    ///
    /// Used by the fallback poller: the durable record is deliberately not
    /// rewritten, otherwise every poller tick would re-trigger every other
    /// context's poller forever.
    pub fn emit_local_only(&self, envelope: &Envelope) {
        self.dispatch_local(envelope);
    }

    /// Register a callback for one event kind. Multiple independent
    /// listeners per kind are allowed.
    pub fn add_event_listener(&self, event: EventKind, listener: Listener) -> ListenerId {
        let id = ListenerId(Uuid::new_v4());
        let mut guard = self.listeners.lock().expect("listener registry poisoned");
        guard.entry(event).or_default().push((id, listener));
        id
    }

    /// Remove a previously registered callback. Removing an id that is not
    /// registered is a no-op.
    pub fn remove_event_listener(&self, event: EventKind, id: ListenerId) {
        let mut guard = self.listeners.lock().expect("listener registry poisoned");
        if let Some(list) = guard.get_mut(&event) {
            list.retain(|(registered, _)| *registered != id);
        }
    }

    /// Subscribe to the shared channel, the way another tab/process would.
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.channel.subscribe()
    }

    fn dispatch_local(&self, envelope: &Envelope) {
        // Clone the callbacks out so listeners run without holding the lock;
        // a listener may register or remove listeners itself.
        let callbacks: Vec<Listener> = {
            let guard = self.listeners.lock().expect("listener registry poisoned");
            guard
                .get(&envelope.event)
                .map(|list| list.iter().map(|(_, cb)| cb.clone()).collect())
                .unwrap_or_default()
        };

        for callback in callbacks {
            callback(envelope);
        }
    }

    /// Path of the durable fallback record.
    pub fn fallback_path(&self) -> &Path {
        &self.fallback_path
    }

    fn write_fallback(&self, envelope: &Envelope) -> SyncResult<()> {
        if let Some(parent) = self.fallback_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.fallback_path, serde_json::to_vec(envelope)?)?;
        Ok(())
    }

    /// Read the durable fallback record, if any.
    pub fn read_fallback(&self) -> SyncResult<Option<Envelope>> {
        if !self.fallback_path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.fallback_path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}
