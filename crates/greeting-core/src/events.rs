//! Change notifications for hosts.
//!
//! The session emits a `MetadataEvent` after every state change. Hosts
//! subscribe to decide when to persist (typically by scheduling a debounced
//! save on `StoreChanged`).

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use web_time::{SystemTime, UNIX_EPOCH};

/// Current time in milliseconds since Unix epoch.
pub fn now_millis() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}

/// Events emitted by a `GreetingSession`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MetadataEvent {
    /// A metadata record was created for a greeting.
    RecordCreated {
        id: String,
        /// Milliseconds since Unix epoch.
        timestamp: f64,
    },
    /// Empty records were garbage-collected.
    RecordsCollected { ids: Vec<String>, timestamp: f64 },
    /// The index map was rebuilt from content.
    PositionsSynced {
        kept: usize,
        rematched: usize,
        unmapped: usize,
        timestamp: f64,
    },
    /// The head greeting traded places with alternate position 0.
    HeadSwapped { timestamp: f64 },
    /// In-memory state changed and should eventually be persisted.
    StoreChanged {
        /// Owner of the store, if known.
        owner: Option<String>,
        timestamp: f64,
    },
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(usize);

type Listener = Arc<dyn Fn(&MetadataEvent) + Send + Sync>;

/// Fans session events out to host listeners.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<(SubscriberId, Listener)>>,
    next_id: AtomicUsize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&MetadataEvent) + Send + Sync + 'static,
    ) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(listener)));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let before = listeners.len();
        listeners.retain(|(subscriber, _)| *subscriber != id);
        listeners.len() != before
    }

    /// Deliver `event` to every listener in subscription order.
    ///
    /// The listener list is copied first, so a listener may subscribe or
    /// unsubscribe while it runs.
    pub fn emit(&self, event: MetadataEvent) {
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            listener(&event);
        }
    }
}
