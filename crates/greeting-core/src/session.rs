//! GreetingSession: the editing context for one owner's greetings.
//!
//! Holds the working copy of the greeting text and the identity store, and
//! routes every edit through reconciliation, lifecycle and position exchange so
//! the two never drift apart. Operations run synchronously and must be applied
//! in the order the edits happened.
//!
//! Without an owner, metadata writes and saves are ignored with a warning.
//! Structural list edits still apply so the in-memory mapping stays usable.

use crate::events::{EventBus, MetadataEvent, now_millis};
use crate::exchange::{self, MoveOutcome};
use crate::fingerprint::fingerprint;
use crate::gateway::{GatewayError, MetadataGateway};
use crate::greetings::{Greetings, Slot};
use crate::id::{GreetingId, OwnerId};
use crate::lifecycle::{self, MetaUpdate};
use crate::reconcile::{self, ReconcileReport, Reconciler};
use crate::store::{GreetingMeta, GreetingStore};
use std::sync::Arc;

pub struct GreetingSession {
    owner: Option<OwnerId>,
    greetings: Greetings,
    store: GreetingStore,
    load_report: ReconcileReport,
    events: Option<Arc<EventBus>>,
}

impl GreetingSession {
    /// Start a session from an already loaded store.
    ///
    /// The store is reconciled against `greetings` and garbage-collected.
    pub fn new(owner: Option<OwnerId>, greetings: Greetings, mut store: GreetingStore) -> Self {
        let load_report = reconcile::reconcile_on_load(&greetings, &mut store);
        lifecycle::garbage_collect(&mut store);
        Self {
            owner,
            greetings,
            store,
            load_report,
            events: None,
        }
    }

    /// Load `owner`'s store through `gateway` and start a session.
    pub async fn open<G: MetadataGateway + ?Sized>(
        gateway: &G,
        owner: Option<OwnerId>,
        greetings: Greetings,
    ) -> Result<Self, GatewayError> {
        let store = match &owner {
            Some(owner) => gateway.load(owner).await?,
            None => {
                tracing::warn!("No owner context, greeting metadata starts empty");
                GreetingStore::default()
            }
        };
        Ok(Self::new(owner, greetings, store))
    }

    /// Publish change events on `bus`.
    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn owner(&self) -> Option<&OwnerId> {
        self.owner.as_ref()
    }

    pub fn greetings(&self) -> &Greetings {
        &self.greetings
    }

    pub fn store(&self) -> &GreetingStore {
        &self.store
    }

    /// What reconciliation did when the session started.
    pub fn load_report(&self) -> &ReconcileReport {
        &self.load_report
    }

    pub fn into_parts(self) -> (Greetings, GreetingStore) {
        (self.greetings, self.store)
    }

    pub fn identifier_at(&self, slot: Slot) -> Option<&GreetingId> {
        match slot {
            Slot::Head => self.store.head.as_ref().map(|head| &head.id),
            Slot::Alternate(position) => self.store.id_at(position),
        }
    }

    pub fn meta_at(&self, slot: Slot) -> Option<&GreetingMeta> {
        match slot {
            Slot::Head => self.store.head.as_ref(),
            Slot::Alternate(position) => self.store.meta_at(position),
        }
    }

    fn emit(&self, event: MetadataEvent) {
        if let Some(bus) = &self.events {
            bus.emit(event);
        }
    }

    fn changed(&self) {
        self.emit(MetadataEvent::StoreChanged {
            owner: self.owner.as_ref().map(OwnerId::to_string),
            timestamp: now_millis(),
        });
    }

    fn has_owner(&self, operation: &str) -> bool {
        if self.owner.is_none() {
            tracing::warn!("Ignoring {}: no owner context", operation);
            return false;
        }
        true
    }

    /// Write title/description for the greeting at `slot`.
    ///
    /// Resolves (or creates) the record for the slot, merges `updates`, then
    /// collects empty records. Returns the slot's identifier afterwards, or
    /// `None` if the slot has no record left.
    pub fn update_meta(&mut self, slot: Slot, updates: MetaUpdate) -> Option<GreetingId> {
        if !self.has_owner("metadata update") {
            return None;
        }
        let text = self.greetings.text(slot)?;
        if updates.is_noop() {
            return self.identifier_at(slot).cloned();
        }
        let hash = fingerprint(text);

        let id = match slot {
            Slot::Head => match self.store.head.as_ref().map(|head| head.id.clone()) {
                Some(id) => id,
                None => {
                    let id = GreetingId::generate();
                    self.store.head = Some(GreetingMeta::new(id.clone(), hash));
                    self.emit(MetadataEvent::RecordCreated {
                        id: id.to_string(),
                        timestamp: now_millis(),
                    });
                    id
                }
            },
            Slot::Alternate(position) => {
                let mut reconciler = Reconciler::for_store(&self.store, position);
                let resolution = reconciler.resolve_identifier(position, text, &self.store);
                self.store.positions.insert(position, resolution.id.clone());
                resolution.id
            }
        };

        let outcome = lifecycle::upsert(&mut self.store, &id, updates, hash);
        if outcome.created {
            self.emit(MetadataEvent::RecordCreated {
                id: id.to_string(),
                timestamp: now_millis(),
            });
        }
        if !outcome.collected.is_empty() {
            self.emit(MetadataEvent::RecordsCollected {
                ids: outcome.collected.iter().map(GreetingId::to_string).collect(),
                timestamp: now_millis(),
            });
        }
        self.changed();
        self.identifier_at(slot).cloned()
    }

    pub fn set_title(&mut self, slot: Slot, title: impl Into<String>) -> Option<GreetingId> {
        self.update_meta(slot, MetaUpdate::title(title))
    }

    pub fn set_description(
        &mut self,
        slot: Slot,
        description: impl Into<String>,
    ) -> Option<GreetingId> {
        self.update_meta(slot, MetaUpdate::description(description))
    }

    /// Replace the text at `slot`, keeping its metadata attached.
    pub fn set_text(&mut self, slot: Slot, text: impl Into<String>) -> bool {
        let text = text.into();
        let hash = fingerprint(&text);
        if !self.greetings.set_text(slot, text) {
            return false;
        }
        if lifecycle::refresh_fingerprint_only(&mut self.store, slot, hash) {
            self.changed();
        }
        true
    }

    /// Count one use of the greeting at `slot`.
    pub fn record_use(&mut self, slot: Slot) -> bool {
        if !self.has_owner("usage update") {
            return false;
        }
        let now = now_millis() as u64;
        let recorded = lifecycle::record_use(&mut self.store, slot, now);
        if recorded {
            self.changed();
        }
        recorded
    }

    pub fn move_greeting(&mut self, id: &GreetingId, delta: isize) -> MoveOutcome {
        let outcome = exchange::move_by(&mut self.greetings, &mut self.store, id, delta);
        self.after_move(outcome);
        outcome
    }

    /// Move the greeting at `position`, mapped or not.
    pub fn move_slot(&mut self, position: usize, delta: isize) -> MoveOutcome {
        let outcome = exchange::move_position(&mut self.greetings, &mut self.store, position, delta);
        self.after_move(outcome);
        outcome
    }

    pub fn swap_with_head(&mut self) -> bool {
        let swapped = exchange::swap_with_head(&mut self.greetings, &mut self.store);
        if swapped {
            self.emit(MetadataEvent::HeadSwapped {
                timestamp: now_millis(),
            });
            self.changed();
        }
        swapped
    }

    fn after_move(&self, outcome: MoveOutcome) {
        match outcome {
            MoveOutcome::Ignored => return,
            MoveOutcome::SwappedWithHead => self.emit(MetadataEvent::HeadSwapped {
                timestamp: now_millis(),
            }),
            MoveOutcome::Moved { .. } => {}
        }
        self.changed();
    }

    /// Append a greeting. It gets a fresh identifier and an empty record.
    pub fn push_greeting(&mut self, text: impl Into<String>) -> GreetingId {
        let id = exchange::insert_at_end(&mut self.greetings, &mut self.store, text.into());
        self.changed();
        id
    }

    pub fn remove_greeting(&mut self, id: &GreetingId) -> bool {
        let removed = exchange::remove(&mut self.greetings, &mut self.store, id);
        if removed {
            self.changed();
        }
        removed
    }

    /// Remove the greeting at `position`, mapped or not.
    pub fn remove_slot(&mut self, position: usize) -> bool {
        let removed = exchange::remove_position(&mut self.greetings, &mut self.store, position);
        if removed {
            self.changed();
        }
        removed
    }

    /// Replace the working text after a bulk external change and rebuild the
    /// index map from content.
    pub fn replace_greetings(&mut self, greetings: Greetings) -> ReconcileReport {
        self.greetings = greetings;
        self.resync()
    }

    /// Rebuild the index map from content.
    pub fn resync(&mut self) -> ReconcileReport {
        let report = reconcile::resync(&self.greetings, &mut self.store);
        self.emit(MetadataEvent::PositionsSynced {
            kept: report.kept.len(),
            rematched: report.rematched.len(),
            unmapped: report.unmapped.len(),
            timestamp: now_millis(),
        });
        if report.has_changes() {
            self.changed();
        }
        report
    }

    /// The store as it should be persisted: empty records collected and the
    /// index map trimmed to the current list.
    pub fn snapshot(&self) -> GreetingStore {
        let mut store = self.store.clone();
        lifecycle::garbage_collect(&mut store);
        store.normalize(self.greetings.len());
        store
    }

    /// Persist the current snapshot. Returns false (and writes nothing) without
    /// an owner.
    pub async fn save<G: MetadataGateway + ?Sized>(&self, gateway: &G) -> Result<bool, GatewayError> {
        let Some(owner) = &self.owner else {
            tracing::warn!("Ignoring save: no owner context");
            return Ok(false);
        };
        gateway.save(owner, &self.snapshot()).await?;
        tracing::debug!("Saved greeting metadata for {}", owner);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::InMemoryGateway;
    use std::sync::Mutex;

    fn owner() -> Option<OwnerId> {
        Some(OwnerId::new("card.png").unwrap())
    }

    fn greetings(head: &str, alternates: &[&str]) -> Greetings {
        Greetings::new(head, alternates.iter().map(|s| s.to_string()).collect())
    }

    fn session(alternates: &[&str]) -> GreetingSession {
        GreetingSession::new(owner(), greetings("Head", alternates), GreetingStore::new())
    }

    #[test]
    fn test_first_title_creates_record() {
        let mut session = session(&["Hello"]);
        assert!(session.identifier_at(Slot::Alternate(0)).is_none());

        let id = session.set_title(Slot::Alternate(0), "Greet").unwrap();

        let meta = session.meta_at(Slot::Alternate(0)).unwrap();
        assert_eq!(meta.id, id);
        assert_eq!(meta.title.as_deref(), Some("Greet"));
        assert_eq!(meta.content_hash, fingerprint("Hello"));
        assert!(session.store().check_invariants(1).is_ok());
    }

    #[test]
    fn test_set_text_keeps_metadata_attached() {
        let mut session = session(&["Hello"]);
        let id = session.set_title(Slot::Alternate(0), "Greet").unwrap();

        assert!(session.set_text(Slot::Alternate(0), "Hello, traveler"));

        assert_eq!(session.identifier_at(Slot::Alternate(0)), Some(&id));
        let meta = session.meta_at(Slot::Alternate(0)).unwrap();
        assert_eq!(meta.content_hash, fingerprint("Hello, traveler"));

        // Fast path on the next write keeps the same record
        session.set_description(Slot::Alternate(0), "Long form");
        assert_eq!(session.identifier_at(Slot::Alternate(0)), Some(&id));
        assert_eq!(session.store().records.len(), 1);
    }

    #[test]
    fn test_clearing_both_fields_drops_record() {
        let mut session = session(&["Hello"]);
        session.set_title(Slot::Alternate(0), "Greet");

        let result = session.set_title(Slot::Alternate(0), "");

        assert!(result.is_none());
        assert!(session.store().records.is_empty());
        assert!(session.store().positions.is_empty());
    }

    #[test]
    fn test_head_metadata() {
        let mut session = session(&["A"]);
        let id = session.set_title(Slot::Head, "Opening").unwrap();
        assert_eq!(session.identifier_at(Slot::Head), Some(&id));
        assert!(session.store().records.is_empty());

        session.set_text(Slot::Head, "New opening");
        assert_eq!(
            session.meta_at(Slot::Head).unwrap().content_hash,
            fingerprint("New opening")
        );
    }

    #[test]
    fn test_no_owner_ignores_metadata_writes() {
        let mut session = GreetingSession::new(None, greetings("H", &["A"]), GreetingStore::new());
        assert!(session.set_title(Slot::Alternate(0), "T").is_none());
        assert!(!session.record_use(Slot::Alternate(0)));
        assert!(session.store().records.is_empty());

        // Structural edits still apply
        assert!(session.swap_with_head());
        assert_eq!(session.greetings().head, "A");
    }

    #[tokio::test]
    async fn test_no_owner_save_is_noop() {
        let gateway = InMemoryGateway::new();
        let session = GreetingSession::open(&gateway, None, greetings("H", &[])).await.unwrap();
        assert!(!session.save(&gateway).await.unwrap());
    }

    #[test]
    fn test_remove_shifts_identity() {
        let mut session = session(&["A", "B"]);
        let id_a = session.set_title(Slot::Alternate(0), "First").unwrap();
        let id_b = session.set_title(Slot::Alternate(1), "Second").unwrap();

        assert!(session.remove_greeting(&id_a));

        assert_eq!(session.greetings().alternates, vec!["B"]);
        assert_eq!(session.identifier_at(Slot::Alternate(0)), Some(&id_b));
        // Non-empty record is kept for future matches
        assert!(session.store().records.contains_key(&id_a));
    }

    #[test]
    fn test_removed_record_rematches_when_text_returns() {
        let mut session = session(&["A", "B"]);
        let id_a = session.set_title(Slot::Alternate(0), "First").unwrap();
        session.remove_greeting(&id_a);

        let pushed = session.push_greeting("A");
        assert_ne!(pushed, id_a);

        // The orphaned record was inserted first, so a content resync picks it
        let report = session.resync();
        assert_eq!(session.identifier_at(Slot::Alternate(1)), Some(&id_a));
        assert!(report.rematched.contains(&1));
    }

    #[test]
    fn test_push_then_title() {
        let mut session = session(&[]);
        let id = session.push_greeting("Fresh");
        let titled = session.set_title(Slot::Alternate(0), "New").unwrap();
        assert_eq!(id, titled);
    }

    #[test]
    fn test_snapshot_strips_empty_records() {
        let mut session = session(&["A"]);
        let id = session.push_greeting("B");
        assert!(session.store().records.contains_key(&id));

        let snapshot = session.snapshot();
        assert!(snapshot.records.is_empty());
        assert!(snapshot.positions.is_empty());
        assert!(snapshot.check_invariants(2).is_ok());
    }

    #[test]
    fn test_move_and_swap_round_trip() {
        let mut session = session(&["A", "B"]);
        let head = session.set_title(Slot::Head, "Main").unwrap();
        let a = session.set_title(Slot::Alternate(0), "First").unwrap();

        assert_eq!(session.move_greeting(&a, -1), MoveOutcome::SwappedWithHead);
        assert_eq!(session.identifier_at(Slot::Head), Some(&a));
        assert_eq!(session.identifier_at(Slot::Alternate(0)), Some(&head));
        assert_eq!(session.greetings().head, "A");

        assert_eq!(session.move_greeting(&head, -1), MoveOutcome::SwappedWithHead);
        assert_eq!(session.identifier_at(Slot::Head), Some(&head));
        assert_eq!(session.greetings().head, "Head");
        assert_eq!(session.greetings().alternates, vec!["A", "B"]);
    }

    #[test]
    fn test_move_slot_out_of_range_is_noop() {
        let mut session = session(&["A"]);
        assert_eq!(session.move_slot(0, 1), MoveOutcome::Ignored);
        assert_eq!(session.move_slot(3, -1), MoveOutcome::Ignored);
    }

    #[test]
    fn test_record_use() {
        let mut session = session(&["A"]);
        session.set_title(Slot::Alternate(0), "T");
        assert!(session.record_use(Slot::Alternate(0)));
        let meta = session.meta_at(Slot::Alternate(0)).unwrap();
        assert_eq!(meta.use_count, 1);
        assert!(meta.last_used_ms.is_some());
    }

    #[test]
    fn test_replace_greetings_resyncs() {
        let mut session = session(&["A", "B"]);
        let a = session.set_title(Slot::Alternate(0), "First").unwrap();
        let b = session.set_title(Slot::Alternate(1), "Second").unwrap();

        session.replace_greetings(greetings("Head", &["B", "C", "A"]));

        assert_eq!(session.identifier_at(Slot::Alternate(0)), Some(&b));
        assert_eq!(session.identifier_at(Slot::Alternate(1)), None);
        assert_eq!(session.identifier_at(Slot::Alternate(2)), Some(&a));
    }

    #[test]
    fn test_events_emitted() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let _sub = bus.subscribe(move |event| {
            seen_clone.lock().unwrap().push(event.clone());
        });

        let mut session = session(&["A"]).with_events(Arc::clone(&bus));
        session.set_title(Slot::Alternate(0), "T");
        session.swap_with_head();

        let events = seen.lock().unwrap();
        assert!(matches!(events[0], MetadataEvent::RecordCreated { .. }));
        assert!(matches!(events[1], MetadataEvent::StoreChanged { .. }));
        assert!(matches!(events[2], MetadataEvent::HeadSwapped { .. }));
        assert!(matches!(events[3], MetadataEvent::StoreChanged { .. }));
    }

    #[tokio::test]
    async fn test_open_reconciles_loaded_store() {
        let gateway = InMemoryGateway::new();
        let mut first = GreetingSession::open(&gateway, owner(), greetings("H", &["A", "B"]))
            .await
            .unwrap();
        let a = first.set_title(Slot::Alternate(0), "First").unwrap();
        let b = first.set_title(Slot::Alternate(1), "Second").unwrap();
        assert!(first.save(&gateway).await.unwrap());

        // Host reordered the list while nothing was listening
        let second = GreetingSession::open(&gateway, owner(), greetings("H", &["B", "A"]))
            .await
            .unwrap();

        assert!(!second.load_report().trusted);
        assert_eq!(second.identifier_at(Slot::Alternate(0)), Some(&b));
        assert_eq!(second.identifier_at(Slot::Alternate(1)), Some(&a));
    }
}
