//! Metadata lifecycle: lazy creation, merge updates, and emptiness-based
//! garbage collection.
//!
//! A record exists only while it carries a title or a description. Every
//! metadata write ends with [`garbage_collect`], which drops records that no
//! longer do and any index entry pointing at them.

use crate::fingerprint::Fingerprint;
use crate::greetings::Slot;
use crate::id::GreetingId;
use crate::store::{GreetingMeta, GreetingStore};

/// Partial update of a record. `None` leaves a field unchanged; a blank
/// string clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
}

impl MetaUpdate {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            description: None,
        }
    }

    pub fn description(description: impl Into<String>) -> Self {
        Self {
            title: None,
            description: Some(description.into()),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_noop(&self) -> bool {
        self.title.is_none() && self.description.is_none()
    }
}

/// Result of an [`upsert`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Upsert {
    /// A new record was created for the identifier.
    pub created: bool,
    /// Records removed by the garbage collection that followed.
    pub collected: Vec<GreetingId>,
}

fn is_unset(field: &Option<String>) -> bool {
    field.as_deref().is_none_or(|s| s.trim().is_empty())
}

/// True when the record has neither a title nor a description.
///
/// The fingerprint and usage counters do not count as data.
pub fn is_empty(meta: &GreetingMeta) -> bool {
    is_unset(&meta.title) && is_unset(&meta.description)
}

fn merge_field(field: &mut Option<String>, update: Option<String>) {
    if let Some(value) = update {
        *field = (!value.trim().is_empty()).then_some(value);
    }
}

fn apply(meta: &mut GreetingMeta, updates: MetaUpdate, content_hash: Fingerprint) {
    merge_field(&mut meta.title, updates.title);
    merge_field(&mut meta.description, updates.description);
    meta.content_hash = content_hash;
}

/// Merge `updates` into the record for `id`, creating it if absent.
///
/// The stored fingerprint is always replaced by `content_hash`, the fingerprint
/// of the greeting's current text. The head record is updated in place and is
/// not subject to collection.
pub fn upsert(
    store: &mut GreetingStore,
    id: &GreetingId,
    updates: MetaUpdate,
    content_hash: Fingerprint,
) -> Upsert {
    let mut created = false;

    if store.is_head(id) {
        if let Some(head) = store.head.as_mut() {
            apply(head, updates, content_hash);
        }
    } else {
        let record = store.records.entry(id.clone()).or_insert_with(|| {
            created = true;
            GreetingMeta::new(id.clone(), content_hash)
        });
        apply(record, updates, content_hash);
    }

    if created {
        tracing::debug!("Created metadata record {}", id);
    }

    Upsert {
        created,
        collected: garbage_collect(store),
    }
}

/// Remove every empty record and every index entry that no longer resolves.
///
/// Idempotent. Returns the identifiers of removed records.
pub fn garbage_collect(store: &mut GreetingStore) -> Vec<GreetingId> {
    let mut collected = Vec::new();
    store.records.retain(|id, meta| {
        if is_empty(meta) {
            collected.push(id.clone());
            false
        } else {
            true
        }
    });

    let head_id = store.head.as_ref().map(|head| head.id.clone());
    let records = &store.records;
    store
        .positions
        .retain(|_, id| records.contains_key(id) || head_id.as_ref() == Some(id));

    if !collected.is_empty() {
        tracing::debug!("Collected {} empty metadata record(s)", collected.len());
    }
    collected
}

/// Update only the stored fingerprint of the record at `slot`.
///
/// Used when the greeting's text changes but its metadata should stay with it.
/// Does not search for other matches and does not collect. Returns false when
/// nothing is mapped at `slot`.
pub fn refresh_fingerprint_only(
    store: &mut GreetingStore,
    slot: Slot,
    content_hash: Fingerprint,
) -> bool {
    let record = match slot {
        Slot::Head => store.head.as_mut(),
        Slot::Alternate(position) => match store.positions.get(&position).cloned() {
            Some(id) => store.record_mut(&id),
            None => None,
        },
    };

    match record {
        Some(record) => {
            record.content_hash = content_hash;
            true
        }
        None => false,
    }
}

/// Bump the usage counters of the record at `slot`, if there is one.
pub fn record_use(store: &mut GreetingStore, slot: Slot, now_ms: u64) -> bool {
    let record = match slot {
        Slot::Head => store.head.as_mut(),
        Slot::Alternate(position) => match store.positions.get(&position).cloned() {
            Some(id) => store.record_mut(&id),
            None => None,
        },
    };

    match record {
        Some(record) => {
            record.use_count += 1;
            record.last_used_ms = Some(now_ms);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;

    fn id(s: &str) -> GreetingId {
        s.parse().unwrap()
    }

    #[test]
    fn test_is_empty() {
        let mut meta = GreetingMeta::new(id("a"), fingerprint("x"));
        assert!(is_empty(&meta));
        meta.title = Some("  ".into());
        assert!(is_empty(&meta));
        meta.description = Some("Formal".into());
        assert!(!is_empty(&meta));
    }

    #[test]
    fn test_usage_does_not_count_as_data() {
        let mut meta = GreetingMeta::new(id("a"), fingerprint("x"));
        meta.use_count = 12;
        meta.last_used_ms = Some(99);
        assert!(is_empty(&meta));
    }

    #[test]
    fn test_upsert_creates_record() {
        let mut store = GreetingStore::new();
        let outcome = upsert(&mut store, &id("a"), MetaUpdate::title("Greet"), fingerprint("Hello"));

        assert!(outcome.created);
        assert!(outcome.collected.is_empty());
        let record = store.record(&id("a")).unwrap();
        assert_eq!(record.title.as_deref(), Some("Greet"));
        assert_eq!(record.content_hash, fingerprint("Hello"));
    }

    #[test]
    fn test_upsert_merges_and_refreshes_fingerprint() {
        let mut store = GreetingStore::new();
        upsert(&mut store, &id("a"), MetaUpdate::title("Greet"), fingerprint("old"));
        let outcome = upsert(
            &mut store,
            &id("a"),
            MetaUpdate::description("Warm"),
            fingerprint("new"),
        );

        assert!(!outcome.created);
        let record = store.record(&id("a")).unwrap();
        assert_eq!(record.title.as_deref(), Some("Greet"));
        assert_eq!(record.description.as_deref(), Some("Warm"));
        assert_eq!(record.content_hash, fingerprint("new"));
    }

    #[test]
    fn test_upsert_with_empty_update_collects_new_record() {
        let mut store = GreetingStore::new();
        store.positions.insert(0, id("a"));
        let outcome = upsert(&mut store, &id("a"), MetaUpdate::default(), fingerprint("x"));

        assert!(outcome.created);
        assert_eq!(outcome.collected, vec![id("a")]);
        assert!(store.records.is_empty());
        assert!(store.positions.is_empty());
    }

    #[test]
    fn test_clearing_title_collects_record_and_mapping() {
        let mut store = GreetingStore::new();
        upsert(&mut store, &id("a"), MetaUpdate::title("Casual"), fingerprint("Hi"));
        store.positions.insert(2, id("a"));

        let outcome = upsert(&mut store, &id("a"), MetaUpdate::title(""), fingerprint("Hi"));

        assert_eq!(outcome.collected, vec![id("a")]);
        assert!(store.record(&id("a")).is_none());
        assert!(store.id_at(2).is_none());
    }

    #[test]
    fn test_upsert_updates_head_in_place() {
        let mut store = GreetingStore::new();
        store.head = Some(GreetingMeta::new(id("head"), fingerprint("Hello")));

        let outcome = upsert(&mut store, &id("head"), MetaUpdate::title("Main"), fingerprint("Hi"));

        assert!(!outcome.created);
        assert!(store.records.is_empty());
        let head = store.head.as_ref().unwrap();
        assert_eq!(head.title.as_deref(), Some("Main"));
        assert_eq!(head.content_hash, fingerprint("Hi"));
    }

    #[test]
    fn test_garbage_collect_idempotent() {
        let mut store = GreetingStore::new();
        upsert(&mut store, &id("keep"), MetaUpdate::title("Keep"), fingerprint("k"));
        store.records.insert(id("drop"), GreetingMeta::new(id("drop"), fingerprint("d")));
        store.positions.insert(0, id("keep"));
        store.positions.insert(1, id("drop"));
        store.positions.insert(2, id("ghost"));

        let first = garbage_collect(&mut store);
        let after_once = store.clone();
        let second = garbage_collect(&mut store);

        assert_eq!(first, vec![id("drop")]);
        assert!(second.is_empty());
        assert_eq!(store, after_once);
        assert_eq!(store.positions.len(), 1);
        assert_eq!(store.id_at(0), Some(&id("keep")));
    }

    #[test]
    fn test_garbage_collect_keeps_head_mapping() {
        let mut store = GreetingStore::new();
        store.head = Some(GreetingMeta::new(id("head"), fingerprint("h")));
        store.positions.insert(0, id("head"));
        garbage_collect(&mut store);
        assert_eq!(store.id_at(0), Some(&id("head")));
        assert!(store.head.is_some());
    }

    #[test]
    fn test_refresh_fingerprint_only() {
        let mut store = GreetingStore::new();
        store.records.insert(id("a"), GreetingMeta::new(id("a"), fingerprint("old")));
        store.positions.insert(1, id("a"));

        assert!(refresh_fingerprint_only(&mut store, Slot::Alternate(1), fingerprint("new")));
        assert!(!refresh_fingerprint_only(&mut store, Slot::Alternate(0), fingerprint("new")));

        let record = store.record(&id("a")).unwrap();
        assert_eq!(record.content_hash, fingerprint("new"));
        // Empty record survives: refresh does not collect
        assert_eq!(store.records.len(), 1);
    }

    #[test]
    fn test_record_use() {
        let mut store = GreetingStore::new();
        upsert(&mut store, &id("a"), MetaUpdate::title("T"), fingerprint("x"));
        store.positions.insert(0, id("a"));

        assert!(record_use(&mut store, Slot::Alternate(0), 10));
        assert!(record_use(&mut store, Slot::Alternate(0), 20));
        assert!(!record_use(&mut store, Slot::Head, 30));

        let record = store.record(&id("a")).unwrap();
        assert_eq!(record.use_count, 2);
        assert_eq!(record.last_used_ms, Some(20));
    }
}
