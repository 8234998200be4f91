//! Reconciler: assigns identifiers to alternate positions by content fingerprint.
//!
//! The stored index map is a cache. When the text at a position still hashes to
//! its record's fingerprint the mapping is trusted; otherwise records are
//! searched by fingerprint in insertion order and each record can be claimed by
//! at most one position per pass.
//!
//! Identical texts produce identical fingerprints, so duplicates are told apart
//! only by claim order: the first unclaimed record wins.

use crate::fingerprint::{Fingerprint, fingerprint};
use crate::greetings::Greetings;
use crate::id::GreetingId;
use crate::store::GreetingStore;
use std::collections::{BTreeMap, HashSet};

/// Outcome of resolving one position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub id: GreetingId,
    /// No record matched; the caller must create one before it is persisted.
    pub is_new: bool,
}

/// Claim tracking for one reconciliation pass.
#[derive(Debug, Default)]
pub struct Reconciler {
    claimed: HashSet<GreetingId>,
}

impl Reconciler {
    /// Start a pass with nothing claimed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a single lookup at `position` against a live store.
    ///
    /// Identifiers mapped at every other position count as claimed, so the
    /// lookup cannot take over a live mapping.
    pub fn for_store(store: &GreetingStore, position: usize) -> Self {
        let claimed = store
            .positions
            .iter()
            .filter(|(other, _)| **other != position)
            .map(|(_, id)| id.clone())
            .collect();
        Self { claimed }
    }

    pub fn is_claimed(&self, id: &GreetingId) -> bool {
        self.claimed.contains(id)
    }

    /// Find the first unclaimed record with `hash` and claim it.
    pub fn claim_match(&mut self, hash: Fingerprint, store: &GreetingStore) -> Option<GreetingId> {
        let id = store
            .records
            .iter()
            .find(|(id, meta)| meta.content_hash == hash && !self.claimed.contains(*id))
            .map(|(id, _)| id.clone())?;
        self.claimed.insert(id.clone());
        Some(id)
    }

    /// Resolve the identifier for `position` given its current text.
    ///
    /// 1. The mapped record still matches the text: return it without scanning.
    /// 2. Otherwise claim the first unclaimed record with the same fingerprint.
    /// 3. Otherwise generate a fresh identifier (`is_new`).
    pub fn resolve_identifier(
        &mut self,
        position: usize,
        text: &str,
        store: &GreetingStore,
    ) -> Resolution {
        let hash = fingerprint(text);

        if let Some(id) = store.id_at(position) {
            let matches = store
                .record(id)
                .is_some_and(|meta| meta.content_hash == hash);
            if matches && !self.claimed.contains(id) {
                self.claimed.insert(id.clone());
                return Resolution {
                    id: id.clone(),
                    is_new: false,
                };
            }
        }

        if let Some(id) = self.claim_match(hash, store) {
            tracing::debug!("Position {} matched record {} by content", position, id);
            return Resolution { id, is_new: false };
        }

        let id = GreetingId::generate();
        self.claimed.insert(id.clone());
        Resolution { id, is_new: true }
    }
}

/// Rebuild the whole position map from content alone.
///
/// Ignores the current index map. Positions without a matching record stay
/// unmapped.
pub fn sync_all_positions(greetings: &Greetings, store: &GreetingStore) -> BTreeMap<usize, GreetingId> {
    let mut reconciler = Reconciler::new();
    greetings
        .alternates
        .iter()
        .enumerate()
        .filter_map(|(position, text)| {
            reconciler
                .claim_match(fingerprint(text), store)
                .map(|id| (position, id))
        })
        .collect()
}

/// Report from [`reconcile_on_load`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// The stored index map matched the content and was kept as-is.
    pub trusted: bool,
    /// Positions whose identifier did not change.
    pub kept: Vec<usize>,
    /// Positions that gained or changed an identifier.
    pub rematched: Vec<usize>,
    /// Mappings that were dropped without replacement.
    pub dropped: Vec<usize>,
    /// Positions with no identifier after reconciliation.
    pub unmapped: Vec<usize>,
}

impl ReconcileReport {
    pub fn has_changes(&self) -> bool {
        !self.rematched.is_empty() || !self.dropped.is_empty()
    }
}

/// True when the stored index map can be used as-is: every entry is in range,
/// resolves to a record whose fingerprint matches its text, and no identifier
/// is mapped twice. An unmapped position whose text matches an unclaimed
/// record also disqualifies the map, since a content search would attach it.
fn index_map_matches(greetings: &Greetings, store: &GreetingStore) -> bool {
    let mut claimed = HashSet::new();
    let entries_match = store.positions.iter().all(|(position, id)| {
        let text_matches = match (greetings.alternates.get(*position), store.record(id)) {
            (Some(text), Some(meta)) => meta.content_hash == fingerprint(text),
            _ => false,
        };
        text_matches && claimed.insert(id.clone())
    });
    if !entries_match {
        return false;
    }

    let mut reconciler = Reconciler { claimed };
    greetings
        .alternates
        .iter()
        .enumerate()
        .filter(|(position, _)| !store.positions.contains_key(position))
        .all(|(_, text)| reconciler.claim_match(fingerprint(text), store).is_none())
}

/// Bring a freshly loaded store in line with the current greetings.
///
/// Keeps the stored index map only if every entry still matches its text and
/// no unmapped position could claim a stored record; otherwise replaces it with
/// [`sync_all_positions`].
pub fn reconcile_on_load(greetings: &Greetings, store: &mut GreetingStore) -> ReconcileReport {
    reconcile(greetings, store, false)
}

/// Rebuild the index map from content unconditionally, after a bulk change.
pub fn resync(greetings: &Greetings, store: &mut GreetingStore) -> ReconcileReport {
    reconcile(greetings, store, true)
}

fn reconcile(greetings: &Greetings, store: &mut GreetingStore, force: bool) -> ReconcileReport {
    let before = store.positions.clone();
    let trusted = !force && index_map_matches(greetings, store);
    store.normalize(greetings.len());
    if !trusted {
        store.positions = sync_all_positions(greetings, store);
    }

    let mut report = ReconcileReport {
        trusted,
        ..Default::default()
    };
    for position in 0..greetings.len() {
        match (before.get(&position), store.positions.get(&position)) {
            (Some(old), Some(new)) if old == new => report.kept.push(position),
            (_, Some(_)) => report.rematched.push(position),
            (Some(_), None) => {
                report.dropped.push(position);
                report.unmapped.push(position);
            }
            (None, None) => report.unmapped.push(position),
        }
    }
    report.dropped.extend(before.keys().filter(|p| **p >= greetings.len()));

    if trusted {
        tracing::debug!("Index map trusted for {} position(s)", report.kept.len());
    } else {
        tracing::info!(
            "Re-synced index map: {} kept, {} rematched, {} unmapped",
            report.kept.len(),
            report.rematched.len(),
            report.unmapped.len()
        );
    }
    report
}
