//! Position exchange: structural list edits applied to the text and the index
//! map in lock-step.
//!
//! The head slot is not part of the movable range. Moving position 0 up (or the
//! head down) exchanges the head with position 0 instead; both records keep
//! their identifiers and metadata, only their content positions change.
//!
//! Out-of-range requests are no-ops and report `Ignored` or `false`.

use crate::fingerprint::fingerprint;
use crate::greetings::Greetings;
use crate::id::GreetingId;
use crate::lifecycle;
use crate::store::{GreetingMeta, GreetingStore};
use std::collections::BTreeMap;

/// What a move request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Exchanged with a neighbouring alternate.
    Moved { from: usize, to: usize },
    /// Redirected to [`swap_with_head`].
    SwappedWithHead,
    /// Out of range or unknown; nothing changed.
    Ignored,
}

impl MoveOutcome {
    pub fn applied(&self) -> bool {
        !matches!(self, MoveOutcome::Ignored)
    }
}

fn swap_mappings(store: &mut GreetingStore, a: usize, b: usize) {
    let at_a = store.positions.remove(&a);
    let at_b = store.positions.remove(&b);
    if let Some(id) = at_a {
        store.positions.insert(b, id);
    }
    if let Some(id) = at_b {
        store.positions.insert(a, id);
    }
}

/// Exchange the head greeting with alternate position 0.
///
/// The head record moves into the record map at position 0 and the record
/// mapped at position 0 (if any) becomes the head record, with the head record
/// taking its place in record order. Applying it twice restores both slots and
/// the record order.
pub fn swap_with_head(greetings: &mut Greetings, store: &mut GreetingStore) -> bool {
    let Some(first) = greetings.alternates.first_mut() else {
        tracing::debug!("Swap with head ignored: no alternate greetings");
        return false;
    };
    std::mem::swap(&mut greetings.head, first);

    let incoming = store
        .positions
        .remove(&0)
        .and_then(|id| store.records.shift_remove_full(&id));
    if let Some(outgoing) = store.head.take() {
        store.positions.insert(0, outgoing.id.clone());
        // Take over the incoming record's slot so claim order is unchanged
        match incoming.as_ref().map(|(index, _, _)| *index) {
            Some(index) => {
                store.records.shift_insert(index, outgoing.id.clone(), outgoing);
            }
            None => {
                store.records.insert(outgoing.id.clone(), outgoing);
            }
        }
    }
    store.head = incoming.map(|(_, _, meta)| meta);

    tracing::debug!("Swapped head greeting with position 0");
    true
}

/// Move the greeting at `position` by `delta` (-1 or +1).
pub fn move_position(
    greetings: &mut Greetings,
    store: &mut GreetingStore,
    position: usize,
    delta: isize,
) -> MoveOutcome {
    if delta != -1 && delta != 1 {
        tracing::warn!("Unsupported move delta {}", delta);
        return MoveOutcome::Ignored;
    }
    if position >= greetings.len() {
        return MoveOutcome::Ignored;
    }
    if position == 0 && delta == -1 {
        return head_swap(greetings, store);
    }

    let target = position as isize + delta;
    if target < 0 || target as usize >= greetings.len() {
        return MoveOutcome::Ignored;
    }
    let target = target as usize;

    greetings.alternates.swap(position, target);
    swap_mappings(store, position, target);
    tracing::debug!("Moved greeting {} -> {}", position, target);
    MoveOutcome::Moved {
        from: position,
        to: target,
    }
}

fn head_swap(greetings: &mut Greetings, store: &mut GreetingStore) -> MoveOutcome {
    if swap_with_head(greetings, store) {
        MoveOutcome::SwappedWithHead
    } else {
        MoveOutcome::Ignored
    }
}

/// Move the greeting identified by `id` by `delta`.
///
/// Moving the head record down exchanges it with position 0.
pub fn move_by(
    greetings: &mut Greetings,
    store: &mut GreetingStore,
    id: &GreetingId,
    delta: isize,
) -> MoveOutcome {
    if store.is_head(id) {
        return if delta == 1 {
            head_swap(greetings, store)
        } else {
            MoveOutcome::Ignored
        };
    }
    match store.position_of(id) {
        Some(position) => move_position(greetings, store, position, delta),
        None => {
            tracing::debug!("Move ignored: {} is not mapped", id);
            MoveOutcome::Ignored
        }
    }
}

/// Append a greeting and give it a fresh identifier with an empty record.
///
/// The empty record is dropped by the next garbage collection unless metadata
/// is written for it first.
pub fn insert_at_end(greetings: &mut Greetings, store: &mut GreetingStore, text: String) -> GreetingId {
    let id = GreetingId::generate();
    let hash = fingerprint(&text);
    greetings.alternates.push(text);
    let position = greetings.len() - 1;

    store
        .records
        .insert(id.clone(), GreetingMeta::new(id.clone(), hash));
    store.positions.insert(position, id.clone());
    tracing::debug!("Inserted greeting {} at {}", id, position);
    id
}

/// Delete the greeting at `position` and shift later mappings down.
///
/// The removed greeting's record stays behind for future content matches
/// unless it is empty.
pub fn remove_position(greetings: &mut Greetings, store: &mut GreetingStore, position: usize) -> bool {
    if position >= greetings.len() {
        return false;
    }
    greetings.alternates.remove(position);

    let removed = store.positions.remove(&position);
    let shifted: BTreeMap<usize, GreetingId> = std::mem::take(&mut store.positions)
        .into_iter()
        .map(|(p, id)| if p > position { (p - 1, id) } else { (p, id) })
        .collect();
    store.positions = shifted;

    if let Some(id) = removed {
        if store.records.get(&id).is_some_and(lifecycle::is_empty) {
            store.records.shift_remove(&id);
            tracing::debug!("Dropped empty record {} with its greeting", id);
        } else {
            tracing::debug!("Record {} orphaned by removal", id);
        }
    }
    true
}

/// Delete the greeting identified by `id`.
pub fn remove(greetings: &mut Greetings, store: &mut GreetingStore, id: &GreetingId) -> bool {
    match store.position_of(id) {
        Some(position) => remove_position(greetings, store, position),
        None => false,
    }
}
