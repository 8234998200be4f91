//! IdentityStore: metadata records plus the position → identifier map.
//!
//! Two layers:
//! - `StoreDocument` mirrors the persisted JSON exactly. Every field is optional
//!   and defaults to empty, so partial or older documents always load.
//! - `GreetingStore` is the typed working form with defaults applied.
//!
//! ```json
//! {
//!   "mainGreeting": { "id": "…", "title": "…", "description": "…", "contentHash": 0 },
//!   "greetings": { "<id>": { "id": "…", "title": "…", "contentHash": 0 } },
//!   "indexMap": { "0": "<id>" }
//! }
//! ```

use crate::fingerprint::Fingerprint;
use crate::id::GreetingId;
use crate::lifecycle;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Position {position} maps to unknown identifier {id}")]
    DanglingMapping { position: usize, id: GreetingId },

    #[error("Identifier {id} is mapped at more than one position")]
    DuplicateMapping { id: GreetingId },

    #[error("Position {position} is beyond the list (length {len})")]
    StalePosition { position: usize, len: usize },

    #[error("Record {id} carries no title or description")]
    EmptyRecord { id: GreetingId },
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Decode a field, treating `null` or a value of the wrong type like a missing
/// field.
fn lenient<'de, D, T>(d: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + DeserializeOwned,
{
    Ok(decode_or_default(Value::deserialize(d)?, "field"))
}

fn decode_or_default<T: Default + DeserializeOwned>(value: Value, what: &str) -> T {
    if value.is_null() {
        return T::default();
    }
    serde_json::from_value(value).unwrap_or_else(|e| {
        tracing::warn!("Ignoring malformed {}: {}", what, e);
        T::default()
    })
}

/// Decode the record map one record at a time; a record that is not an object
/// is skipped.
fn lenient_records<'de, D>(d: D) -> std::result::Result<IndexMap<String, MetaDocument>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = match Value::deserialize(d)? {
        Value::Object(entries) => entries,
        Value::Null => return Ok(IndexMap::new()),
        other => {
            tracing::warn!("Ignoring malformed greetings map: {}", other);
            return Ok(IndexMap::new());
        }
    };

    let mut records = IndexMap::with_capacity(entries.len());
    for (key, value) in entries {
        match serde_json::from_value::<MetaDocument>(value) {
            Ok(meta) => {
                records.insert(key, meta);
            }
            Err(e) => tracing::warn!("Skipping malformed record {}: {}", key, e),
        }
    }
    Ok(records)
}

/// Decode the index map, keeping only entries whose value is a string.
fn lenient_index<'de, D>(d: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = match Value::deserialize(d)? {
        Value::Object(entries) => entries,
        Value::Null => return Ok(BTreeMap::new()),
        other => {
            tracing::warn!("Ignoring malformed index map: {}", other);
            return Ok(BTreeMap::new());
        }
    };

    Ok(entries
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::String(id) => Some((key, id)),
            other => {
                tracing::warn!("Skipping malformed index entry {:?} -> {}", key, other);
                None
            }
        })
        .collect())
}

/// One record as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaDocument {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<i64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub use_count: Option<u64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub last_used: Option<u64>,
}

/// The persisted document for one owner.
///
/// Decoding never fails on a single bad field: mistyped values fall back to
/// their defaults and malformed records are dropped with a warning. Only text
/// that does not parse as a JSON document is rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDocument {
    #[serde(default, deserialize_with = "lenient")]
    pub main_greeting: MetaDocument,
    #[serde(default, deserialize_with = "lenient_records")]
    pub greetings: IndexMap<String, MetaDocument>,
    #[serde(default, deserialize_with = "lenient_index")]
    pub index_map: BTreeMap<String, String>,
}

/// User-authored metadata for one greeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GreetingMeta {
    pub id: GreetingId,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Fingerprint of the greeting text when this record was last written.
    pub content_hash: Fingerprint,
    pub use_count: u64,
    /// Last use, in milliseconds since Unix epoch.
    pub last_used_ms: Option<u64>,
}

impl GreetingMeta {
    /// A record with no title or description.
    pub fn new(id: GreetingId, content_hash: Fingerprint) -> Self {
        Self {
            id,
            title: None,
            description: None,
            content_hash,
            use_count: 0,
            last_used_ms: None,
        }
    }

    fn from_document(id: GreetingId, doc: &MetaDocument) -> Self {
        Self {
            id,
            title: doc.title.clone(),
            description: doc.description.clone(),
            content_hash: doc
                .content_hash
                .map(Fingerprint::from_raw)
                .unwrap_or(Fingerprint::EMPTY),
            use_count: doc.use_count.unwrap_or(0),
            last_used_ms: doc.last_used,
        }
    }

    fn to_document(&self) -> MetaDocument {
        MetaDocument {
            id: Some(self.id.to_string()),
            title: self.title.clone(),
            description: self.description.clone(),
            content_hash: Some(self.content_hash.as_i64()),
            use_count: (self.use_count > 0).then_some(self.use_count),
            last_used: self.last_used_ms,
        }
    }
}

/// Working identity state for one owner's greetings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GreetingStore {
    /// Metadata of the head slot. Lives outside `records`.
    pub head: Option<GreetingMeta>,
    /// Records keyed by identifier, in insertion order.
    pub records: IndexMap<GreetingId, GreetingMeta>,
    /// Alternate position → identifier.
    pub positions: BTreeMap<usize, GreetingId>,
}

impl GreetingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the typed store from a persisted document, applying defaults.
    ///
    /// Unparseable identifiers and position keys are skipped. A record's map key
    /// wins over its embedded `id` field.
    pub fn from_document(doc: &StoreDocument) -> Self {
        let head = {
            let main = &doc.main_greeting;
            let parsed_id = main.id.as_deref().and_then(|s| s.parse::<GreetingId>().ok());
            match parsed_id {
                Some(id) => Some(GreetingMeta::from_document(id, main)),
                None => {
                    let meta = GreetingMeta::from_document(GreetingId::generate(), main);
                    (!lifecycle::is_empty(&meta)).then_some(meta)
                }
            }
        };

        let mut records = IndexMap::with_capacity(doc.greetings.len());
        for (key, meta_doc) in &doc.greetings {
            let Ok(id) = key.parse::<GreetingId>() else {
                tracing::warn!("Skipping record with blank identifier");
                continue;
            };
            if let Some(embedded) = &meta_doc.id {
                if embedded != key {
                    tracing::debug!("Record {} embeds mismatched id {}", key, embedded);
                }
            }
            records.insert(id.clone(), GreetingMeta::from_document(id, meta_doc));
        }

        let mut positions = BTreeMap::new();
        for (key, value) in &doc.index_map {
            match (key.parse::<usize>(), value.parse::<GreetingId>()) {
                (Ok(position), Ok(id)) => {
                    positions.insert(position, id);
                }
                _ => tracing::warn!("Skipping malformed index entry {:?} -> {:?}", key, value),
            }
        }

        Self {
            head,
            records,
            positions,
        }
    }

    /// Convert to the persisted document shape.
    pub fn to_document(&self) -> StoreDocument {
        StoreDocument {
            main_greeting: self
                .head
                .as_ref()
                .map(GreetingMeta::to_document)
                .unwrap_or_default(),
            greetings: self
                .records
                .iter()
                .map(|(id, meta)| (id.to_string(), meta.to_document()))
                .collect(),
            index_map: self
                .positions
                .iter()
                .map(|(position, id)| (position.to_string(), id.to_string()))
                .collect(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let doc: StoreDocument = serde_json::from_str(json)?;
        Ok(Self::from_document(&doc))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_document())?)
    }

    pub fn id_at(&self, position: usize) -> Option<&GreetingId> {
        self.positions.get(&position)
    }

    /// Position currently mapped to `id`, if any.
    pub fn position_of(&self, id: &GreetingId) -> Option<usize> {
        self.positions
            .iter()
            .find_map(|(position, mapped)| (mapped == id).then_some(*position))
    }

    pub fn is_head(&self, id: &GreetingId) -> bool {
        self.head.as_ref().is_some_and(|head| &head.id == id)
    }

    /// Look up a record by identifier, including the head record.
    pub fn record(&self, id: &GreetingId) -> Option<&GreetingMeta> {
        self.records
            .get(id)
            .or_else(|| self.head.as_ref().filter(|head| &head.id == id))
    }

    pub fn record_mut(&mut self, id: &GreetingId) -> Option<&mut GreetingMeta> {
        if let Some(record) = self.records.get_mut(id) {
            return Some(record);
        }
        self.head.as_mut().filter(|head| &head.id == id)
    }

    /// Record mapped at an alternate position.
    pub fn meta_at(&self, position: usize) -> Option<&GreetingMeta> {
        self.id_at(position).and_then(|id| self.record(id))
    }

    /// Repair the position map against the current list length.
    ///
    /// Drops positions past the end, mappings to unknown identifiers, and every
    /// claim of an identifier after its lowest position. Returns how many
    /// mappings were dropped.
    pub fn normalize(&mut self, alternate_count: usize) -> usize {
        let before = self.positions.len();
        let mut seen = HashSet::new();
        let head_id = self.head.as_ref().map(|head| head.id.clone());
        let records = &self.records;

        self.positions.retain(|position, id| {
            *position < alternate_count
                && (records.contains_key(id) || head_id.as_ref() == Some(id))
                && seen.insert(id.clone())
        });

        let dropped = before - self.positions.len();
        if dropped > 0 {
            tracing::debug!("Dropped {} stale index entries", dropped);
        }
        dropped
    }

    /// Report the first violated store invariant.
    pub fn check_invariants(&self, alternate_count: usize) -> Result<()> {
        let mut seen = HashSet::new();
        for (position, id) in &self.positions {
            if *position >= alternate_count {
                return Err(StoreError::StalePosition {
                    position: *position,
                    len: alternate_count,
                });
            }
            if !self.records.contains_key(id) && !self.is_head(id) {
                return Err(StoreError::DanglingMapping {
                    position: *position,
                    id: id.clone(),
                });
            }
            if !seen.insert(id) {
                return Err(StoreError::DuplicateMapping { id: id.clone() });
            }
        }
        for (id, record) in &self.records {
            if lifecycle::is_empty(record) {
                return Err(StoreError::EmptyRecord { id: id.clone() });
            }
        }
        Ok(())
    }
}
