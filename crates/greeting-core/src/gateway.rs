//! Persistence gateway: durable read/write of one owner's metadata document.
//!
//! Implementations:
//! - `InMemoryGateway` - For testing (stores serialized JSON)
//! - `JsonFileGateway` (in greeting-store) - One JSON file per owner on disk
//!
//! Saves replace the whole document; a later save always supersedes an earlier
//! one. Loading an owner that was never saved yields the empty store.

use crate::id::OwnerId;
use crate::store::{GreetingStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Malformed metadata document for {owner}: {source}")]
    Malformed {
        owner: String,
        #[source]
        source: StoreError,
    },

    #[error("IO error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Host-supplied storage for metadata documents, keyed by owner.
#[async_trait]
pub trait MetadataGateway: Send + Sync {
    /// Fetch the store for `owner`. Missing documents load as empty.
    async fn load(&self, owner: &OwnerId) -> Result<GreetingStore>;

    /// Replace the stored document for `owner`.
    async fn save(&self, owner: &OwnerId, store: &GreetingStore) -> Result<()>;
}

/// In-memory gateway for testing.
#[derive(Default)]
pub struct InMemoryGateway {
    documents: RwLock<HashMap<OwnerId, String>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a raw JSON document (may be partial or malformed).
    pub fn insert_raw(&self, owner: &OwnerId, json: impl Into<String>) {
        self.documents
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(owner.clone(), json.into());
    }

    /// The raw JSON last saved for `owner`.
    pub fn raw(&self, owner: &OwnerId) -> Option<String> {
        self.documents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(owner)
            .cloned()
    }
}

#[async_trait]
impl MetadataGateway for InMemoryGateway {
    async fn load(&self, owner: &OwnerId) -> Result<GreetingStore> {
        match self.raw(owner) {
            Some(json) => GreetingStore::from_json(&json).map_err(|source| GatewayError::Malformed {
                owner: owner.to_string(),
                source,
            }),
            None => Ok(GreetingStore::default()),
        }
    }

    async fn save(&self, owner: &OwnerId, store: &GreetingStore) -> Result<()> {
        let json = store.to_json().map_err(|e| GatewayError::Io(e.to_string()))?;
        self.insert_raw(owner, json);
        Ok(())
    }
}

// Share one gateway between sessions and a background saver
#[async_trait]
impl<T: MetadataGateway + ?Sized> MetadataGateway for std::sync::Arc<T> {
    async fn load(&self, owner: &OwnerId) -> Result<GreetingStore> {
        (**self).load(owner).await
    }

    async fn save(&self, owner: &OwnerId, store: &GreetingStore) -> Result<()> {
        (**self).save(owner, store).await
    }
}
