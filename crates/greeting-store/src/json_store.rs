//! JSON-file persistence gateway using tokio::fs.
//!
//! Each owner gets one document at `<dir>/<fnv1a-hex(owner)>.json`. Hashing
//! the owner keeps arbitrary owner names (paths, avatars, unicode) out of the
//! filesystem namespace.

use async_trait::async_trait;
use greeting_core::gateway::{GatewayError, MetadataGateway, Result};
use greeting_core::{GreetingStore, OwnerId};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Metadata gateway storing one pretty-printed JSON file per owner.
pub struct JsonFileGateway {
    dir: PathBuf,
}

impl JsonFileGateway {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the document for `owner`.
    pub fn path_for(&self, owner: &OwnerId) -> PathBuf {
        self.dir.join(format!("{}.json", owner_hash(owner.as_str())))
    }
}

#[async_trait]
impl MetadataGateway for JsonFileGateway {
    async fn load(&self, owner: &OwnerId) -> Result<GreetingStore> {
        let path = self.path_for(owner);
        let json = match fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("No metadata document for {}, starting empty", owner);
                return Ok(GreetingStore::default());
            }
            Err(e) => return Err(GatewayError::Io(e.to_string())),
        };

        GreetingStore::from_json(&json).map_err(|source| GatewayError::Malformed {
            owner: owner.to_string(),
            source,
        })
    }

    async fn save(&self, owner: &OwnerId, store: &GreetingStore) -> Result<()> {
        let json = store
            .to_json()
            .map_err(|e| GatewayError::Io(e.to_string()))?;

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| GatewayError::Io(e.to_string()))?;

        // Write to a sibling temp file and rename so readers never see a torn document
        let path = self.path_for(owner);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json.as_bytes())
            .await
            .map_err(|e| GatewayError::Io(e.to_string()))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| GatewayError::Io(e.to_string()))?;

        tracing::debug!("Wrote {}", path.display());
        Ok(())
    }
}

/// FNV-1a hash of the owner name as 16 hex digits.
fn owner_hash(owner: &str) -> String {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let mut hash = FNV_OFFSET;
    for byte in owner.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    format!("{:016x}", hash)
}
