//! greeting-store: Native persistence for greeting metadata.
//!
//! Provides the JSON-file gateway, the debounced save task, environment
//! configuration and logging setup. The reconciliation logic itself lives in
//! greeting-core.

pub mod config;
pub mod debounce;
pub mod json_store;
pub mod logging;

pub use config::{ConfigError, StoreConfig};
pub use debounce::DebouncedSaver;
pub use json_store::JsonFileGateway;

use anyhow::{Context, Result};
use greeting_core::{GreetingSession, Greetings, OwnerId};
use std::sync::Arc;

/// A file gateway plus the saver writing through it.
pub struct MetadataHost {
    gateway: Arc<JsonFileGateway>,
    saver: DebouncedSaver,
}

impl MetadataHost {
    /// Start the save task for `config`. Must be called inside a tokio runtime.
    pub fn start(config: &StoreConfig) -> Self {
        let gateway = Arc::new(JsonFileGateway::new(config.meta_dir.clone()));
        let saver = DebouncedSaver::spawn(Arc::clone(&gateway), config.debounce);
        tracing::info!(
            "Greeting metadata in {} (debounce {:?})",
            config.meta_dir.display(),
            config.debounce
        );
        Self { gateway, saver }
    }

    /// Load configuration from the environment and start.
    pub fn from_env() -> Result<Self> {
        let config = StoreConfig::from_env().context("Failed to load greeting metadata config")?;
        Ok(Self::start(&config))
    }

    pub fn gateway(&self) -> &JsonFileGateway {
        &self.gateway
    }

    /// Open an editing session for `owner`, reconciling the stored metadata
    /// against `greetings`.
    pub async fn open(&self, owner: Option<OwnerId>, greetings: Greetings) -> Result<GreetingSession> {
        let label = owner.as_ref().map(OwnerId::to_string).unwrap_or_default();
        let session = GreetingSession::open(self.gateway.as_ref(), owner, greetings)
            .await
            .with_context(|| format!("Failed to load greeting metadata for '{}'", label))?;

        let report = session.load_report();
        if report.has_changes() {
            tracing::info!(
                "Reconciled greeting metadata for '{}': {} kept, {} rematched, {} unmapped",
                label,
                report.kept.len(),
                report.rematched.len(),
                report.unmapped.len()
            );
        }
        Ok(session)
    }

    /// Schedule a debounced save of the session's current snapshot.
    ///
    /// Returns false without an owner.
    pub fn schedule(&self, session: &GreetingSession) -> bool {
        match session.owner() {
            Some(owner) => {
                self.saver.schedule(owner.clone(), session.snapshot());
                true
            }
            None => {
                tracing::warn!("Ignoring save: no owner context");
                false
            }
        }
    }

    /// Write any pending snapshot now.
    pub async fn flush(&self) {
        self.saver.flush().await;
    }

    /// Flush and stop the save task.
    pub async fn shutdown(self) {
        self.saver.shutdown().await;
    }
}
