//! greeting-core: Content-identity reconciliation for greeting metadata.
//!
//! This crate provides the core functionality for:
//! - Fingerprinting greeting text and keeping stable identifiers per greeting
//! - Reconciling stored position mappings against the current greeting list
//! - Metadata record lifecycle (upsert, fingerprint refresh, garbage collection)
//! - Position exchange for moves, swaps with the head, inserts and removals
//! - The MetadataGateway trait for persisting one document per owner

pub mod events;
pub mod exchange;
pub mod fingerprint;
pub mod gateway;
pub mod greetings;
pub mod id;
pub mod lifecycle;
pub mod reconcile;
pub mod session;
pub mod store;

pub use events::{EventBus, MetadataEvent, SubscriberId};
pub use exchange::MoveOutcome;
pub use fingerprint::{Fingerprint, fingerprint};
pub use gateway::{GatewayError, InMemoryGateway, MetadataGateway};
pub use greetings::{Greetings, Slot};
pub use id::{GreetingId, IdError, OwnerId};
pub use lifecycle::MetaUpdate;
pub use reconcile::{ReconcileReport, Reconciler, Resolution, sync_all_positions};
pub use session::GreetingSession;
pub use store::{GreetingMeta, GreetingStore, StoreDocument, StoreError};
