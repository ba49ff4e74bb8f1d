//! Persistence Layer Seams
//!
//! - [`PersistenceStore`] - async trait the external store implements
//! - [`InMemoryPersistenceStore`] - OCC reference implementation
//! - [`NodeEvent`] - change-notification contract
//! - [`StoreError`] - store errors, including version conflicts

mod error;
pub mod events;
mod memory_store;
mod persistence;

pub use error::StoreError;
pub use events::{HierarchyChangeType, InvalidationScope, NodeEvent, UpdateType};
pub use memory_store::{InMemoryPersistenceStore, WriteKind, WriteRecord};
pub use persistence::{PersistedWrite, PersistenceStore, UpdateSource};
