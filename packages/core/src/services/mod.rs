//! Hierarchy Services
//!
//! - `NodeStore` - authoritative in-memory forest with UI state and notification
//! - `SiblingOrderResolver` - chain ordering with per-parent cache
//! - `HierarchyMutator` - structural operations (create, indent, outdent, combine, delete)
//! - `PersistenceScheduler` - dependency-ordered writes to the external store
//! - `DebounceScheduler` - per-key cancellable timers for content edits
//! - `ViewProjector` - flattened, expansion-aware view of a subtree
//!
//! Everything here is synchronous except persistence, which is driven by
//! [`PersistenceScheduler::flush_all`] or the background [`PersistenceWorker`].

pub mod debounce;
pub mod hierarchy_mutator;
pub mod node_store;
pub mod persistence_scheduler;
pub mod sibling_order;
pub mod view_projector;

#[cfg(test)]
mod hierarchy_mutator_test;

pub use debounce::DebounceScheduler;
pub use hierarchy_mutator::{ContentTier, HierarchyMutator};
pub use node_store::{NodeStore, StoreSnapshot, StoreTxn, Subscription};
pub use persistence_scheduler::{
    FlushReport, ParkedWrite, PendingWrite, PersistenceScheduler, PersistenceWorker,
};
pub use sibling_order::{
    resolve_sibling_order, CacheStats, ChainIntegrityIssue, SiblingLookup, SiblingOrderResolver,
    SortedChildren,
};
pub use view_projector::{ProjectedNode, ViewProjector};
