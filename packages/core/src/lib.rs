//! NodeSpace Hierarchy Manager
//!
//! In-memory node hierarchy for the NodeSpace outliner: ordering siblings,
//! structural editing, debounced content edits, and dependency-ordered
//! persistence to an external store.
//!
//! # Architecture
//!
//! - **Sibling chain**: order is encoded by `before_sibling_id` pointers, resolved
//!   and cached per parent
//! - **Explicit store**: one `Arc<NodeStore>` per session, shared by every viewer
//! - **Transactional mutations**: structural ops commit under a single write lock,
//!   then notify listeners
//! - **Ordered persistence**: writes flush only after the writes they reference
//!
//! # Modules
//!
//! - [`models`] - `Node`, `UiState`, typed wrappers
//! - [`db`] - persistence contract, events, in-memory reference store
//! - [`services`] - NodeStore, resolver, mutator, scheduler, projector
//! - [`operations`] - operation errors and creation parameters
//! - [`config`] - debounce and channel tunables
//!
//! # Example
//!
//! ```rust
//! use nodespace_hierarchy::db::InMemoryPersistenceStore;
//! use nodespace_hierarchy::models::{HydrationOptions, Node};
//! use nodespace_hierarchy::services::{
//!     HierarchyMutator, NodeStore, PersistenceScheduler, ViewProjector,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let store = Arc::new(NodeStore::new());
//! let a = Node::new_with_id("A".into(), "text".into(), "First".into(), None, json!({}));
//! let b = Node::new_with_id("B".into(), "text".into(), "Second".into(), None, json!({}))
//!     .with_before_sibling(Some("A".into()));
//! store.hydrate(vec![a, b], &HydrationOptions::default());
//!
//! let persistence = Arc::new(InMemoryPersistenceStore::new());
//! let scheduler = Arc::new(PersistenceScheduler::new(persistence, store.clone()));
//! let mutator = HierarchyMutator::new(store.clone(), scheduler.clone());
//! assert!(mutator.indent("B"));
//!
//! let projector = ViewProjector::new(store);
//! assert_eq!(projector.visible_ids(None), vec!["A", "B"]);
//! assert_eq!(scheduler.pending_count(), 1);
//! ```

pub mod config;
pub mod db;
pub mod models;
pub mod operations;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::HierarchyConfig;
pub use db::{
    InMemoryPersistenceStore, NodeEvent, PersistedWrite, PersistenceStore, StoreError,
    UpdateSource,
};
pub use models::*;
pub use operations::{CreateNodeParams, NodeOperationError};
pub use services::*;
