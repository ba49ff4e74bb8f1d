//! PersistenceStore Trait - External Store Abstraction
//!
//! The hierarchy manager never owns durable storage. It writes through this
//! trait, which an embedding application implements on top of its database.
//!
//! # Design Decisions
//!
//! 1. **Async-First**: writes are decoupled from mutations and land later
//! 2. **Ownership Semantics**: `set` takes the node by value
//! 3. **OCC**: `set` from a viewer is accepted only when `node.version` equals the
//!    store's current version; the store returns the record with its new version
//! 4. **Source Discriminator**: every write says where it came from

use crate::db::StoreError;
use crate::models::{DeleteResult, Node};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Origin of a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateSource {
    /// A local edit from a viewer; written back with a version check
    Viewer,
    /// Loaded from the store (hydration); already durable, never written back
    Database,
    /// Another actor changed the store; applied locally, never written back
    External,
}

impl UpdateSource {
    /// Whether a change from this source must be written to the store
    pub fn requires_write_back(self) -> bool {
        matches!(self, UpdateSource::Viewer)
    }

    /// Whether the store compares versions for a write from this source
    pub fn checks_version(self) -> bool {
        matches!(self, UpdateSource::Viewer)
    }
}

/// A single durable write produced by a mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum PersistedWrite {
    /// Create or replace the full record
    Upsert { node: Node },
    Delete {
        #[serde(rename = "nodeId")]
        node_id: String,
    },
}

impl PersistedWrite {
    pub fn upsert(node: Node) -> Self {
        Self::Upsert { node }
    }

    pub fn delete(node_id: impl Into<String>) -> Self {
        Self::Delete {
            node_id: node_id.into(),
        }
    }

    pub fn node_id(&self) -> &str {
        match self {
            Self::Upsert { node } => &node.id,
            Self::Delete { node_id } => node_id,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Self::Delete { .. })
    }

    /// Pointer ids of the payload whose pending writes must land first
    pub fn referenced_ids(&self) -> Vec<&str> {
        match self {
            Self::Upsert { node } => [
                node.parent_id.as_deref(),
                node.before_sibling_id.as_deref(),
                node.container_node_id.as_deref(),
            ]
            .into_iter()
            .flatten()
            .filter(|id| *id != node.id)
            .collect(),
            Self::Delete { .. } => Vec::new(),
        }
    }
}

/// Abstraction over the external persistence layer
///
/// Implementations must be `Send + Sync`: the scheduler flushes from a spawned
/// tokio task.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    /// Fetch one record
    async fn get(&self, id: &str) -> Result<Option<Node>, StoreError>;

    /// Insert or update a record
    ///
    /// # Returns
    ///
    /// The stored record, carrying the version the store assigned.
    ///
    /// # Errors
    ///
    /// `StoreError::VersionConflict` when the source checks versions and
    /// `node.version` differs from the stored record's version.
    async fn set(&self, node: Node, source: UpdateSource) -> Result<Node, StoreError>;

    /// Delete a record (idempotent)
    ///
    /// `dependencies` lists writes the caller already sequenced before this
    /// delete; stores may use it for auditing or referential checks.
    async fn delete(
        &self,
        id: &str,
        source: UpdateSource,
        dependencies: &[String],
    ) -> Result<DeleteResult, StoreError>;

    /// Fetch all records whose `parent_id` equals `parent_id` (`None` = roots)
    async fn query_by_parent(&self, parent_id: Option<&str>) -> Result<Vec<Node>, StoreError>;
}
