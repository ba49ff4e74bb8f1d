//! Persistence Store Error Types
//!
//! Errors returned by [`PersistenceStore`](crate::db::PersistenceStore)
//! implementations. Version conflicts are a distinct, surfaced kind carrying
//! enough data for the caller to merge.

use crate::models::Node;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Version conflict detected (optimistic concurrency control)
    ///
    /// The record was modified by another actor between read and write. The
    /// caller must re-merge against `current_node`; the write is never retried
    /// automatically with the stale version.
    #[error("Version conflict for node '{node_id}': expected version {expected_version}, but current version is {actual_version}")]
    VersionConflict {
        node_id: String,
        expected_version: i64,
        actual_version: i64,
        /// Authoritative record for merge resolution
        current_node: Box<Node>,
    },

    /// Record required by the operation does not exist
    #[error("Node '{node_id}' does not exist in the store")]
    NodeNotFound { node_id: String },

    /// Backend-specific failure (I/O, serialization, transport)
    #[error("Store backend error: {context}")]
    Backend { context: String },
}

impl StoreError {
    pub fn version_conflict(expected_version: i64, current_node: Node) -> Self {
        Self::VersionConflict {
            node_id: current_node.id.clone(),
            expected_version,
            actual_version: current_node.version,
            current_node: Box::new(current_node),
        }
    }

    pub fn node_not_found(node_id: impl Into<String>) -> Self {
        Self::NodeNotFound {
            node_id: node_id.into(),
        }
    }

    pub fn backend(context: impl Into<String>) -> Self {
        Self::Backend {
            context: context.into(),
        }
    }

    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}
