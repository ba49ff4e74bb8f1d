//! Error types for structural operations
//!
//! Precondition failures of the hierarchy mutator. The flag-returning entry
//! points (`indent`, `outdent`, ...) log these and report `false`; the `try_*`
//! variants return them to the caller.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeOperationError {
    /// Referenced node does not exist
    #[error("Node '{node_id}' does not exist")]
    NodeNotFound { node_id: String },

    /// Operation requires a parent the node does not have, or names an invalid one
    #[error("Invalid parent for node '{node_id}': {reason}")]
    InvalidParent { node_id: String, reason: String },

    /// Nothing to do: e.g. indenting the first sibling, outdenting a root
    #[error("No valid target for {operation} on node '{node_id}'")]
    NoValidTarget { node_id: String, operation: String },

    /// The operation would make a node its own ancestor
    #[error("Circular reference: {context}")]
    CircularReference { context: String },

    /// Node failed structural validation
    #[error("Validation error: {0}")]
    ValidationError(#[from] crate::models::ValidationError),

    /// The requested operation violates business rules
    #[error("Invalid operation: {reason}")]
    InvalidOperation { reason: String },
}

impl NodeOperationError {
    pub fn node_not_found(node_id: impl Into<String>) -> Self {
        Self::NodeNotFound {
            node_id: node_id.into(),
        }
    }

    pub fn invalid_parent(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParent {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }

    pub fn no_valid_target(node_id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::NoValidTarget {
            node_id: node_id.into(),
            operation: operation.into(),
        }
    }

    pub fn circular_reference(context: impl Into<String>) -> Self {
        Self::CircularReference {
            context: context.into(),
        }
    }

    pub fn invalid_operation(reason: impl Into<String>) -> Self {
        Self::InvalidOperation {
            reason: reason.into(),
        }
    }

    /// Whether the failure just means "nothing to do here"
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::NoValidTarget { .. })
    }
}
