//! Node Operations Types
//!
//! Supporting types for the hierarchy mutator: precondition errors and the
//! parameter struct for explicit node creation.

pub mod error;

pub use error::NodeOperationError;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parameters for creating a node at an explicit position
///
/// Used by [`HierarchyMutator::create_node`](crate::services::HierarchyMutator::create_node)
/// when there is no "after" node to split from, e.g. seeding the first child of a
/// new document.
///
/// # ID Generation
///
/// `id: None` generates a UUID v4. A caller-provided id must not already exist.
///
/// # Ordering
///
/// `before_sibling_id: None` appends the node as the last child of `parent_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNodeParams {
    #[serde(default)]
    pub id: Option<String>,
    pub node_type: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub before_sibling_id: Option<String>,
    #[serde(default = "empty_object")]
    pub properties: Value,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

impl CreateNodeParams {
    pub fn new(node_type: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: None,
            node_type: node_type.into(),
            content: content.into(),
            parent_id: None,
            before_sibling_id: None,
            properties: empty_object(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn after_sibling(mut self, before_sibling_id: impl Into<String>) -> Self {
        self.before_sibling_id = Some(before_sibling_id.into());
        self
    }

    pub fn with_properties(mut self, properties: Value) -> Self {
        self.properties = properties;
        self
    }
}
