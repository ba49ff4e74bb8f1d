//! Node Data Structures
//!
//! This module defines the persisted `Node` record that the hierarchy manager
//! keeps in its in-memory index and writes to the external persistence store.
//!
//! # Architecture
//!
//! - **Universal Node**: Single struct represents all content types
//! - **Sibling Chain**: Ordering lives in `before_sibling_id` (single-pointer linked list)
//! - **Container Pointer**: `container_node_id` names the root document a node belongs to
//! - **Schema-less Properties**: entity-specific data in `properties`, never read by
//!   the structural invariants
//!
//! # Examples
//!
//! ```rust
//! use nodespace_hierarchy::models::Node;
//! use serde_json::json;
//!
//! let root = Node::new("text".to_string(), "Meeting notes".to_string(), None, json!({}));
//! let child = Node::new(
//!     "task".to_string(),
//!     "Send agenda".to_string(),
//!     Some(root.id.clone()),
//!     json!({"task": {"status": "pending"}}),
//! );
//! assert!(root.is_root());
//! assert_eq!(child.container_node_id.as_deref(), Some(root.id.as_str()));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Default version value for serde deserialization (version 1)
fn default_version() -> i64 {
    1
}

fn default_properties() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Validation errors for Node operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid node type: {0}")]
    InvalidNodeType(String),

    #[error("Invalid parent reference: {0}")]
    InvalidParent(String),

    #[error("Invalid container reference: {0}")]
    InvalidContainer(String),

    #[error("Invalid sibling reference: {0}")]
    InvalidSibling(String),

    #[error("Properties validation failed: {0}")]
    InvalidProperties(String),
}

/// Universal node record.
///
/// # Fields
///
/// - `id`: Unique identifier (UUID v4 unless supplied by the caller)
/// - `node_type`: Type tag (e.g., "text", "task", "header")
/// - `content`: Opaque text payload
/// - `parent_id`: Parent node, `None` for roots
/// - `container_node_id`: Nearest root ancestor, `None` only for roots
/// - `before_sibling_id`: Immediate predecessor among siblings
/// - `version`: OCC counter assigned by the persistence store
/// - `properties`: Schema-less JSON object
/// - `mentions`: Outgoing mention ids derived from `content`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,

    pub node_type: String,

    pub content: String,

    /// Parent node ID (`None` means this node is a root)
    pub parent_id: Option<String>,

    /// Container node ID (`None` means this node IS a container/root)
    pub container_node_id: Option<String>,

    /// Sibling ordering reference (single-pointer linked list)
    pub before_sibling_id: Option<String>,

    /// Optimistic concurrency control version.
    /// Last version observed from the persistence store.
    #[serde(default = "default_version")]
    pub version: i64,

    pub created_at: DateTime<Utc>,

    pub modified_at: DateTime<Utc>,

    #[serde(default = "default_properties")]
    pub properties: serde_json::Value,

    /// Outgoing mentions - IDs of nodes that THIS node references
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<String>,
}

impl Node {
    /// Create a new Node with auto-generated UUID
    ///
    /// `container_node_id` defaults to `parent_id`, which is correct for roots and
    /// direct children of a root. Use [`Node::new_with_container`] for deeper nodes.
    pub fn new(
        node_type: String,
        content: String,
        parent_id: Option<String>,
        properties: serde_json::Value,
    ) -> Self {
        let container_node_id = parent_id.clone();
        Self::new_with_container(node_type, content, parent_id, container_node_id, properties)
    }

    /// Create a new Node with auto-generated UUID and explicit `container_node_id`
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use nodespace_hierarchy::models::Node;
    /// # use serde_json::json;
    /// let grandchild = Node::new_with_container(
    ///     "text".to_string(),
    ///     "Grandchild".to_string(),
    ///     Some("child-id".to_string()),
    ///     Some("root-id".to_string()),
    ///     json!({}),
    /// );
    /// assert_eq!(grandchild.container_node_id.as_deref(), Some("root-id"));
    /// ```
    pub fn new_with_container(
        node_type: String,
        content: String,
        parent_id: Option<String>,
        container_node_id: Option<String>,
        properties: serde_json::Value,
    ) -> Self {
        let mut node = Self::new_with_id(
            Uuid::new_v4().to_string(),
            node_type,
            content,
            parent_id,
            properties,
        );
        node.container_node_id = container_node_id;
        node
    }

    /// Create a new Node with a caller-specified ID
    ///
    /// Like `new()`, this sets `container_node_id = parent_id`.
    pub fn new_with_id(
        id: String,
        node_type: String,
        content: String,
        parent_id: Option<String>,
        properties: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        let container_node_id = parent_id.clone();

        Self {
            id,
            node_type,
            content,
            parent_id,
            container_node_id,
            before_sibling_id: None,
            version: 1,
            created_at: now,
            modified_at: now,
            properties,
            mentions: Vec::new(),
        }
    }

    /// Builder-style setter for the sibling pointer
    pub fn with_before_sibling(mut self, before_sibling_id: Option<String>) -> Self {
        self.before_sibling_id = before_sibling_id;
        self
    }

    /// Validate node structure and required fields
    ///
    /// Content is allowed to be empty: blank nodes are created by pressing Enter
    /// and are cleaned up as placeholders if left empty.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if:
    /// - `id` or `node_type` is empty
    /// - `properties` is not a JSON object
    /// - the node references itself as parent, container, or sibling
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::MissingField("id".to_string()));
        }

        if self.node_type.is_empty() {
            return Err(ValidationError::MissingField("node_type".to_string()));
        }

        if !self.properties.is_object() {
            return Err(ValidationError::InvalidProperties(
                "properties must be a JSON object".to_string(),
            ));
        }

        if self.parent_id.as_deref() == Some(self.id.as_str()) {
            return Err(ValidationError::InvalidParent(
                "Node cannot be its own parent".to_string(),
            ));
        }

        if self.container_node_id.as_deref() == Some(self.id.as_str()) {
            return Err(ValidationError::InvalidContainer(
                "Node cannot be its own container".to_string(),
            ));
        }

        if self.before_sibling_id.as_deref() == Some(self.id.as_str()) {
            return Err(ValidationError::InvalidSibling(
                "Node cannot be its own sibling".to_string(),
            ));
        }

        Ok(())
    }

    /// A root has no parent.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Merge properties with existing properties (shallow merge)
    ///
    /// Falls back to replacement when either side is not an object.
    pub fn merge_properties(&mut self, updates: serde_json::Value) {
        match (self.properties.as_object_mut(), updates.as_object()) {
            (Some(existing), Some(new)) => {
                for (key, value) in new {
                    existing.insert(key.clone(), value.clone());
                }
            }
            _ => self.properties = updates,
        }
        self.modified_at = Utc::now();
    }

    pub(crate) fn touch(&mut self) {
        self.modified_at = Utc::now();
    }
}

/// Partial update of a node's payload fields
///
/// Pointers (`parent_id`, `before_sibling_id`, `container_node_id`) are not
/// part of an update; they change only through the hierarchy operations.
///
/// ```rust
/// # use nodespace_hierarchy::models::NodeUpdate;
/// # use serde_json::json;
/// let update = NodeUpdate::new()
///     .with_content("Updated".to_string())
///     .with_properties(json!({"status": "done"}));
/// assert!(!update.is_empty());
/// assert!(NodeUpdate::new().is_empty());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Shallow-merged into existing properties
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Value>,
}

impl NodeUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(mut self, content: String) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_properties(mut self, properties: serde_json::Value) -> Self {
        self.properties = Some(properties);
        self
    }

    pub fn with_node_type(mut self, node_type: String) -> Self {
        self.node_type = Some(node_type);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.node_type.is_none() && self.content.is_none() && self.properties.is_none()
    }

    /// Apply this update to a node in place
    pub fn apply_to(&self, node: &mut Node) {
        if let Some(node_type) = &self.node_type {
            node.node_type = node_type.clone();
        }
        if let Some(content) = &self.content {
            node.content = content.clone();
        }
        if let Some(properties) = &self.properties {
            node.merge_properties(properties.clone());
        }
        node.touch();
    }
}

/// Result of a delete operation
///
/// DELETE operations are idempotent: deleting a non-existent record succeeds,
/// `existed` records whether anything was removed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteResult {
    pub existed: bool,
}

impl DeleteResult {
    pub fn existed() -> Self {
        Self { existed: true }
    }

    pub fn not_found() -> Self {
        Self { existed: false }
    }
}
