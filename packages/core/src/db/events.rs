//! Change Notifications
//!
//! This module defines the events the [`NodeStore`](crate::services::NodeStore)
//! publishes after every committed change. Presentation and indexing
//! collaborators subscribe to these instead of polling.
//!
//! # Event Flow
//!
//! 1. A mutation commits against the in-memory index
//! 2. The store releases its lock
//! 3. Events are fanned out synchronously to every listener, then sent on the
//!    broadcast channel for async consumers

use crate::db::persistence::UpdateSource;
use crate::models::Node;
use serde::{Deserialize, Serialize};

/// Which aspect of a node changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdateType {
    Content,
    #[serde(rename = "nodeType")]
    Type,
    Properties,
    Mentions,
}

/// Structural operation that changed the hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HierarchyChangeType {
    Create,
    Indent,
    Outdent,
    Combine,
    Delete,
    Expand,
    Collapse,
}

/// Scope of a cache invalidation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum InvalidationScope {
    /// Entries derived from one node (its children ordering, its projection)
    Node {
        #[serde(rename = "nodeId")]
        node_id: String,
    },
    /// Everything
    Global,
}

/// Events published by the NodeStore
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodeEvent {
    #[serde(rename_all = "camelCase")]
    NodeCreated { node: Node, source: UpdateSource },

    #[serde(rename_all = "camelCase")]
    NodeUpdated {
        node_id: String,
        update_type: UpdateType,
        source: UpdateSource,
    },

    #[serde(rename_all = "camelCase")]
    NodeDeleted { node_id: String, source: UpdateSource },

    #[serde(rename_all = "camelCase")]
    HierarchyChanged {
        change_type: HierarchyChangeType,
        affected_node_ids: Vec<String>,
    },

    #[serde(rename_all = "camelCase")]
    CacheInvalidate {
        scope: InvalidationScope,
        reason: String,
    },

    /// Content changed in a way the link/mention indexer must reprocess
    #[serde(rename_all = "camelCase")]
    ReferencesUpdateNeeded { node_id: String },
}

impl NodeEvent {
    /// String representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            NodeEvent::NodeCreated { .. } => "node:created",
            NodeEvent::NodeUpdated { .. } => "node:updated",
            NodeEvent::NodeDeleted { .. } => "node:deleted",
            NodeEvent::HierarchyChanged { .. } => "hierarchy:changed",
            NodeEvent::CacheInvalidate { .. } => "cache:invalidate",
            NodeEvent::ReferencesUpdateNeeded { .. } => "references:update-needed",
        }
    }

    pub fn cache_invalidate_node(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        NodeEvent::CacheInvalidate {
            scope: InvalidationScope::Node {
                node_id: node_id.into(),
            },
            reason: reason.into(),
        }
    }

    pub fn cache_invalidate_global(reason: impl Into<String>) -> Self {
        NodeEvent::CacheInvalidate {
            scope: InvalidationScope::Global,
            reason: reason.into(),
        }
    }

    /// Node ids this event is about
    pub fn node_ids(&self) -> Vec<&str> {
        match self {
            NodeEvent::NodeCreated { node, .. } => vec![node.id.as_str()],
            NodeEvent::NodeUpdated { node_id, .. }
            | NodeEvent::NodeDeleted { node_id, .. }
            | NodeEvent::ReferencesUpdateNeeded { node_id } => vec![node_id.as_str()],
            NodeEvent::HierarchyChanged {
                affected_node_ids, ..
            } => affected_node_ids.iter().map(String::as_str).collect(),
            NodeEvent::CacheInvalidate { scope, .. } => match scope {
                InvalidationScope::Node { node_id } => vec![node_id.as_str()],
                InvalidationScope::Global => Vec::new(),
            },
        }
    }
}
