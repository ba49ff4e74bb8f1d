//! ViewProjector - flattened render list for a viewer
//!
//! Walks the forest under a view root in sibling order and stops at collapsed
//! nodes. The projection is a snapshot; call [`ViewProjector::project`] again
//! after a change notification.

use crate::models::Node;
use crate::services::node_store::{NodeStore, StoreSnapshot};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

/// One visible row of a projected view
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectedNode {
    pub node: Node,
    pub depth: usize,
    pub expanded: bool,
    pub auto_focus: bool,
    pub is_placeholder: bool,
    pub has_children: bool,
}

pub struct ViewProjector {
    store: Arc<NodeStore>,
}

impl ViewProjector {
    pub fn new(store: Arc<NodeStore>) -> Self {
        Self { store }
    }

    /// Flatten the subtree below `view_root_id` (or the global roots)
    ///
    /// The view root itself is not part of the projection. Collapsed nodes are
    /// listed but their descendants are not.
    pub fn project(&self, view_root_id: Option<&str>) -> Vec<ProjectedNode> {
        self.store.snapshot(|snapshot| {
            let mut rows = Vec::new();
            let mut visited = HashSet::new();
            if let Some(root) = view_root_id {
                visited.insert(root.to_string());
            }
            project_children(snapshot, view_root_id, &mut rows, &mut visited);
            rows
        })
    }

    /// Ids of the visible rows, in order
    pub fn visible_ids(&self, view_root_id: Option<&str>) -> Vec<String> {
        self.project(view_root_id)
            .into_iter()
            .map(|row| row.node.id)
            .collect()
    }
}

fn project_children(
    snapshot: &mut StoreSnapshot<'_>,
    parent_id: Option<&str>,
    rows: &mut Vec<ProjectedNode>,
    visited: &mut HashSet<String>,
) {
    for id in snapshot.sorted_children(parent_id) {
        if !visited.insert(id.clone()) {
            tracing::error!(node_id = %id, "Node reached twice while projecting view");
            continue;
        }
        let Some(node) = snapshot.get(&id).cloned() else {
            continue;
        };
        let ui = snapshot.ui(&id).cloned().unwrap_or_default();
        let has_children = snapshot.has_children(&id);

        rows.push(ProjectedNode {
            node,
            depth: ui.depth,
            expanded: ui.expanded,
            auto_focus: ui.auto_focus,
            is_placeholder: ui.is_placeholder,
            has_children,
        });

        if ui.expanded && has_children {
            project_children(snapshot, Some(&id), rows, visited);
        }
    }
}
