//! HierarchyMutator - structural edits on the live forest
//!
//! Every operation runs inside one [`NodeStore::transaction`] and, in order:
//!
//! 1. rewires `parent_id` / `before_sibling_id` / `container_node_id`
//! 2. invalidates the sibling-order cache of every touched parent
//! 3. recomputes depths of moved subtrees
//! 4. publishes events once the transaction commits
//! 5. queues persistence writes with their dependencies
//!
//! Each structural operation comes in two forms: `try_*` returns a
//! [`NodeOperationError`] describing the failed precondition, and the plain form
//! logs the failure at `debug` and reports a flag. A failed precondition never
//! leaves a partial change behind; all checks happen before the first write.
//!
//! # Content edits
//!
//! `update_content` changes the in-memory record immediately and defers the rest to two
//! per-node debounce tiers:
//!
//! - tier 1 ([`ContentTier::Refresh`]): mentions and placeholder flag
//! - tier 2 ([`ContentTier::Persist`]): durable write plus `ReferencesUpdateNeeded`

use crate::config::HierarchyConfig;
use crate::db::{HierarchyChangeType, NodeEvent, PersistedWrite, UpdateSource, UpdateType};
use crate::models::{is_placeholder_content, Node, NodeUpdate, UiState};
use crate::operations::{CreateNodeParams, NodeOperationError};
use crate::services::debounce::DebounceScheduler;
use crate::services::node_store::StoreTxn;
use crate::services::{NodeStore, PersistenceScheduler};
use crate::utils::extract_mentions;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use uuid::Uuid;

/// Debounce tier of a content edit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContentTier {
    Refresh,
    Persist,
}

type DebounceKey = (String, ContentTier);

/// A write decided inside a transaction, materialized from the final state
enum PlannedWrite {
    Upsert {
        id: String,
        dependencies: Vec<String>,
        create: bool,
    },
    Delete {
        id: String,
        dependencies: Vec<String>,
    },
}

#[derive(Default)]
struct WritePlan {
    writes: Vec<PlannedWrite>,
}

impl WritePlan {
    fn create(&mut self, id: &str, dependencies: Vec<String>) {
        self.writes.push(PlannedWrite::Upsert {
            id: id.to_string(),
            dependencies,
            create: true,
        });
    }

    fn upsert(&mut self, id: &str, dependencies: Vec<String>) {
        self.writes.push(PlannedWrite::Upsert {
            id: id.to_string(),
            dependencies,
            create: false,
        });
    }

    fn delete(&mut self, id: &str, dependencies: Vec<String>) {
        self.writes.push(PlannedWrite::Delete {
            id: id.to_string(),
            dependencies,
        });
    }

    fn resolve(self, txn: &StoreTxn<'_>) -> Vec<(PersistedWrite, Vec<String>, bool)> {
        self.writes
            .into_iter()
            .filter_map(|planned| match planned {
                PlannedWrite::Upsert {
                    id,
                    dependencies,
                    create,
                } => txn
                    .get(&id)
                    .cloned()
                    .map(|node| (PersistedWrite::upsert(node), dependencies, create)),
                PlannedWrite::Delete { id, dependencies } => {
                    Some((PersistedWrite::delete(id), dependencies, false))
                }
            })
            .collect()
    }
}

pub struct HierarchyMutator {
    store: Arc<NodeStore>,
    scheduler: Arc<PersistenceScheduler>,
    debounce: DebounceScheduler<DebounceKey>,
    config: HierarchyConfig,
}

impl HierarchyMutator {
    pub fn new(store: Arc<NodeStore>, scheduler: Arc<PersistenceScheduler>) -> Self {
        Self::with_config(store, scheduler, HierarchyConfig::default())
    }

    pub fn with_config(
        store: Arc<NodeStore>,
        scheduler: Arc<PersistenceScheduler>,
        config: HierarchyConfig,
    ) -> Self {
        Self {
            store,
            scheduler,
            debounce: DebounceScheduler::new(),
            config,
        }
    }

    pub fn store(&self) -> &Arc<NodeStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &Arc<PersistenceScheduler> {
        &self.scheduler
    }

    // ------------------------------------------------------------------
    // create
    // ------------------------------------------------------------------

    /// Create a node next to `after_id`. Returns the new id.
    pub fn create(
        &self,
        after_id: &str,
        content: &str,
        node_type: &str,
        insert_at_beginning: bool,
    ) -> Option<String> {
        self.try_create(after_id, content, node_type, insert_at_beginning)
            .map_err(|e| log_rejected("create", &e))
            .ok()
    }

    /// Create a node next to `after_id`
    ///
    /// - `insert_at_beginning`: the new node takes `after_id`'s chain position, so
    ///   it renders before it
    /// - otherwise it is spliced in right after `after_id`; when `after_id` is
    ///   expanded and has children, they move under the new node (content split)
    pub fn try_create(
        &self,
        after_id: &str,
        content: &str,
        node_type: &str,
        insert_at_beginning: bool,
    ) -> Result<String, NodeOperationError> {
        let (new_id, writes) = self.store.transaction(|txn| -> Result<_, NodeOperationError> {
            let after = txn
                .get(after_id)
                .cloned()
                .ok_or_else(|| NodeOperationError::node_not_found(after_id))?;

            let new_id = Uuid::new_v4().to_string();
            let container = txn.container_for_parent(after.parent_id.as_deref());
            let mut node = Node::new_with_container(
                node_type.to_string(),
                content.to_string(),
                after.parent_id.clone(),
                container,
                serde_json::json!({}),
            );
            node.id = new_id.clone();
            node.mentions = extract_mentions(content, Some(&new_id));
            node.validate()?;

            let mut plan = WritePlan::default();
            let mut affected = vec![new_id.clone(), after_id.to_string()];

            if insert_at_beginning {
                node.before_sibling_id = after.before_sibling_id.clone();
                txn.put(node);
                txn.modify(after_id, |n| {
                    n.before_sibling_id = Some(new_id.clone());
                    n.touch();
                });
                plan.create(&new_id, Vec::new());
                plan.upsert(after_id, vec![new_id.clone()]);
            } else {
                let successors = successors_of(txn, after_id, after.parent_id.as_deref());
                node.before_sibling_id = Some(after_id.to_string());
                txn.put(node);
                plan.create(&new_id, Vec::new());
                for successor in successors {
                    txn.modify(&successor, |n| {
                        n.before_sibling_id = Some(new_id.clone());
                        n.touch();
                    });
                    plan.upsert(&successor, vec![new_id.clone()]);
                    affected.push(successor);
                }

                let split = txn.ui(after_id).map_or(false, |ui| ui.expanded)
                    && txn.has_children(after_id);
                if split {
                    let mut previous: Option<String> = None;
                    for child in txn.sorted_children(Some(after_id)) {
                        move_under(txn, &child, Some(&new_id), previous.clone());
                        plan.upsert(&child, vec![new_id.clone()]);
                        repair_containers(txn, &child, &mut plan);
                        previous = Some(child.clone());
                        affected.push(child);
                    }
                }
            }

            txn.recompute_depths(&new_id);
            let depth = txn.depth(&new_id);
            txn.set_ui(&new_id, UiState::for_new_node(depth, content));

            if let Some(created) = txn.get(&new_id).cloned() {
                txn.emit(NodeEvent::NodeCreated {
                    node: created,
                    source: UpdateSource::Viewer,
                });
            }
            txn.emit(NodeEvent::HierarchyChanged {
                change_type: HierarchyChangeType::Create,
                affected_node_ids: affected,
            });

            Ok((new_id, plan.resolve(txn)))
        })?;

        self.submit(writes);
        Ok(new_id)
    }

    /// Create a node at an explicit position
    pub fn create_node(&self, params: CreateNodeParams) -> Result<String, NodeOperationError> {
        let (id, writes) = self.store.transaction(|txn| -> Result<_, NodeOperationError> {
            let id = params
                .id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            if txn.contains(&id) {
                return Err(NodeOperationError::invalid_operation(format!(
                    "node '{}' already exists",
                    id
                )));
            }

            let parent_id = params.parent_id.as_deref();
            if let Some(parent) = parent_id {
                if !txn.contains(parent) {
                    return Err(NodeOperationError::invalid_parent(
                        &id,
                        format!("parent '{}' does not exist", parent),
                    ));
                }
            }

            let siblings = txn.sorted_children(parent_id);
            let before = match params.before_sibling_id.as_deref() {
                Some(before) if !siblings.iter().any(|s| s == before) => {
                    return Err(NodeOperationError::invalid_operation(format!(
                        "'{}' is not a child of {}",
                        before,
                        parent_id.unwrap_or("the root level")
                    )));
                }
                Some(before) => Some(before.to_string()),
                None => siblings.last().cloned(),
            };

            let mut node = Node::new_with_container(
                params.node_type.clone(),
                params.content.clone(),
                params.parent_id.clone(),
                txn.container_for_parent(parent_id),
                params.properties.clone(),
            )
            .with_before_sibling(before.clone());
            node.id = id.clone();
            node.mentions = extract_mentions(&node.content, Some(&id));
            node.validate()?;

            let mut plan = WritePlan::default();
            let successors = match &before {
                Some(before) => successors_of(txn, before, parent_id),
                None => Vec::new(),
            };

            txn.put(node);
            plan.create(&id, Vec::new());
            for successor in &successors {
                txn.modify(successor, |n| {
                    n.before_sibling_id = Some(id.clone());
                    n.touch();
                });
                plan.upsert(successor, vec![id.clone()]);
            }

            txn.recompute_depths(&id);
            let depth = txn.depth(&id);
            txn.set_ui(&id, UiState::for_new_node(depth, &params.content));

            if let Some(created) = txn.get(&id).cloned() {
                txn.emit(NodeEvent::NodeCreated {
                    node: created,
                    source: UpdateSource::Viewer,
                });
            }
            let mut affected = vec![id.clone()];
            affected.extend(successors);
            txn.emit(NodeEvent::HierarchyChanged {
                change_type: HierarchyChangeType::Create,
                affected_node_ids: affected,
            });

            Ok((id, plan.resolve(txn)))
        })?;

        self.submit(writes);
        Ok(id)
    }

    // ------------------------------------------------------------------
    // indent / outdent
    // ------------------------------------------------------------------

    pub fn indent(&self, node_id: &str) -> bool {
        self.try_indent(node_id)
            .map_err(|e| log_rejected("indent", &e))
            .is_ok()
    }

    /// Make `node_id` the last child of its preceding sibling
    pub fn try_indent(&self, node_id: &str) -> Result<(), NodeOperationError> {
        let writes = self.store.transaction(|txn| -> Result<_, NodeOperationError> {
            let node = txn
                .get(node_id)
                .cloned()
                .ok_or_else(|| NodeOperationError::node_not_found(node_id))?;

            let siblings = txn.sorted_children(node.parent_id.as_deref());
            let position = sibling_position(&siblings, node_id)?;
            if position == 0 {
                return Err(NodeOperationError::no_valid_target(node_id, "indent"));
            }
            let target = siblings[position - 1].clone();
            let last_child = txn.sorted_children(Some(&target)).last().cloned();

            let mut plan = WritePlan::default();
            let mut affected = vec![node_id.to_string(), target.clone()];

            for successor in detach(txn, node_id) {
                plan.upsert(&successor, Vec::new());
                affected.push(successor);
            }

            move_under(txn, node_id, Some(&target), last_child);
            plan.upsert(node_id, Vec::new());
            repair_containers(txn, node_id, &mut plan);

            if let Some(ui) = txn.ui_mut(&target) {
                ui.expanded = true;
            }
            txn.recompute_depths(node_id);

            txn.emit(NodeEvent::HierarchyChanged {
                change_type: HierarchyChangeType::Indent,
                affected_node_ids: affected,
            });
            Ok(plan.resolve(txn))
        })?;

        self.submit(writes);
        Ok(())
    }

    pub fn outdent(&self, node_id: &str) -> bool {
        self.try_outdent(node_id)
            .map_err(|e| log_rejected("outdent", &e))
            .is_ok()
    }

    /// Move `node_id` to its grandparent, right after its old parent
    ///
    /// Siblings that followed the node become its children, keeping their order
    /// and landing after any children it already had.
    pub fn try_outdent(&self, node_id: &str) -> Result<(), NodeOperationError> {
        let writes = self.store.transaction(|txn| -> Result<_, NodeOperationError> {
            let node = txn
                .get(node_id)
                .cloned()
                .ok_or_else(|| NodeOperationError::node_not_found(node_id))?;
            let parent_id = node
                .parent_id
                .clone()
                .ok_or_else(|| NodeOperationError::no_valid_target(node_id, "outdent"))?;
            let parent = txn.get(&parent_id).cloned().ok_or_else(|| {
                NodeOperationError::invalid_parent(
                    node_id,
                    format!("parent '{}' is not loaded", parent_id),
                )
            })?;
            let grandparent = parent.parent_id.clone();

            let siblings = txn.sorted_children(Some(&parent_id));
            let position = sibling_position(&siblings, node_id)?;
            let trailing: Vec<String> = siblings[position + 1..].to_vec();
            let last_child = txn.sorted_children(Some(node_id)).last().cloned();
            let parent_successors = successors_of(txn, &parent_id, grandparent.as_deref());

            let mut plan = WritePlan::default();
            let mut affected = vec![node_id.to_string(), parent_id.clone()];

            // Node goes right after its old parent
            move_under(txn, node_id, grandparent.as_deref(), Some(parent_id.clone()));
            plan.upsert(node_id, Vec::new());
            for successor in parent_successors {
                txn.modify(&successor, |n| {
                    n.before_sibling_id = Some(node_id.to_string());
                    n.touch();
                });
                plan.upsert(&successor, vec![node_id.to_string()]);
                affected.push(successor);
            }

            // Trailing siblings follow under the node, each after the previous one
            let mut previous = last_child;
            for sibling in &trailing {
                move_under(txn, sibling, Some(node_id), previous.clone());
                let mut deps = vec![node_id.to_string()];
                deps.extend(previous.clone());
                plan.upsert(sibling, deps);
                previous = Some(sibling.clone());
                affected.push(sibling.clone());
            }

            repair_containers(txn, node_id, &mut plan);
            if !trailing.is_empty() {
                if let Some(ui) = txn.ui_mut(node_id) {
                    ui.expanded = true;
                }
            }
            txn.recompute_depths(node_id);

            txn.emit(NodeEvent::HierarchyChanged {
                change_type: HierarchyChangeType::Outdent,
                affected_node_ids: affected,
            });
            Ok(plan.resolve(txn))
        })?;

        self.submit(writes);
        Ok(())
    }

    // ------------------------------------------------------------------
    // combine / delete
    // ------------------------------------------------------------------

    pub fn combine(&self, current_id: &str, previous_id: &str) -> bool {
        self.try_combine(current_id, previous_id)
            .map_err(|e| log_rejected("combine", &e))
            .is_ok()
    }

    /// Merge `current_id` into `previous_id` and re-home its children
    ///
    /// The children's new parent is the ancestor-or-self of `previous_id` at
    /// `current_id`'s depth, falling back to `previous_id`. Children of a root
    /// become roots. When the new parent is `current_id`'s own parent the
    /// children take its place in the chain; otherwise they are appended.
    pub fn try_combine(&self, current_id: &str, previous_id: &str) -> Result<(), NodeOperationError> {
        let writes = self.store.transaction(|txn| -> Result<_, NodeOperationError> {
            if current_id == previous_id {
                return Err(NodeOperationError::invalid_operation(
                    "cannot combine a node with itself",
                ));
            }
            let current = txn
                .get(current_id)
                .cloned()
                .ok_or_else(|| NodeOperationError::node_not_found(current_id))?;
            let previous = txn
                .get(previous_id)
                .cloned()
                .ok_or_else(|| NodeOperationError::node_not_found(previous_id))?;
            if txn.descendants(current_id).iter().any(|d| d == previous_id) {
                return Err(NodeOperationError::circular_reference(format!(
                    "'{}' is inside the subtree of '{}'",
                    previous_id, current_id
                )));
            }

            let new_parent: Option<String> = if current.is_root() {
                None
            } else {
                Some(
                    ancestor_at_depth(txn, previous_id, txn.depth(current_id))
                        .unwrap_or_else(|| previous_id.to_string()),
                )
            };
            let children = txn.sorted_children(Some(current_id));

            let mut plan = WritePlan::default();
            let mut affected = vec![current_id.to_string(), previous_id.to_string()];

            // Content
            let merged = format!("{}{}", previous.content, current.content);
            txn.modify(previous_id, |n| {
                n.mentions = extract_mentions(&merged, Some(&n.id));
                n.content = merged.clone();
                n.touch();
            });
            if let Some(ui) = txn.ui_mut(previous_id) {
                ui.is_placeholder = is_placeholder_content(&merged);
            }
            plan.upsert(previous_id, Vec::new());
            txn.emit(NodeEvent::NodeUpdated {
                node_id: previous_id.to_string(),
                update_type: UpdateType::Content,
                source: UpdateSource::Viewer,
            });

            // Children
            let takes_slot = new_parent == current.parent_id;
            let mut chain_tail = if takes_slot {
                current.before_sibling_id.clone()
            } else {
                let tail = new_parent
                    .as_deref()
                    .and_then(|p| txn.sorted_children(Some(p)).last().cloned());
                let successors = detach(txn, current_id);
                for successor in &successors {
                    plan.upsert(successor, Vec::new());
                }
                affected.extend(successors);
                tail
            };

            let mut promoted = Vec::with_capacity(children.len());
            for child in &children {
                move_under(txn, child, new_parent.as_deref(), chain_tail.clone());
                plan.upsert(child, Vec::new());
                repair_containers(txn, child, &mut plan);
                txn.recompute_depths(child);
                chain_tail = Some(child.clone());
                promoted.push(child.clone());
            }

            if takes_slot {
                // Whatever followed current now follows its last promoted child
                let parent = current.parent_id.as_deref();
                for successor in successors_of(txn, current_id, parent) {
                    txn.modify(&successor, |n| {
                        n.before_sibling_id = chain_tail.clone();
                        n.touch();
                    });
                    plan.upsert(&successor, promoted.clone());
                    affected.push(successor);
                }
            }

            txn.remove(current_id);
            let mut delete_deps = promoted.clone();
            delete_deps.push(previous_id.to_string());
            plan.delete(current_id, delete_deps);
            affected.extend(promoted);

            txn.emit(NodeEvent::NodeDeleted {
                node_id: current_id.to_string(),
                source: UpdateSource::Viewer,
            });
            txn.emit(NodeEvent::HierarchyChanged {
                change_type: HierarchyChangeType::Combine,
                affected_node_ids: affected,
            });
            Ok(plan.resolve(txn))
        })?;

        self.cancel_content_tiers(current_id);
        self.debounce
            .cancel(&(previous_id.to_string(), ContentTier::Refresh));
        self.submit(writes);
        Ok(())
    }

    pub fn delete(&self, node_id: &str) -> bool {
        self.try_delete(node_id)
            .map_err(|e| log_rejected("delete", &e))
            .is_ok()
    }

    /// Detach and remove `node_id`; its children are left orphaned
    pub fn try_delete(&self, node_id: &str) -> Result<(), NodeOperationError> {
        let writes = self.store.transaction(|txn| -> Result<_, NodeOperationError> {
            if !txn.contains(node_id) {
                return Err(NodeOperationError::node_not_found(node_id));
            }

            let mut plan = WritePlan::default();
            let successors = detach(txn, node_id);
            for successor in &successors {
                plan.upsert(successor, Vec::new());
            }
            txn.remove(node_id);
            for orphan in txn.child_ids(Some(node_id)) {
                txn.recompute_depths(&orphan);
            }
            plan.delete(node_id, successors.clone());

            let mut affected = vec![node_id.to_string()];
            affected.extend(successors);
            txn.emit(NodeEvent::NodeDeleted {
                node_id: node_id.to_string(),
                source: UpdateSource::Viewer,
            });
            txn.emit(NodeEvent::HierarchyChanged {
                change_type: HierarchyChangeType::Delete,
                affected_node_ids: affected,
            });
            Ok(plan.resolve(txn))
        })?;

        self.cancel_content_tiers(node_id);
        self.submit(writes);
        Ok(())
    }

    // ------------------------------------------------------------------
    // expand / collapse
    // ------------------------------------------------------------------

    /// Flip the expanded flag. Returns `false` for unknown nodes.
    pub fn toggle_expanded(&self, node_id: &str) -> bool {
        match self.store.ui_state(node_id) {
            Some(ui) => self.set_expanded(node_id, !ui.expanded),
            None => false,
        }
    }

    /// Returns `false` for unknown nodes. Emits only when the flag changes.
    pub fn set_expanded(&self, node_id: &str, expanded: bool) -> bool {
        self.store.transaction(|txn| {
            let Some(ui) = txn.ui_mut(node_id) else {
                return false;
            };
            if ui.expanded == expanded {
                return true;
            }
            ui.expanded = expanded;
            txn.emit(NodeEvent::HierarchyChanged {
                change_type: if expanded {
                    HierarchyChangeType::Expand
                } else {
                    HierarchyChangeType::Collapse
                },
                affected_node_ids: vec![node_id.to_string()],
            });
            true
        })
    }

    // ------------------------------------------------------------------
    // content / type / properties
    // ------------------------------------------------------------------

    /// Replace a node's content and restart both debounce tiers
    pub fn update_content(&self, node_id: &str, content: &str) -> bool {
        let changed = self.store.transaction(|txn| {
            let changed = txn.get(node_id).map(|n| n.content != content)?;
            if changed {
                let update = NodeUpdate::new().with_content(content.to_string());
                txn.modify(node_id, |n| update.apply_to(n));
                txn.emit(NodeEvent::NodeUpdated {
                    node_id: node_id.to_string(),
                    update_type: UpdateType::Content,
                    source: UpdateSource::Viewer,
                });
            }
            Some(changed)
        });
        match changed {
            None => {
                tracing::debug!(node_id, "Content update for unknown node ignored");
                return false;
            }
            Some(false) => return true,
            Some(true) => {}
        }

        let store = Arc::clone(&self.store);
        let id = node_id.to_string();
        self.debounce.schedule(
            (node_id.to_string(), ContentTier::Refresh),
            self.config.content_refresh_debounce,
            move || refresh_derived_state(&store, &id),
        );

        let store = Arc::clone(&self.store);
        let scheduler = Arc::clone(&self.scheduler);
        let id = node_id.to_string();
        self.debounce.schedule(
            (node_id.to_string(), ContentTier::Persist),
            self.config.content_persist_debounce,
            move || persist_content(&store, &scheduler, &id),
        );
        true
    }

    pub fn update_node_type(&self, node_id: &str, node_type: &str) -> bool {
        if node_type.is_empty() {
            tracing::debug!(node_id, "Rejected empty node type");
            return false;
        }
        self.update_immediately(
            node_id,
            UpdateType::Type,
            NodeUpdate::new().with_node_type(node_type.to_string()),
        )
    }

    /// Shallow-merge `properties` into the node's properties
    pub fn update_properties(&self, node_id: &str, properties: serde_json::Value) -> bool {
        self.update_immediately(
            node_id,
            UpdateType::Properties,
            NodeUpdate::new().with_properties(properties),
        )
    }

    /// Apply a payload update and queue its write without debounce
    fn update_immediately(&self, node_id: &str, update_type: UpdateType, update: NodeUpdate) -> bool {
        let write = self.store.transaction(|txn| {
            if !txn.modify(node_id, |n| update.apply_to(n)) {
                return None;
            }
            txn.emit(NodeEvent::NodeUpdated {
                node_id: node_id.to_string(),
                update_type,
                source: UpdateSource::Viewer,
            });
            txn.get(node_id).cloned()
        });
        match write {
            Some(node) => {
                self.scheduler
                    .enqueue(PersistedWrite::upsert(node), UpdateSource::Viewer);
                true
            }
            None => false,
        }
    }

    /// Fire every pending content tier now
    pub fn flush_pending_edits(&self) -> usize {
        self.debounce.flush_all()
    }

    pub fn has_pending_edits(&self, node_id: &str) -> bool {
        self.debounce
            .is_pending(&(node_id.to_string(), ContentTier::Refresh))
            || self
                .debounce
                .is_pending(&(node_id.to_string(), ContentTier::Persist))
    }

    // ------------------------------------------------------------------
    // remote changes / teardown
    // ------------------------------------------------------------------

    /// Integrate a record changed by another actor. Nothing is written back.
    pub fn apply_remote_node(&self, node: Node) -> Result<(), NodeOperationError> {
        node.validate()?;
        self.store.set(node, UpdateSource::External);
        Ok(())
    }

    /// Integrate a deletion made by another actor. Nothing is written back.
    pub fn apply_remote_delete(&self, node_id: &str) -> bool {
        self.cancel_content_tiers(node_id);
        self.scheduler.cancel(node_id);
        self.store.delete(node_id, UpdateSource::External).is_some()
    }

    /// Remove childless placeholder nodes under `view_root` (all loaded nodes
    /// when `None`), then flush pending content edits
    ///
    /// A placeholder whose creation never reached the store is dropped from the
    /// queue instead of being deleted remotely. Returns the removed ids.
    pub fn teardown_placeholders(&self, view_root: Option<&str>) -> Vec<String> {
        let (removed, writes) = self.store.transaction(|txn| {
            let scope: Vec<String> = match view_root {
                Some(root) => txn.descendants(root),
                None => txn.node_ids(),
            };

            let mut plan = WritePlan::default();
            let mut removed = Vec::new();
            for id in scope {
                let is_placeholder = txn
                    .get(&id)
                    .map_or(false, |n| is_placeholder_content(&n.content));
                if !is_placeholder || txn.has_children(&id) {
                    continue;
                }
                for successor in detach(txn, &id) {
                    plan.upsert(&successor, Vec::new());
                }
                txn.remove(&id);
                txn.emit(NodeEvent::NodeDeleted {
                    node_id: id.clone(),
                    source: UpdateSource::Viewer,
                });
                removed.push(id);
            }

            for id in &removed {
                plan.delete(id, Vec::new());
            }
            if !removed.is_empty() {
                txn.emit(NodeEvent::HierarchyChanged {
                    change_type: HierarchyChangeType::Delete,
                    affected_node_ids: removed.clone(),
                });
            }
            (removed, plan.resolve(txn))
        });

        for id in &removed {
            self.cancel_content_tiers(id);
        }
        let writes = writes
            .into_iter()
            .filter(|(write, _, _)| {
                !(write.is_delete() && self.scheduler.cancel_unflushed_create(write.node_id()))
            })
            .collect();
        self.submit(writes);

        if !removed.is_empty() {
            tracing::debug!("Removed {} placeholder node(s)", removed.len());
        }
        self.flush_pending_edits();
        removed
    }

    fn cancel_content_tiers(&self, node_id: &str) {
        self.debounce
            .cancel(&(node_id.to_string(), ContentTier::Refresh));
        self.debounce
            .cancel(&(node_id.to_string(), ContentTier::Persist));
    }

    fn submit(&self, writes: Vec<(PersistedWrite, Vec<String>, bool)>) {
        for (write, dependencies, create) in writes {
            match (write, create) {
                (PersistedWrite::Upsert { node }, true) => {
                    self.scheduler.enqueue_create(node, dependencies);
                }
                (write, _) => {
                    self.scheduler
                        .enqueue_with_dependencies(write, UpdateSource::Viewer, dependencies);
                }
            }
        }
    }
}

fn sibling_position(siblings: &[String], node_id: &str) -> Result<usize, NodeOperationError> {
    siblings.iter().position(|s| s == node_id).ok_or_else(|| {
        NodeOperationError::invalid_operation(format!(
            "'{}' is missing from its parent's child index",
            node_id
        ))
    })
}

fn log_rejected(operation: &str, error: &NodeOperationError) {
    tracing::debug!("{} rejected: {}", operation, error);
}

/// Tier 1: derived state that depends on content
fn refresh_derived_state(store: &NodeStore, node_id: &str) {
    store.transaction(|txn| {
        let Some(node) = txn.get(node_id) else {
            return;
        };
        let mentions = extract_mentions(&node.content, Some(node_id));
        let placeholder = is_placeholder_content(&node.content);
        let mentions_changed = mentions != node.mentions;

        if let Some(ui) = txn.ui_mut(node_id) {
            ui.is_placeholder = placeholder;
        }
        if mentions_changed {
            txn.modify(node_id, |n| n.mentions = mentions);
            txn.emit(NodeEvent::NodeUpdated {
                node_id: node_id.to_string(),
                update_type: UpdateType::Mentions,
                source: UpdateSource::Viewer,
            });
        }
    });
}

/// Tier 2: durable write and downstream reference indexing
fn persist_content(store: &NodeStore, scheduler: &PersistenceScheduler, node_id: &str) {
    refresh_derived_state(store, node_id);
    let Some(node) = store.get(node_id) else {
        return;
    };
    scheduler.enqueue(PersistedWrite::upsert(node), UpdateSource::Viewer);
    store.publish(vec![NodeEvent::ReferencesUpdateNeeded {
        node_id: node_id.to_string(),
    }]);
}

/// Siblings under `parent_id` whose pointer names `node_id`
fn successors_of(txn: &StoreTxn<'_>, node_id: &str, parent_id: Option<&str>) -> Vec<String> {
    txn.child_ids(parent_id)
        .into_iter()
        .filter(|c| {
            c != node_id
                && txn
                    .get(c)
                    .and_then(|n| n.before_sibling_id.as_deref())
                    == Some(node_id)
        })
        .collect()
}

/// Close the gap `node_id` leaves in its chain. Returns the repointed siblings.
fn detach(txn: &mut StoreTxn<'_>, node_id: &str) -> Vec<String> {
    let Some(node) = txn.get(node_id).cloned() else {
        return Vec::new();
    };
    let successors = successors_of(txn, node_id, node.parent_id.as_deref());
    for successor in &successors {
        txn.modify(successor, |n| {
            n.before_sibling_id = node.before_sibling_id.clone();
            n.touch();
        });
    }
    successors
}

/// Reparent `node_id` and set its chain pointer and container
fn move_under(
    txn: &mut StoreTxn<'_>,
    node_id: &str,
    parent_id: Option<&str>,
    before_sibling_id: Option<String>,
) {
    let container = txn.container_for_parent(parent_id);
    if let Some(mut node) = txn.get(node_id).cloned() {
        node.parent_id = parent_id.map(str::to_string);
        node.before_sibling_id = before_sibling_id;
        node.container_node_id = container;
        node.touch();
        txn.put(node);
    }
}

/// Recompute `container_node_id` for the subtree below `root_id`, parents first
fn repair_containers(txn: &mut StoreTxn<'_>, root_id: &str, plan: &mut WritePlan) {
    let mut queue: VecDeque<String> = txn.child_ids(Some(root_id)).into();
    let mut visited = HashSet::from([root_id.to_string()]);

    while let Some(id) = queue.pop_front() {
        if !visited.insert(id.clone()) {
            continue;
        }
        let Some(node) = txn.get(&id) else {
            continue;
        };
        let expected = txn.container_for_parent(node.parent_id.as_deref());
        if node.container_node_id != expected {
            txn.modify(&id, |n| {
                n.container_node_id = expected;
                n.touch();
            });
            plan.upsert(&id, Vec::new());
        }
        queue.extend(txn.child_ids(Some(&id)));
    }
}

/// Nearest ancestor-or-self of `node_id` at `depth`
fn ancestor_at_depth(txn: &StoreTxn<'_>, node_id: &str, depth: usize) -> Option<String> {
    let mut current = txn.get(node_id)?;
    let mut visited = HashSet::new();
    loop {
        if txn.depth(&current.id) == depth {
            return Some(current.id.clone());
        }
        if !visited.insert(current.id.clone()) {
            return None;
        }
        current = txn.get(current.parent_id.as_deref()?)?;
    }
}
