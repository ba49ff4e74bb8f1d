//! NodeStore - authoritative in-memory forest
//!
//! Keyed map of node records plus ephemeral [`UiState`], shared by every viewer
//! of a session through an `Arc<NodeStore>`.
//!
//! # Transactions
//!
//! All structural changes go through [`NodeStore::transaction`]. The closure runs
//! under the write lock; readers never see a half-applied sibling chain. Events
//! raised inside the closure are buffered and published once the lock has been
//! released, so listeners are free to read the store from their callbacks.
//!
//! # Notification
//!
//! - [`NodeStore::subscribe`] registers a synchronous listener and returns a
//!   [`Subscription`] handle; dropping the handle unsubscribes.
//! - [`NodeStore::subscribe_to_events`] hands out a broadcast receiver for async
//!   consumers.

use crate::config::HierarchyConfig;
use crate::db::{NodeEvent, UpdateSource, UpdateType};
use crate::models::{is_placeholder_content, HydrationOptions, Node, UiState};
use crate::services::sibling_order::{SiblingLookup, SiblingOrderResolver, SortedChildren};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tokio::sync::broadcast;

type Listener = Arc<dyn Fn(&NodeEvent) + Send + Sync>;

/// Node records, UI state, and the parent → children index
#[derive(Default)]
pub struct StoreState {
    nodes: HashMap<String, Node>,
    ui: HashMap<String, UiState>,
    /// Unsorted child ids per parent, in insertion order. Entries survive the
    /// removal of the parent so orphans stay queryable.
    children: HashMap<Option<String>, Vec<String>>,
}

impl SiblingLookup for StoreState {
    fn before_sibling_id(&self, node_id: &str) -> Option<&str> {
        self.nodes
            .get(node_id)
            .and_then(|n| n.before_sibling_id.as_deref())
    }
}

impl StoreState {
    fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    fn child_ids(&self, parent_id: Option<&str>) -> &[String] {
        self.children
            .get(&parent_id.map(str::to_string))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Insert or replace a record. Returns the previous record.
    fn insert(&mut self, node: Node) -> Option<Node> {
        let id = node.id.clone();
        let new_parent = node.parent_id.clone();
        let previous = self.nodes.insert(id.clone(), node);

        let old_parent = previous.as_ref().map(|p| p.parent_id.clone());
        if old_parent.as_ref() != Some(&new_parent) {
            if let Some(old_parent) = old_parent {
                self.unindex(&old_parent, &id);
            }
            self.children.entry(new_parent).or_default().push(id.clone());
        }

        if !self.ui.contains_key(&id) {
            let content = self.nodes.get(&id).map(|n| n.content.as_str()).unwrap_or("");
            let state = UiState {
                is_placeholder: is_placeholder_content(content),
                ..UiState::default()
            };
            self.ui.insert(id, state);
        }

        previous
    }

    fn remove(&mut self, id: &str) -> Option<Node> {
        let removed = self.nodes.remove(id)?;
        self.unindex(&removed.parent_id, id);
        self.ui.remove(id);
        Some(removed)
    }

    fn unindex(&mut self, parent_id: &Option<String>, id: &str) {
        if let Some(siblings) = self.children.get_mut(parent_id) {
            siblings.retain(|c| c != id);
            if siblings.is_empty() {
                self.children.remove(parent_id);
            }
        }
    }

    /// Depth from the parent's recorded depth; 0 when the parent is not loaded
    fn depth_from_parent(&self, node: &Node) -> usize {
        node.parent_id
            .as_deref()
            .and_then(|p| self.ui.get(p).filter(|_| self.nodes.contains_key(p)))
            .map(|ui| ui.depth + 1)
            .unwrap_or(0)
    }

    /// Recompute depth for `id` and its whole subtree
    fn recompute_depths(&mut self, id: &str) {
        let mut queue = VecDeque::from([id.to_string()]);
        let mut visited = HashSet::new();

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                tracing::error!(node_id = %current, "Parent cycle detected while recomputing depths");
                continue;
            }
            let depth = match self.nodes.get(&current) {
                Some(node) => self.depth_from_parent(node),
                None => continue,
            };
            if let Some(ui) = self.ui.get_mut(&current) {
                ui.depth = depth;
            }
            queue.extend(self.child_ids(Some(&current)).iter().cloned());
        }
    }

    /// Recompute every depth, breadth-first from roots and orphans
    fn recompute_all_depths(&mut self) {
        let starts: Vec<String> = self
            .nodes
            .values()
            .filter(|n| {
                n.parent_id
                    .as_deref()
                    .map_or(true, |p| !self.nodes.contains_key(p))
            })
            .map(|n| n.id.clone())
            .collect();

        for ui in self.ui.values_mut() {
            ui.depth = 0;
        }
        for id in starts {
            self.recompute_depths(&id);
        }
    }

    fn descendants(&self, id: &str) -> Vec<String> {
        let mut result = Vec::new();
        let mut queue: VecDeque<String> = self.child_ids(Some(id)).iter().cloned().collect();
        let mut visited = HashSet::from([id.to_string()]);

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            queue.extend(self.child_ids(Some(&current)).iter().cloned());
            result.push(current);
        }
        result
    }

    /// Container a child of `parent_id` must carry
    ///
    /// Walks up from the parent until a root or an explicit container is found.
    fn container_for_parent(&self, parent_id: Option<&str>) -> Option<String> {
        let mut current_id = parent_id?.to_string();
        let mut visited = HashSet::new();

        loop {
            let Some(current) = self.nodes.get(&current_id) else {
                // Unloaded ancestor: the topmost loaded id is the best answer we have
                return Some(current_id);
            };
            if current.is_root() {
                return Some(current.id.clone());
            }
            if let Some(container) = &current.container_node_id {
                return Some(container.clone());
            }
            if !visited.insert(current_id.clone()) {
                return Some(current_id);
            }
            match &current.parent_id {
                Some(parent) => current_id = parent.clone(),
                None => return Some(current_id),
            }
        }
    }
}

/// Write access to the store for the duration of one [`NodeStore::transaction`]
pub struct StoreTxn<'a> {
    state: RwLockWriteGuard<'a, StoreState>,
    resolver: &'a SiblingOrderResolver,
    events: Vec<NodeEvent>,
}

impl StoreTxn<'_> {
    pub fn get(&self, id: &str) -> Option<&Node> {
        self.state.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.nodes.contains_key(id)
    }

    pub fn ui(&self, id: &str) -> Option<&UiState> {
        self.state.ui.get(id)
    }

    pub fn ui_mut(&mut self, id: &str) -> Option<&mut UiState> {
        self.state.ui.get_mut(id)
    }

    pub fn set_ui(&mut self, id: &str, ui: UiState) {
        if self.state.nodes.contains_key(id) {
            self.state.ui.insert(id.to_string(), ui);
        }
    }

    pub fn depth(&self, id: &str) -> usize {
        self.state.ui.get(id).map(|ui| ui.depth).unwrap_or(0)
    }

    /// Unsorted child ids
    pub fn child_ids(&self, parent_id: Option<&str>) -> Vec<String> {
        self.state.child_ids(parent_id).to_vec()
    }

    pub fn has_children(&self, id: &str) -> bool {
        !self.state.child_ids(Some(id)).is_empty()
    }

    /// Children in chain order; corruption is reported as a buffered invalidation
    pub fn sorted_children(&mut self, parent_id: Option<&str>) -> Vec<String> {
        let ids = self.state.child_ids(parent_id).to_vec();
        let sorted = self.resolver.sort_children(&ids, parent_id, &*self.state);
        if let Some(event) = invalidation_for(&sorted, parent_id) {
            self.events.push(event);
        }
        sorted.ordered
    }

    pub fn descendants(&self, id: &str) -> Vec<String> {
        self.state.descendants(id)
    }

    pub fn node_ids(&self) -> Vec<String> {
        self.state.nodes.keys().cloned().collect()
    }

    pub fn container_for_parent(&self, parent_id: Option<&str>) -> Option<String> {
        self.state.container_for_parent(parent_id)
    }

    /// Insert or replace a record and invalidate the affected sibling orders
    pub fn put(&mut self, node: Node) -> Option<Node> {
        let new_parent = node.parent_id.clone();
        let previous = self.state.insert(node);
        if let Some(prev) = &previous {
            self.resolver.invalidate(prev.parent_id.as_deref());
        }
        self.resolver.invalidate(new_parent.as_deref());
        previous
    }

    /// Mutate a record in place. The parent pointer must not change here; use
    /// [`StoreTxn::put`] for moves.
    pub fn modify<F>(&mut self, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut Node),
    {
        let Some(mut node) = self.state.get(id).cloned() else {
            return false;
        };
        f(&mut node);
        self.put(node);
        true
    }

    pub fn remove(&mut self, id: &str) -> Option<Node> {
        let removed = self.state.remove(id)?;
        self.resolver.invalidate(removed.parent_id.as_deref());
        self.resolver.invalidate(Some(id));
        Some(removed)
    }

    pub fn recompute_depths(&mut self, id: &str) {
        self.state.recompute_depths(id);
    }

    pub fn emit(&mut self, event: NodeEvent) {
        self.events.push(event);
    }
}

/// Read access to one consistent state for the duration of [`NodeStore::snapshot`]
pub struct StoreSnapshot<'a> {
    state: RwLockReadGuard<'a, StoreState>,
    resolver: &'a SiblingOrderResolver,
    events: Vec<NodeEvent>,
}

impl StoreSnapshot<'_> {
    pub fn get(&self, id: &str) -> Option<&Node> {
        self.state.get(id)
    }

    pub fn ui(&self, id: &str) -> Option<&UiState> {
        self.state.ui.get(id)
    }

    pub fn has_children(&self, id: &str) -> bool {
        !self.state.child_ids(Some(id)).is_empty()
    }

    /// Children in chain order; corruption is published once the snapshot ends
    pub fn sorted_children(&mut self, parent_id: Option<&str>) -> Vec<String> {
        let ids = self.state.child_ids(parent_id).to_vec();
        let sorted = self.resolver.sort_children(&ids, parent_id, &*self.state);
        if let Some(event) = invalidation_for(&sorted, parent_id) {
            self.events.push(event);
        }
        sorted.ordered
    }
}

/// Registered listeners, shared with outstanding [`Subscription`] handles
#[derive(Default)]
struct ListenerRegistry {
    listeners: RwLock<Vec<(u64, Listener)>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    fn snapshot(&self) -> Vec<Listener> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| l.clone())
            .collect()
    }

    fn remove(&self, id: u64) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(lid, _)| *lid != id);
    }
}

/// Unsubscribe handle returned by [`NodeStore::subscribe`]
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    registry: Weak<ListenerRegistry>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

pub struct NodeStore {
    state: RwLock<StoreState>,
    resolver: SiblingOrderResolver,
    registry: Arc<ListenerRegistry>,
    event_tx: broadcast::Sender<NodeEvent>,
}

impl Default for NodeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeStore {
    pub fn new() -> Self {
        Self::with_config(&HierarchyConfig::default())
    }

    pub fn with_config(config: &HierarchyConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));
        Self {
            state: RwLock::new(StoreState::default()),
            resolver: SiblingOrderResolver::new(),
            registry: Arc::new(ListenerRegistry::default()),
            event_tx,
        }
    }

    pub fn get(&self, id: &str) -> Option<Node> {
        self.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().nodes.contains_key(id)
    }

    pub fn ui_state(&self, id: &str) -> Option<UiState> {
        self.read().ui.get(id).cloned()
    }

    pub fn depth(&self, id: &str) -> Option<usize> {
        self.read().ui.get(id).map(|ui| ui.depth)
    }

    pub fn len(&self) -> usize {
        self.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all_nodes(&self) -> Vec<Node> {
        self.read().nodes.values().cloned().collect()
    }

    /// Children of `parent_id` in storage order (unsorted)
    pub fn query_by_parent(&self, parent_id: Option<&str>) -> Vec<Node> {
        let state = self.read();
        state
            .child_ids(parent_id)
            .iter()
            .filter_map(|id| state.get(id).cloned())
            .collect()
    }

    /// Child ids of `parent_id` in sibling-chain order
    pub fn sorted_child_ids(&self, parent_id: Option<&str>) -> Vec<String> {
        let (sorted, event) = {
            let state = self.read();
            let ids = state.child_ids(parent_id).to_vec();
            let sorted = self.resolver.sort_children(&ids, parent_id, &*state);
            let event = invalidation_for(&sorted, parent_id);
            (sorted.ordered, event)
        };
        if let Some(event) = event {
            self.publish(vec![event]);
        }
        sorted
    }

    /// Children of `parent_id` in sibling-chain order
    pub fn children(&self, parent_id: Option<&str>) -> Vec<Node> {
        let ids = self.sorted_child_ids(parent_id);
        let state = self.read();
        ids.iter().filter_map(|id| state.get(id).cloned()).collect()
    }

    pub fn has_children(&self, id: &str) -> bool {
        !self.read().child_ids(Some(id)).is_empty()
    }

    /// Run `f` against a single read of the store
    ///
    /// Commits from other viewers wait until `f` returns. Invalidations raised
    /// while sorting are published after the read lock is released.
    pub fn snapshot<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut StoreSnapshot<'_>) -> R,
    {
        let (result, events) = {
            let mut snapshot = StoreSnapshot {
                state: self.read(),
                resolver: &self.resolver,
                events: Vec::new(),
            };
            let result = f(&mut snapshot);
            (result, std::mem::take(&mut snapshot.events))
        };
        self.publish(events);
        result
    }

    /// Run `f` under the write lock and publish its buffered events afterwards
    pub fn transaction<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut StoreTxn<'_>) -> R,
    {
        let (result, events) = {
            let mut txn = StoreTxn {
                state: self.state.write().unwrap_or_else(PoisonError::into_inner),
                resolver: &self.resolver,
                events: Vec::new(),
            };
            let result = f(&mut txn);
            (result, std::mem::take(&mut txn.events))
        };
        self.publish(events);
        result
    }

    /// Upsert a record from outside the mutator (remote change, persistence reply)
    ///
    /// Emits `NodeCreated` for new records and `NodeUpdated` per changed aspect.
    /// A moved record invalidates the cached order of its old and new parent.
    pub fn set(&self, node: Node, source: UpdateSource) {
        self.transaction(|txn| {
            let id = node.id.clone();
            let snapshot = node.clone();
            let previous = txn.put(node);

            match previous {
                None => {
                    txn.recompute_depths(&id);
                    txn.emit(NodeEvent::NodeCreated {
                        node: snapshot,
                        source,
                    });
                }
                Some(prev) => {
                    let moved = prev.parent_id != snapshot.parent_id
                        || prev.before_sibling_id != snapshot.before_sibling_id;
                    if prev.parent_id != snapshot.parent_id {
                        txn.recompute_depths(&id);
                    }
                    if prev.content != snapshot.content {
                        if let Some(ui) = txn.ui_mut(&id) {
                            ui.is_placeholder = is_placeholder_content(&snapshot.content);
                        }
                    }
                    for update_type in changed_aspects(&prev, &snapshot) {
                        txn.emit(NodeEvent::NodeUpdated {
                            node_id: id.clone(),
                            update_type,
                            source,
                        });
                    }
                    if moved {
                        let mut parents = vec![prev.parent_id.clone()];
                        if snapshot.parent_id != prev.parent_id {
                            parents.push(snapshot.parent_id.clone());
                        }
                        for parent in parents {
                            txn.emit(match parent {
                                Some(p) => NodeEvent::cache_invalidate_node(p, "remote move"),
                                None => NodeEvent::cache_invalidate_global("remote move"),
                            });
                        }
                    }
                }
            }
        })
    }

    /// Remove a record; children stay behind as orphans at depth 0
    pub fn delete(&self, id: &str, source: UpdateSource) -> Option<Node> {
        self.transaction(|txn| {
            let removed = txn.remove(id)?;
            for child in txn.child_ids(Some(id)) {
                txn.recompute_depths(&child);
            }
            txn.emit(NodeEvent::NodeDeleted {
                node_id: id.to_string(),
                source,
            });
            Some(removed)
        })
    }

    /// Bulk-load records from the persistence layer
    ///
    /// Hydrated nodes take their UI state from `options` unless they are already
    /// loaded. Nothing is written back.
    pub fn hydrate(&self, nodes: Vec<Node>, options: &HydrationOptions) -> usize {
        let mut events = Vec::with_capacity(nodes.len() + 1);
        let count = nodes.len();
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            for node in nodes {
                let id = node.id.clone();
                let ui = match state.ui.get(&id) {
                    Some(existing) => UiState {
                        is_placeholder: is_placeholder_content(&node.content),
                        ..existing.clone()
                    },
                    None => UiState::from_options(options, &node.content),
                };
                events.push(NodeEvent::NodeCreated {
                    node: node.clone(),
                    source: UpdateSource::Database,
                });
                state.insert(node);
                state.ui.insert(id, ui);
            }
            state.recompute_all_depths();
            self.resolver.invalidate_all();
        }
        events.push(NodeEvent::cache_invalidate_global("hydrate"));
        tracing::debug!("Hydrated {} nodes", count);
        self.publish(events);
        count
    }

    /// Record the version the persistence store assigned. No event.
    pub fn apply_persisted_version(&self, id: &str, version: i64) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        match state.nodes.get_mut(id) {
            Some(node) => {
                node.version = version;
                true
            }
            None => false,
        }
    }

    pub fn resolver(&self) -> &SiblingOrderResolver {
        &self.resolver
    }

    /// Register a synchronous listener
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&NodeEvent) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Subscribe to the async event stream
    pub fn subscribe_to_events(&self) -> broadcast::Receiver<NodeEvent> {
        self.event_tx.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.registry
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub(crate) fn publish(&self, events: Vec<NodeEvent>) {
        if events.is_empty() {
            return;
        }
        let listeners = self.registry.snapshot();
        for event in events {
            tracing::trace!(event_type = event.event_type(), "Publishing event");
            for listener in &listeners {
                listener(&event);
            }
            // No receivers is fine
            let _ = self.event_tx.send(event);
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }
}

fn invalidation_for(sorted: &SortedChildren, parent_id: Option<&str>) -> Option<NodeEvent> {
    if !sorted.requires_invalidation() {
        return None;
    }
    Some(match parent_id {
        Some(p) => NodeEvent::cache_invalidate_node(p, "sibling chain corrupted"),
        None => NodeEvent::cache_invalidate_global("root sibling chain corrupted"),
    })
}

fn changed_aspects(before: &Node, after: &Node) -> Vec<UpdateType> {
    let mut aspects = Vec::new();
    if before.content != after.content {
        aspects.push(UpdateType::Content);
    }
    if before.node_type != after.node_type {
        aspects.push(UpdateType::Type);
    }
    if before.properties != after.properties {
        aspects.push(UpdateType::Properties);
    }
    if before.mentions != after.mentions {
        aspects.push(UpdateType::Mentions);
    }
    aspects
}
