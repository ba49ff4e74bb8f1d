//! Dependency-Ordered Persistence Scheduler
//!
//! Mutations return as soon as the in-memory forest is updated. The durable
//! writes they produce are queued here and flushed later to the
//! [`PersistenceStore`].
//!
//! ## Ordering
//!
//! Each queued write carries a set of dependencies: node ids whose own pending
//! writes must land first. A write is ready when none of its dependencies is
//! queued, in flight, or parked after a failure. Pending writes for the payload's
//! `parent_id`, `before_sibling_id` and `container_node_id` are added as implicit
//! dependencies at enqueue time. Independent writes may be reordered.
//!
//! If the queue is non-empty but nothing is ready, the writes form a dependency
//! cycle; the oldest write is forced through with a warning.
//!
//! ## Coalescing
//!
//! One queue slot per node. A newer write replaces the queued payload and its
//! dependencies are unioned with the old ones.
//!
//! The last version the store acknowledged is remembered per node. An upsert
//! snapshotted before that acknowledgement arrived is raised to it on enqueue,
//! so the session never conflicts with its own earlier write.
//!
//! ## Conflicts
//!
//! A `VersionConflict` is never retried automatically. The write is parked, and
//! everything depending on it stays queued, until the caller supplies a merged
//! record via [`PersistenceScheduler::resolve_conflict`] or drops the local
//! change via [`PersistenceScheduler::discard_conflict`].
//!
//! ## Worker
//!
//! [`PersistenceScheduler::spawn_worker`] starts an event-driven background
//! task: it sleeps until a write is enqueued, drains everything that is ready,
//! and goes back to sleep.

use crate::db::{PersistedWrite, PersistenceStore, StoreError, UpdateSource};
use crate::models::Node;
use crate::services::NodeStore;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A queued write and what it waits for
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    pub write: PersistedWrite,
    pub dependencies: BTreeSet<String>,
    /// Queue order of the first write coalesced into this slot
    pub sequence: u64,
    /// Set for the creation of a node the store has never seen
    pub is_create: bool,
}

impl PendingWrite {
    pub fn node_id(&self) -> &str {
        self.write.node_id()
    }
}

/// A write that failed and waits for a caller decision
#[derive(Debug, Clone)]
pub struct ParkedWrite {
    pub pending: PendingWrite,
    pub error: StoreError,
}

impl ParkedWrite {
    pub fn node_id(&self) -> &str {
        self.pending.node_id()
    }

    /// The store's current record, when the failure was a version conflict
    pub fn current_node(&self) -> Option<&Node> {
        match &self.error {
            StoreError::VersionConflict { current_node, .. } => Some(current_node),
            _ => None,
        }
    }
}

/// Outcome of a flush
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Upserts accepted by the store, in write order
    pub written: Vec<String>,
    /// Deletes accepted by the store, in write order
    pub deleted: Vec<String>,
    /// Writes parked on a version conflict
    pub conflicts: Vec<String>,
    /// Writes parked on any other store error
    pub failed: Vec<String>,
    /// Writes forced through a dependency cycle
    pub forced: Vec<String>,
}

impl FlushReport {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty() && self.failed.is_empty()
    }

    pub fn total_written(&self) -> usize {
        self.written.len() + self.deleted.len()
    }

    fn merge(&mut self, other: FlushReport) {
        self.written.extend(other.written);
        self.deleted.extend(other.deleted);
        self.conflicts.extend(other.conflicts);
        self.failed.extend(other.failed);
        self.forced.extend(other.forced);
    }
}

#[derive(Default)]
struct QueueState {
    queue: HashMap<String, PendingWrite>,
    in_flight: HashSet<String>,
    parked: HashMap<String, ParkedWrite>,
    /// Last version acknowledged by the store, per node
    durable_versions: HashMap<String, i64>,
    next_sequence: u64,
}

impl QueueState {
    fn is_blocking(&self, id: &str) -> bool {
        self.queue.contains_key(id) || self.in_flight.contains(id) || self.parked.contains_key(id)
    }

    fn is_ready(&self, pending: &PendingWrite) -> bool {
        let id = pending.node_id();
        !self.in_flight.contains(id)
            && !self.parked.contains_key(id)
            && pending
                .dependencies
                .iter()
                .all(|dep| dep == id || !self.is_blocking(dep))
    }

    /// Queued writes that transitively wait on a parked write
    fn blocked_by_parked(&self) -> HashSet<String> {
        let mut blocked: HashSet<String> = HashSet::new();
        loop {
            let mut changed = false;
            for (id, pending) in &self.queue {
                if blocked.contains(id) {
                    continue;
                }
                let waits = self.parked.contains_key(id)
                    || pending
                        .dependencies
                        .iter()
                        .any(|d| d != id && (self.parked.contains_key(d) || blocked.contains(d)));
                if waits {
                    blocked.insert(id.clone());
                    changed = true;
                }
            }
            if !changed {
                return blocked;
            }
        }
    }

    /// Move up to `limit` ready writes, oldest first, into flight
    fn take_ready(&mut self, limit: usize) -> Vec<PendingWrite> {
        let mut ready: Vec<(u64, String)> = self
            .queue
            .values()
            .filter(|p| self.is_ready(p))
            .map(|p| (p.sequence, p.node_id().to_string()))
            .collect();
        ready.sort();
        ready.truncate(limit.max(1));
        self.take(ready.into_iter().map(|(_, id)| id))
    }

    /// Oldest queued write not waiting on a parked write
    fn take_forced(&mut self) -> Option<PendingWrite> {
        let blocked = self.blocked_by_parked();
        let oldest = self
            .queue
            .values()
            .filter(|p| !blocked.contains(p.node_id()) && !self.in_flight.contains(p.node_id()))
            .min_by_key(|p| p.sequence)
            .map(|p| p.node_id().to_string())?;
        self.take(std::iter::once(oldest)).pop()
    }

    /// Raise a stale upsert to the last acknowledged version
    fn rebase(&self, write: &mut PersistedWrite) {
        if let PersistedWrite::Upsert { node } = write {
            if let Some(&durable) = self.durable_versions.get(&node.id) {
                if node.version < durable {
                    tracing::trace!(
                        node_id = %node.id,
                        from = node.version,
                        to = durable,
                        "Rebased stale write onto acknowledged version"
                    );
                    node.version = durable;
                }
            }
        }
    }

    fn take(&mut self, ids: impl Iterator<Item = String>) -> Vec<PendingWrite> {
        ids.filter_map(|id| {
            let pending = self.queue.remove(&id)?;
            self.in_flight.insert(id);
            Some(pending)
        })
        .collect()
    }
}

pub struct PersistenceScheduler {
    store: Arc<dyn PersistenceStore>,
    node_store: Arc<NodeStore>,
    state: Mutex<QueueState>,
    /// Serializes flushes between the worker and direct callers
    flush_lock: tokio::sync::Mutex<()>,
    batch_size: usize,
    waker: Mutex<Option<mpsc::Sender<()>>>,
}

impl PersistenceScheduler {
    pub fn new(store: Arc<dyn PersistenceStore>, node_store: Arc<NodeStore>) -> Self {
        Self::with_batch_size(store, node_store, crate::config::DEFAULT_FLUSH_BATCH_SIZE)
    }

    pub fn with_config(
        store: Arc<dyn PersistenceStore>,
        node_store: Arc<NodeStore>,
        config: &crate::config::HierarchyConfig,
    ) -> Self {
        Self::with_batch_size(store, node_store, config.flush_batch_size)
    }

    pub fn with_batch_size(
        store: Arc<dyn PersistenceStore>,
        node_store: Arc<NodeStore>,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            node_store,
            state: Mutex::new(QueueState::default()),
            flush_lock: tokio::sync::Mutex::new(()),
            batch_size: batch_size.max(1),
            waker: Mutex::new(None),
        }
    }

    pub fn node_store(&self) -> &Arc<NodeStore> {
        &self.node_store
    }

    /// Queue a write with no explicit dependencies
    pub fn enqueue(&self, write: PersistedWrite, source: UpdateSource) -> bool {
        self.enqueue_with_dependencies(write, source, Vec::new())
    }

    /// Queue the creation of a node that was never persisted
    pub fn enqueue_create(&self, node: Node, dependencies: Vec<String>) -> bool {
        self.submit(PersistedWrite::upsert(node), UpdateSource::Viewer, dependencies, true)
    }

    /// Queue a write that must land after the writes of `dependencies`
    ///
    /// Returns `false` when the source does not require write-back.
    pub fn enqueue_with_dependencies(
        &self,
        write: PersistedWrite,
        source: UpdateSource,
        dependencies: Vec<String>,
    ) -> bool {
        self.submit(write, source, dependencies, false)
    }

    fn submit(
        &self,
        mut write: PersistedWrite,
        source: UpdateSource,
        dependencies: Vec<String>,
        is_create: bool,
    ) -> bool {
        if !source.requires_write_back() {
            tracing::trace!(
                node_id = write.node_id(),
                ?source,
                "Skipping write-back for non-viewer change"
            );
            return false;
        }

        {
            let mut state = self.lock();
            let node_id = write.node_id().to_string();

            let mut deps: BTreeSet<String> = dependencies.into_iter().collect();
            for referenced in write.referenced_ids() {
                if state.is_blocking(referenced) {
                    deps.insert(referenced.to_string());
                }
            }
            deps.remove(&node_id);
            state.rebase(&mut write);

            match state.queue.get_mut(&node_id) {
                Some(existing) => {
                    // A delete of a node the store never saw cancels the create
                    if existing.is_create && write.is_delete() {
                        state.queue.remove(&node_id);
                        tracing::debug!(node_id = %node_id, "Delete cancelled queued create");
                        return true;
                    }
                    existing.write = write;
                    existing.dependencies.extend(deps);
                    tracing::trace!(node_id = %node_id, "Coalesced queued write");
                }
                None => {
                    let sequence = state.next_sequence;
                    state.next_sequence += 1;
                    tracing::trace!(node_id = %node_id, dependencies = ?deps, "Queued write");
                    state.queue.insert(
                        node_id,
                        PendingWrite {
                            write,
                            dependencies: deps,
                            sequence,
                            is_create,
                        },
                    );
                }
            }
        }

        self.wake();
        true
    }

    /// Drop the queued creation of a node the store has never seen
    ///
    /// Returns `false` when the node has no queued create (already flushed, in
    /// flight, or never created locally).
    pub fn cancel_unflushed_create(&self, node_id: &str) -> bool {
        let mut state = self.lock();
        match state.queue.get(node_id) {
            Some(pending) if pending.is_create => {
                state.queue.remove(node_id);
                true
            }
            _ => false,
        }
    }

    /// Drop any queued write for `node_id`. In-flight and parked writes stay.
    pub fn cancel(&self, node_id: &str) -> bool {
        self.lock().queue.remove(node_id).is_some()
    }

    pub fn pending_count(&self) -> usize {
        let state = self.lock();
        state.queue.len() + state.in_flight.len()
    }

    pub fn is_pending(&self, node_id: &str) -> bool {
        let state = self.lock();
        state.queue.contains_key(node_id) || state.in_flight.contains(node_id)
    }

    /// Snapshot of the queued write for `node_id`
    pub fn pending_write(&self, node_id: &str) -> Option<PendingWrite> {
        self.lock().queue.get(node_id).cloned()
    }

    pub fn conflicts(&self) -> Vec<ParkedWrite> {
        let mut parked: Vec<ParkedWrite> = self.lock().parked.values().cloned().collect();
        parked.sort_by_key(|p| p.pending.sequence);
        parked
    }

    /// Re-queue a parked write with a merged record
    ///
    /// The merged record is adopted by the NodeStore and re-based on the
    /// store's current version. Any newer local write for the node is folded
    /// into the merged one.
    pub fn resolve_conflict(&self, node_id: &str, mut merged: Node) -> bool {
        {
            let mut state = self.lock();
            let Some(parked) = state.parked.remove(node_id) else {
                return false;
            };

            if let Some(current) = parked.current_node() {
                merged.version = current.version;
                state
                    .durable_versions
                    .insert(node_id.to_string(), current.version);
            }
            let mut pending = parked.pending.clone();
            if let Some(newer) = state.queue.remove(node_id) {
                pending.dependencies.extend(newer.dependencies);
            }
            pending.write = PersistedWrite::upsert(merged.clone());
            state.queue.insert(node_id.to_string(), pending);
        }

        tracing::info!(node_id, "Conflict resolved with merged record");
        self.node_store.set(merged, UpdateSource::Database);
        self.wake();
        true
    }

    /// Drop a parked write and any newer queued write for the node
    ///
    /// For a version conflict the store's record is adopted by the NodeStore.
    pub fn discard_conflict(&self, node_id: &str) -> bool {
        let parked = {
            let mut state = self.lock();
            let Some(parked) = state.parked.remove(node_id) else {
                return false;
            };
            state.queue.remove(node_id);
            if let Some(current) = parked.current_node() {
                state
                    .durable_versions
                    .insert(node_id.to_string(), current.version);
            }
            parked
        };

        if let Some(current) = parked.current_node() {
            self.node_store.set(current.clone(), UpdateSource::Database);
        }
        tracing::info!(node_id, "Discarded local change after failed write");
        self.wake();
        true
    }

    /// Flush until nothing further can be written
    pub async fn flush_all(&self) -> FlushReport {
        let _guard = self.flush_lock.lock().await;
        let mut report = FlushReport::default();

        loop {
            let batch = self.lock().take_ready(self.batch_size);
            if !batch.is_empty() {
                report.merge(self.execute(batch).await);
                continue;
            }

            let forced = self.lock().take_forced();
            match forced {
                Some(pending) => {
                    tracing::warn!(
                        node_id = pending.node_id(),
                        dependencies = ?pending.dependencies,
                        "Dependency cycle in persistence queue; forcing oldest write"
                    );
                    report.forced.push(pending.node_id().to_string());
                    report.merge(self.execute(vec![pending]).await);
                }
                None => break,
            }
        }

        if report.total_written() > 0 || !report.is_clean() {
            tracing::debug!(
                written = report.written.len(),
                deleted = report.deleted.len(),
                conflicts = report.conflicts.len(),
                failed = report.failed.len(),
                "Persistence flush complete"
            );
        }
        report
    }

    async fn execute(&self, batch: Vec<PendingWrite>) -> FlushReport {
        let mut report = FlushReport::default();

        for pending in batch {
            let node_id = pending.node_id().to_string();
            let result = match &pending.write {
                PersistedWrite::Upsert { node } => self
                    .store
                    .set(node.clone(), UpdateSource::Viewer)
                    .await
                    .map(Some),
                PersistedWrite::Delete { node_id } => {
                    let deps: Vec<String> = pending.dependencies.iter().cloned().collect();
                    self.store
                        .delete(node_id, UpdateSource::Viewer, &deps)
                        .await
                        .map(|_| None)
                }
            };

            let mut state = self.lock();
            state.in_flight.remove(&node_id);

            match result {
                Ok(Some(saved)) => {
                    state.durable_versions.insert(node_id.clone(), saved.version);
                    // Newer queued write for the same node must carry the new version
                    if let Some(PendingWrite {
                        write: PersistedWrite::Upsert { node },
                        is_create,
                        ..
                    }) = state.queue.get_mut(&node_id)
                    {
                        node.version = saved.version;
                        *is_create = false;
                    }
                    drop(state);
                    self.node_store.apply_persisted_version(&node_id, saved.version);
                    report.written.push(node_id);
                }
                Ok(None) => {
                    state.durable_versions.remove(&node_id);
                    drop(state);
                    report.deleted.push(node_id);
                }
                Err(error) => {
                    if error.is_version_conflict() {
                        tracing::warn!(node_id = %node_id, "Write rejected: {}", error);
                        report.conflicts.push(node_id.clone());
                    } else {
                        tracing::error!(node_id = %node_id, "Write failed: {}", error);
                        report.failed.push(node_id.clone());
                    }
                    state.parked.insert(node_id, ParkedWrite { pending, error });
                }
            }
        }

        report
    }

    /// Start the background flush worker
    pub fn spawn_worker(self: &Arc<Self>) -> PersistenceWorker {
        let (trigger_tx, mut trigger_rx) = mpsc::channel::<()>(10);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        *self.waker.lock().unwrap_or_else(PoisonError::into_inner) = Some(trigger_tx.clone());

        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tracing::info!("PersistenceScheduler worker started");
            loop {
                tokio::select! {
                    biased;

                    _ = shutdown_rx.recv() => {
                        let report = scheduler.flush_all().await;
                        tracing::info!(
                            "PersistenceScheduler worker shutting down ({} final writes)",
                            report.total_written()
                        );
                        break;
                    }

                    Some(_) = trigger_rx.recv() => {
                        // Coalesce rapid triggers
                        while trigger_rx.try_recv().is_ok() {}
                        scheduler.flush_all().await;
                    }
                }
            }
        });

        // Pick up anything queued before the worker existed
        let _ = trigger_tx.try_send(());

        PersistenceWorker {
            shutdown_tx,
            handle,
        }
    }

    fn wake(&self) {
        let waker = self.waker.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = waker.as_ref() {
            match tx.try_send(()) {
                Ok(_) | Err(mpsc::error::TrySendError::Full(_)) => {}
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!("Persistence worker has shut down, wake ignored");
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to the background worker started by [`PersistenceScheduler::spawn_worker`]
pub struct PersistenceWorker {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl PersistenceWorker {
    /// Flush what is ready and stop the worker
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.handle.await {
            tracing::error!("Persistence worker terminated abnormally: {}", e);
        }
    }
}
