//! In-memory PersistenceStore
//!
//! Reference implementation of the persistence contract with OCC semantics.
//! Used by tests and by the `outline-replay` dev tool. Every accepted write is
//! appended to a log so write ordering can be asserted.

use crate::db::{PersistenceStore, StoreError, UpdateSource};
use crate::models::{DeleteResult, Node};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Kind of write accepted by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Set,
    Delete,
}

/// One entry of the store's write log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub kind: WriteKind,
    pub node_id: String,
    pub source: UpdateSource,
    pub version: Option<i64>,
}

#[derive(Default)]
struct Inner {
    nodes: HashMap<String, Node>,
    log: Vec<WriteRecord>,
}

/// HashMap-backed store
#[derive(Default)]
pub struct InMemoryPersistenceStore {
    inner: RwLock<Inner>,
}

impl InMemoryPersistenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with durable records (not logged)
    pub fn with_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        let nodes = nodes.into_iter().map(|n| (n.id.clone(), n)).collect();
        Self {
            inner: RwLock::new(Inner {
                nodes,
                log: Vec::new(),
            }),
        }
    }

    /// All accepted writes, oldest first
    pub async fn write_log(&self) -> Vec<WriteRecord> {
        self.inner.read().await.log.clone()
    }

    /// Position of the first accepted write for `node_id`
    pub async fn write_position(&self, node_id: &str, kind: WriteKind) -> Option<usize> {
        self.inner
            .read()
            .await
            .log
            .iter()
            .position(|r| r.node_id == node_id && r.kind == kind)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.nodes.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Snapshot of every stored record
    pub async fn all_nodes(&self) -> Vec<Node> {
        self.inner.read().await.nodes.values().cloned().collect()
    }
}

#[async_trait]
impl PersistenceStore for InMemoryPersistenceStore {
    async fn get(&self, id: &str) -> Result<Option<Node>, StoreError> {
        Ok(self.inner.read().await.nodes.get(id).cloned())
    }

    async fn set(&self, mut node: Node, source: UpdateSource) -> Result<Node, StoreError> {
        node.validate()
            .map_err(|e| StoreError::backend(format!("rejected node '{}': {}", node.id, e)))?;

        let mut inner = self.inner.write().await;

        let new_version = match inner.nodes.get(&node.id) {
            Some(existing) => {
                if source.checks_version() && existing.version != node.version {
                    return Err(StoreError::version_conflict(node.version, existing.clone()));
                }
                existing.version + 1
            }
            None => node.version.max(1),
        };

        node.version = new_version;
        inner.nodes.insert(node.id.clone(), node.clone());
        inner.log.push(WriteRecord {
            kind: WriteKind::Set,
            node_id: node.id.clone(),
            source,
            version: Some(new_version),
        });

        Ok(node)
    }

    async fn delete(
        &self,
        id: &str,
        source: UpdateSource,
        _dependencies: &[String],
    ) -> Result<DeleteResult, StoreError> {
        let mut inner = self.inner.write().await;
        let existed = inner.nodes.remove(id).is_some();
        inner.log.push(WriteRecord {
            kind: WriteKind::Delete,
            node_id: id.to_string(),
            source,
            version: None,
        });

        Ok(if existed {
            DeleteResult::existed()
        } else {
            DeleteResult::not_found()
        })
    }

    async fn query_by_parent(&self, parent_id: Option<&str>) -> Result<Vec<Node>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .nodes
            .values()
            .filter(|n| n.parent_id.as_deref() == parent_id)
            .cloned()
            .collect())
    }
}
