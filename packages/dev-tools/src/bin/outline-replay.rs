//! Outline Replay Binary
//!
//! Hydrates a JSON fixture into a fresh hierarchy session, replays a list of
//! editing operations against it, and prints the resulting outline together
//! with the writes that reached the (in-memory) persistence store.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p nodespace-dev-tools --bin outline-replay -- fixtures/outline.json
//!
//! # Watch scheduler and resolver activity
//! RUST_LOG=nodespace_hierarchy=debug cargo run -p nodespace-dev-tools --bin outline-replay -- fixtures/outline.json
//! ```
//!
//! # Fixture Format
//!
//! ```json
//! {
//!   "nodes": [{ "id": "a", "content": "First" }, { "id": "b", "beforeSiblingId": "a" }],
//!   "operations": [{ "op": "indent", "nodeId": "b" }]
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Logging level (default: "info")
//! - `NODESPACE_CONTENT_REFRESH_MS` / `NODESPACE_CONTENT_PERSIST_MS`: debounce windows

use anyhow::{bail, Context, Result};
use nodespace_hierarchy::db::{InMemoryPersistenceStore, WriteKind};
use nodespace_hierarchy::models::{HydrationOptions, Node};
use nodespace_hierarchy::services::{
    HierarchyMutator, NodeStore, PersistenceScheduler, ViewProjector,
};
use nodespace_hierarchy::HierarchyConfig;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Fixture {
    #[serde(default)]
    view_root: Option<String>,
    nodes: Vec<FixtureNode>,
    #[serde(default)]
    operations: Vec<Operation>,
}

/// Node record with everything but the id optional
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FixtureNode {
    id: String,
    #[serde(default = "default_node_type")]
    node_type: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    container_node_id: Option<String>,
    #[serde(default)]
    before_sibling_id: Option<String>,
    #[serde(default)]
    properties: Option<serde_json::Value>,
}

fn default_node_type() -> String {
    "text".to_string()
}

impl FixtureNode {
    fn into_node(self) -> Node {
        let container_node_id = self.container_node_id.or_else(|| self.parent_id.clone());
        let mut node = Node::new_with_id(
            self.id,
            self.node_type,
            self.content,
            self.parent_id,
            self.properties.unwrap_or_else(|| serde_json::json!({})),
        )
        .with_before_sibling(self.before_sibling_id);
        node.container_node_id = container_node_id;
        node
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
enum Operation {
    #[serde(rename_all = "camelCase")]
    Create {
        after_id: String,
        #[serde(default)]
        content: String,
        #[serde(default = "default_node_type")]
        node_type: String,
        #[serde(default)]
        insert_at_beginning: bool,
    },
    #[serde(rename_all = "camelCase")]
    Indent { node_id: String },
    #[serde(rename_all = "camelCase")]
    Outdent { node_id: String },
    #[serde(rename_all = "camelCase")]
    Combine {
        current_id: String,
        previous_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Delete { node_id: String },
    #[serde(rename_all = "camelCase")]
    Toggle { node_id: String },
    #[serde(rename_all = "camelCase")]
    UpdateContent { node_id: String, content: String },
    Teardown,
}

impl Operation {
    fn apply(&self, mutator: &HierarchyMutator, view_root: Option<&str>) -> bool {
        match self {
            Operation::Create {
                after_id,
                content,
                node_type,
                insert_at_beginning,
            } => match mutator.create(after_id, content, node_type, *insert_at_beginning) {
                Some(id) => {
                    tracing::info!("created {}", id);
                    true
                }
                None => false,
            },
            Operation::Indent { node_id } => mutator.indent(node_id),
            Operation::Outdent { node_id } => mutator.outdent(node_id),
            Operation::Combine {
                current_id,
                previous_id,
            } => mutator.combine(current_id, previous_id),
            Operation::Delete { node_id } => mutator.delete(node_id),
            Operation::Toggle { node_id } => mutator.toggle_expanded(node_id),
            Operation::UpdateContent { node_id, content } => {
                mutator.update_content(node_id, content)
            }
            Operation::Teardown => {
                let removed = mutator.teardown_placeholders(view_root);
                tracing::info!("removed {} placeholder(s)", removed.len());
                true
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let Some(path) = env::args().nth(1).map(PathBuf::from) else {
        bail!("usage: outline-replay <fixture.json>");
    };

    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read fixture {}", path.display()))?;
    let fixture: Fixture = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse fixture {}", path.display()))?;

    let nodes: Vec<Node> = fixture
        .nodes
        .into_iter()
        .map(FixtureNode::into_node)
        .collect();
    for node in &nodes {
        node.validate()
            .with_context(|| format!("Invalid fixture node '{}'", node.id))?;
    }

    let config = HierarchyConfig::from_env();
    let store = Arc::new(NodeStore::with_config(&config));
    let persistence = Arc::new(InMemoryPersistenceStore::with_nodes(nodes.clone()));
    let scheduler = Arc::new(PersistenceScheduler::with_config(
        persistence.clone(),
        store.clone(),
        &config,
    ));
    let mutator = HierarchyMutator::with_config(store.clone(), scheduler.clone(), config);
    let projector = ViewProjector::new(store.clone());

    let hydrated = store.hydrate(nodes, &HydrationOptions::default());
    tracing::info!("📦 Hydrated {} nodes from {}", hydrated, path.display());

    let worker = scheduler.spawn_worker();
    let view_root = fixture.view_root.as_deref();

    for (index, operation) in fixture.operations.iter().enumerate() {
        if operation.apply(&mutator, view_root) {
            tracing::debug!("#{} applied {:?}", index, operation);
        } else {
            tracing::warn!("#{} rejected {:?}", index, operation);
        }
    }

    mutator.flush_pending_edits();
    worker.shutdown().await;

    for parked in scheduler.conflicts() {
        tracing::warn!("unresolved write for '{}': {}", parked.node_id(), parked.error);
    }

    println!("Outline:");
    for row in projector.project(view_root) {
        let marker = match (row.has_children, row.expanded) {
            (false, _) => "-",
            (true, true) => "v",
            (true, false) => ">",
        };
        println!(
            "{}{} {} [{}]",
            "  ".repeat(row.depth),
            marker,
            if row.node.content.is_empty() {
                "<empty>"
            } else {
                row.node.content.as_str()
            },
            row.node.id
        );
    }

    println!();
    println!("Writes:");
    for record in persistence.write_log().await {
        let kind = match record.kind {
            WriteKind::Set => "set",
            WriteKind::Delete => "delete",
        };
        match record.version {
            Some(version) => println!("  {} {} (v{})", kind, record.node_id, version),
            None => println!("  {} {}", kind, record.node_id),
        }
    }

    Ok(())
}
