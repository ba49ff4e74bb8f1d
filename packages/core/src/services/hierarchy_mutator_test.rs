//! Structural operation tests for HierarchyMutator
//!
//! Each test hydrates a small forest with fixed ids, runs one or two
//! operations, and inspects pointers, depths, and the resulting writes.

#[cfg(test)]
mod structural_tests {
    use crate::db::{
        HierarchyChangeType, InMemoryPersistenceStore, NodeEvent, PersistenceStore, UpdateType,
        WriteKind,
    };
    use crate::models::{HydrationOptions, Node};
    use crate::operations::{CreateNodeParams, NodeOperationError};
    use crate::services::{HierarchyMutator, NodeStore, PersistenceScheduler};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    struct Fixture {
        store: Arc<NodeStore>,
        persistence: Arc<InMemoryPersistenceStore>,
        scheduler: Arc<PersistenceScheduler>,
        mutator: HierarchyMutator,
    }

    /// Build nodes from `(id, parent, before)` triples with correct containers
    fn forest(layout: &[(&str, Option<&str>, Option<&str>)]) -> Vec<Node> {
        let parents: HashMap<&str, Option<&str>> =
            layout.iter().map(|(id, parent, _)| (*id, *parent)).collect();

        layout.iter()
            .map(|(id, parent, before)| {
                let mut root = *parent;
                while let Some(p) = root {
                    match parents.get(p).copied().flatten() {
                        Some(up) => root = Some(up),
                        None => break,
                    }
                }
                let mut node = Node::new_with_id(
                    id.to_string(),
                    "text".to_string(),
                    id.to_string(),
                    parent.map(str::to_string),
                    json!({}),
                )
                .with_before_sibling(before.map(str::to_string));
                node.container_node_id = root.map(str::to_string);
                node
            })
            .collect()
    }

    fn fixture(layout: &[(&str, Option<&str>, Option<&str>)]) -> Fixture {
        let nodes = forest(layout);
        let store = Arc::new(NodeStore::new());
        let persistence = Arc::new(InMemoryPersistenceStore::with_nodes(nodes.clone()));
        store.hydrate(nodes, &HydrationOptions::default());
        let scheduler = Arc::new(PersistenceScheduler::new(
            persistence.clone(),
            store.clone(),
        ));
        let mutator = HierarchyMutator::new(store.clone(), scheduler.clone());
        Fixture {
            store,
            persistence,
            scheduler,
            mutator,
        }
    }

    fn record_events(store: &NodeStore) -> (Arc<Mutex<Vec<NodeEvent>>>, crate::services::Subscription) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let sub = store.subscribe(move |e| sink.lock().unwrap().push(e.clone()));
        (events, sub)
    }

    impl Fixture {
        fn node(&self, id: &str) -> Node {
            self.store
                .get(id)
                .unwrap_or_else(|| panic!("node '{}' missing", id))
        }

        fn before(&self, id: &str) -> Option<String> {
            self.node(id).before_sibling_id
        }

        fn parent(&self, id: &str) -> Option<String> {
            self.node(id).parent_id
        }

        fn container(&self, id: &str) -> Option<String> {
            self.node(id).container_node_id
        }

        fn depth(&self, id: &str) -> usize {
            self.store.depth(id).unwrap()
        }

        fn children(&self, id: Option<&str>) -> Vec<String> {
            self.store.sorted_child_ids(id)
        }
    }

    fn s(id: &str) -> Option<String> {
        Some(id.to_string())
    }

    // ------------------------------------------------------------------
    // create
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_create_after_root_splices_into_chain() {
        let f = fixture(&[
            ("A", None, None),
            ("B", None, Some("A")),
            ("C", None, Some("B")),
        ]);

        let n = f.mutator.create("A", "", "text", false).unwrap();

        assert_eq!(f.before(&n), s("A"));
        assert_eq!(f.before("B"), Some(n.clone()));
        assert_eq!(f.parent(&n), None);
        assert_eq!(f.container(&n), None);
        assert_eq!(f.children(None), vec!["A", n.as_str(), "B", "C"]);

        let ui = f.store.ui_state(&n).unwrap();
        assert_eq!(ui.depth, 0);
        assert!(ui.auto_focus);
        assert!(ui.is_placeholder);

        let report = f.scheduler.flush_all().await;
        assert!(report.is_clean());
        let created = f.persistence.write_position(&n, WriteKind::Set).await.unwrap();
        let repointed = f.persistence.write_position("B", WriteKind::Set).await.unwrap();
        assert!(created < repointed, "successor must not reference an unstored node");
    }

    #[test]
    fn test_create_at_beginning_takes_position() {
        let f = fixture(&[("A", None, None), ("B", None, Some("A"))]);

        let n = f.mutator.create("B", "x", "text", true).unwrap();

        assert_eq!(f.before(&n), s("A"));
        assert_eq!(f.before("B"), Some(n.clone()));
        assert_eq!(f.children(None), vec!["A", n.as_str(), "B"]);
    }

    #[test]
    fn test_create_under_nested_parent_inherits_container() {
        let f = fixture(&[
            ("R", None, None),
            ("P", Some("R"), None),
            ("A", Some("P"), None),
        ]);

        let n = f.mutator.create("A", "next", "text", false).unwrap();

        assert_eq!(f.parent(&n), s("P"));
        assert_eq!(f.container(&n), s("R"));
        assert_eq!(f.depth(&n), 2);
    }

    #[tokio::test]
    async fn test_create_split_transfers_children_of_expanded_node() {
        let f = fixture(&[
            ("A", None, None),
            ("A1", Some("A"), None),
            ("A2", Some("A"), Some("A1")),
            ("A2x", Some("A2"), None),
        ]);

        let n = f.mutator.create("A", "tail", "text", false).unwrap();

        assert_eq!(f.children(Some(&n)), vec!["A1", "A2"]);
        assert!(f.children(Some("A")).is_empty());
        assert_eq!(f.container("A1"), Some(n.clone()));
        assert_eq!(f.container("A2x"), Some(n.clone()));
        assert_eq!(f.depth("A2x"), 2);

        f.scheduler.flush_all().await;
        let created = f.persistence.write_position(&n, WriteKind::Set).await.unwrap();
        for child in ["A1", "A2"] {
            let moved = f.persistence.write_position(child, WriteKind::Set).await.unwrap();
            assert!(created < moved, "{} written before its new parent", child);
        }
    }

    #[test]
    fn test_create_keeps_children_of_collapsed_node() {
        let f = fixture(&[("A", None, None), ("A1", Some("A"), None)]);
        assert!(f.mutator.set_expanded("A", false));

        let n = f.mutator.create("A", "", "text", false).unwrap();

        assert_eq!(f.children(Some("A")), vec!["A1"]);
        assert!(f.children(Some(&n)).is_empty());
    }

    #[test]
    fn test_create_after_unknown_node_fails() {
        let f = fixture(&[("A", None, None)]);
        assert!(f.mutator.create("missing", "", "text", false).is_none());
        assert!(matches!(
            f.mutator.try_create("missing", "", "text", false),
            Err(NodeOperationError::NodeNotFound { .. })
        ));
        assert_eq!(f.store.len(), 1);
    }

    #[test]
    fn test_create_node_appends_or_inserts() -> anyhow::Result<()> {
        let f = fixture(&[
            ("P", None, None),
            ("A", Some("P"), None),
            ("B", Some("P"), Some("A")),
        ]);

        let last = f
            .mutator
            .create_node(CreateNodeParams::new("text", "last").with_parent("P"))?;
        assert_eq!(f.before(&last), s("B"));

        let middle = f.mutator.create_node(
            CreateNodeParams::new("task", "middle")
                .with_id("M")
                .with_parent("P")
                .after_sibling("A")
                .with_properties(json!({"task": {"status": "pending"}})),
        )?;
        assert_eq!(middle, "M");
        assert_eq!(f.before("B"), s("M"));
        assert_eq!(f.children(Some("P")), vec!["A", "M", "B", last.as_str()]);
        assert_eq!(f.container("M"), s("P"));

        assert!(matches!(
            f.mutator
                .create_node(CreateNodeParams::new("text", "dup").with_id("M")),
            Err(NodeOperationError::InvalidOperation { .. })
        ));
        assert!(matches!(
            f.mutator
                .create_node(CreateNodeParams::new("text", "x").with_parent("nope")),
            Err(NodeOperationError::InvalidParent { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_create_node_first_root_of_empty_store() -> anyhow::Result<()> {
        let f = fixture(&[]);
        let id = f
            .mutator
            .create_node(CreateNodeParams::new("text", "Document"))?;
        assert_eq!(f.children(None), vec![id.clone()]);
        assert_eq!(f.before(&id), None);
        assert_eq!(f.depth(&id), 0);
        Ok(())
    }

    // ------------------------------------------------------------------
    // indent / outdent
    // ------------------------------------------------------------------

    #[test]
    fn test_indent_appends_to_previous_sibling() {
        let f = fixture(&[
            ("A", None, None),
            ("B", None, Some("A")),
            ("B1", Some("B"), None),
            ("C", None, Some("B")),
        ]);
        f.mutator.set_expanded("B", false);
        let (events, _sub) = record_events(&f.store);

        assert!(f.mutator.indent("C"));

        assert_eq!(f.parent("C"), s("B"));
        assert_eq!(f.before("C"), s("B1"));
        assert_eq!(f.container("C"), s("B"));
        assert_eq!(f.depth("C"), 1);
        assert!(f.store.ui_state("B").unwrap().expanded);
        assert_eq!(f.children(None), vec!["A", "B"]);

        let events = events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            NodeEvent::HierarchyChanged { change_type: HierarchyChangeType::Indent, affected_node_ids }
                if affected_node_ids.contains(&"C".to_string())
        )));
    }

    #[test]
    fn test_indent_repairs_subtree_containers_and_depths() {
        let f = fixture(&[
            ("A", None, None),
            ("B", None, Some("A")),
            ("B1", Some("B"), None),
            ("B2", Some("B1"), None),
            ("C", None, Some("B")),
        ]);

        assert!(f.mutator.indent("B"));

        assert_eq!(f.parent("B"), s("A"));
        assert_eq!(f.before("C"), s("A"), "successor closes the gap");
        assert_eq!(f.container("B"), s("A"));
        assert_eq!(f.container("B1"), s("A"));
        assert_eq!(f.container("B2"), s("A"));
        assert_eq!((f.depth("B"), f.depth("B1"), f.depth("B2")), (1, 2, 3));
    }

    #[test]
    fn test_indent_first_sibling_is_rejected() {
        let f = fixture(&[("A", None, None), ("B", None, Some("A"))]);
        let (events, _sub) = record_events(&f.store);

        assert!(!f.mutator.indent("A"));
        assert!(matches!(
            f.mutator.try_indent("A"),
            Err(NodeOperationError::NoValidTarget { .. })
        ));
        assert!(events.lock().unwrap().is_empty());
        assert_eq!(f.scheduler.pending_count(), 0);
    }

    #[test]
    fn test_outdent_takes_trailing_siblings() {
        let f = fixture(&[
            ("A", None, None),
            ("B", Some("A"), None),
            ("C", Some("B"), None),
            ("D", Some("B"), Some("C")),
        ]);

        assert!(f.mutator.outdent("C"));

        assert_eq!(f.parent("C"), s("A"));
        assert_eq!(f.before("C"), s("B"));
        assert_eq!(f.parent("D"), s("C"));
        assert_eq!(f.before("D"), None);
        assert_eq!(f.container("D"), s("A"));
        assert_eq!((f.depth("C"), f.depth("D")), (1, 2));
        assert!(f.store.ui_state("C").unwrap().expanded);
        assert_eq!(f.children(Some("A")), vec!["B", "C"]);
    }

    #[test]
    fn test_outdent_appends_trailing_after_existing_children() {
        let f = fixture(&[
            ("A", None, None),
            ("B", Some("A"), None),
            ("C", Some("B"), None),
            ("C1", Some("C"), None),
            ("D", Some("B"), Some("C")),
            ("E", Some("B"), Some("D")),
            ("X", Some("A"), Some("B")),
        ]);

        assert!(f.mutator.outdent("C"));

        assert_eq!(f.children(Some("C")), vec!["C1", "D", "E"]);
        assert_eq!(f.before("D"), s("C1"));
        assert_eq!(f.before("E"), s("D"));
        assert_eq!(f.before("X"), s("C"), "old parent's successor follows C");
        assert_eq!(f.children(Some("A")), vec!["B", "C", "X"]);
    }

    #[tokio::test]
    async fn test_outdent_trailing_writes_follow_chain_order() {
        let f = fixture(&[
            ("A", None, None),
            ("B", Some("A"), None),
            ("C", Some("B"), None),
            ("D", Some("B"), Some("C")),
            ("E", Some("B"), Some("D")),
        ]);
        assert!(f.mutator.outdent("C"));

        let pending = f.scheduler.pending_write("E").unwrap();
        assert!(pending.dependencies.contains("C"));
        assert!(pending.dependencies.contains("D"));

        f.scheduler.flush_all().await;
        let log = f.persistence.write_log().await;
        let pos = |id: &str| log.iter().position(|r| r.node_id == id).unwrap();
        assert!(pos("C") < pos("D"));
        assert!(pos("D") < pos("E"));
    }

    #[test]
    fn test_outdent_to_root_level() {
        let f = fixture(&[
            ("R", None, None),
            ("X", Some("R"), None),
            ("Y", Some("R"), Some("X")),
            ("Y1", Some("Y"), None),
            ("S", None, Some("R")),
        ]);

        assert!(f.mutator.outdent("X"));

        assert_eq!(f.parent("X"), None);
        assert_eq!(f.container("X"), None);
        assert_eq!(f.children(None), vec!["R", "X", "S"]);
        assert_eq!(f.parent("Y"), s("X"));
        assert_eq!(f.container("Y"), s("X"));
        assert_eq!(f.container("Y1"), s("X"));
        assert_eq!(f.depth("Y1"), 2);
    }

    #[test]
    fn test_outdent_root_is_rejected() {
        let f = fixture(&[("A", None, None)]);
        assert!(!f.mutator.outdent("A"));
        assert!(matches!(
            f.mutator.try_outdent("A"),
            Err(NodeOperationError::NoValidTarget { .. })
        ));
    }

    #[test]
    fn test_outdent_with_unloaded_parent_is_rejected() {
        let f = fixture(&[("C", Some("unloaded"), None)]);
        assert!(matches!(
            f.mutator.try_outdent("C"),
            Err(NodeOperationError::InvalidParent { .. })
        ));
    }

    #[test]
    fn test_indent_then_outdent_restores_position() {
        let f = fixture(&[
            ("A", None, None),
            ("B", None, Some("A")),
            ("C", None, Some("B")),
        ]);

        assert!(f.mutator.indent("B"));
        assert!(f.mutator.outdent("B"));

        assert_eq!(f.parent("B"), None);
        assert_eq!(f.before("B"), s("A"));
        assert_eq!(f.before("C"), s("B"));
        assert_eq!(f.children(None), vec!["A", "B", "C"]);
        assert_eq!(f.depth("B"), 0);
    }

    // ------------------------------------------------------------------
    // combine / delete
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_combine_moves_children_to_previous() {
        let f = fixture(&[
            ("R", None, None),
            ("A", Some("R"), None),
            ("B", Some("R"), Some("A")),
            ("B1", Some("B"), None),
        ]);

        assert!(f.mutator.combine("B", "A"));

        assert!(f.store.get("B").is_none());
        assert_eq!(f.node("A").content, "AB");
        assert_eq!(f.parent("B1"), s("A"));
        assert_eq!(f.container("B1"), s("R"));
        assert_eq!(f.depth("B1"), 2);
        assert_eq!(f.children(Some("R")), vec!["A"]);

        f.scheduler.flush_all().await;
        let moved = f.persistence.write_position("B1", WriteKind::Set).await.unwrap();
        let deleted = f
            .persistence
            .write_position("B", WriteKind::Delete)
            .await
            .unwrap();
        assert!(moved < deleted, "delete waits for promoted children");
        assert!(f.persistence.get("B").await.unwrap().is_none());
    }

    #[test]
    fn test_combine_root_promotes_children_into_its_slot() {
        let f = fixture(&[
            ("A", None, None),
            ("B", None, Some("A")),
            ("B1", Some("B"), None),
            ("B1a", Some("B1"), None),
            ("B2", Some("B"), Some("B1")),
            ("C", None, Some("B")),
        ]);

        assert!(f.mutator.combine("B", "A"));

        assert_eq!(f.children(None), vec!["A", "B1", "B2", "C"]);
        assert_eq!(f.before("B1"), s("A"));
        assert_eq!(f.before("C"), s("B2"));
        assert_eq!(f.container("B1"), None);
        assert_eq!(f.container("B1a"), s("B1"));
        assert_eq!((f.depth("B1"), f.depth("B1a")), (0, 1));
        for node in f.store.all_nodes() {
            assert_ne!(node.container_node_id.as_deref(), Some("B"));
        }
    }

    #[test]
    fn test_combine_into_deeper_previous_uses_ancestor_at_same_depth() {
        let f = fixture(&[
            ("R", None, None),
            ("A", Some("R"), None),
            ("A1", Some("A"), None),
            ("A2", Some("A1"), None),
            ("B", Some("R"), Some("A")),
            ("B1", Some("B"), None),
        ]);

        assert!(f.mutator.combine("B", "A2"));

        assert_eq!(f.node("A2").content, "A2B");
        assert_eq!(f.parent("B1"), s("A"));
        assert_eq!(f.before("B1"), s("A1"));
        assert_eq!(f.depth("B1"), 2);
        assert_eq!(f.children(Some("A")), vec!["A1", "B1"]);
    }

    #[test]
    fn test_combine_into_parent_takes_current_slot() {
        let f = fixture(&[
            ("P", None, None),
            ("C", Some("P"), None),
            ("C1", Some("C"), None),
            ("D", Some("P"), Some("C")),
        ]);

        assert!(f.mutator.combine("C", "P"));

        assert_eq!(f.children(Some("P")), vec!["C1", "D"]);
        assert_eq!(f.before("C1"), None);
        assert_eq!(f.before("D"), s("C1"));
        assert_eq!(f.depth("C1"), 1);
    }

    #[test]
    fn test_combine_rejects_previous_inside_current_subtree() {
        let f = fixture(&[("A", None, None), ("A1", Some("A"), None)]);
        assert!(matches!(
            f.mutator.try_combine("A", "A1"),
            Err(NodeOperationError::CircularReference { .. })
        ));
        assert!(!f.mutator.combine("A", "A"));
        assert!(f.store.get("A").is_some());
    }

    #[test]
    fn test_combine_updates_mentions_of_previous() {
        let target = "550e8400-e29b-41d4-a716-446655440000";
        let f = fixture(&[("A", None, None), ("B", None, Some("A"))]);
        f.mutator
            .update_content("B", &format!(" see nodespace://{}", target));

        assert!(f.mutator.combine("B", "A"));
        assert_eq!(f.node("A").mentions, vec![target.to_string()]);
    }

    #[tokio::test]
    async fn test_delete_leaves_children_orphaned() {
        let f = fixture(&[
            ("A", None, None),
            ("A1", Some("A"), None),
            ("B", None, Some("A")),
        ]);

        assert!(f.mutator.delete("A"));

        assert!(f.store.get("A").is_none());
        assert_eq!(f.parent("A1"), s("A"), "children are not promoted");
        assert_eq!(f.depth("A1"), 0);
        assert_eq!(f.before("B"), None);
        assert_eq!(f.children(None), vec!["B"]);
        assert_eq!(f.store.query_by_parent(Some("A")).len(), 1);

        f.scheduler.flush_all().await;
        let repointed = f.persistence.write_position("B", WriteKind::Set).await.unwrap();
        let deleted = f
            .persistence
            .write_position("A", WriteKind::Delete)
            .await
            .unwrap();
        assert!(repointed < deleted);
    }

    #[test]
    fn test_delete_unknown_node_fails() {
        let f = fixture(&[("A", None, None)]);
        assert!(!f.mutator.delete("missing"));
    }

    // ------------------------------------------------------------------
    // expand / content / teardown
    // ------------------------------------------------------------------

    #[test]
    fn test_toggle_expanded_emits_and_never_writes() {
        let f = fixture(&[("A", None, None), ("A1", Some("A"), None)]);
        let (events, _sub) = record_events(&f.store);

        assert!(f.mutator.toggle_expanded("A"));
        assert!(!f.store.ui_state("A").unwrap().expanded);
        assert!(f.mutator.toggle_expanded("A"));
        assert!(f.mutator.set_expanded("A", true), "no-op still succeeds");
        assert!(!f.mutator.toggle_expanded("missing"));

        let kinds: Vec<HierarchyChangeType> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                NodeEvent::HierarchyChanged { change_type, .. } => Some(*change_type),
                _ => None,
            })
            .collect();
        assert_eq!(
            kinds,
            vec![HierarchyChangeType::Collapse, HierarchyChangeType::Expand]
        );
        assert_eq!(f.scheduler.pending_count(), 0);
    }

    #[test]
    fn test_type_and_property_updates_write_immediately() {
        let f = fixture(&[("A", None, None)]);
        f.store
            .set(
                Node {
                    properties: json!({"task": {"status": "pending"}, "keep": true}),
                    ..f.node("A")
                },
                crate::db::UpdateSource::External,
            );

        assert!(f.mutator.update_node_type("A", "task"));
        assert!(f
            .mutator
            .update_properties("A", json!({"task": {"status": "done"}})));
        assert!(!f.mutator.update_node_type("A", ""));
        assert!(!f.mutator.update_properties("missing", json!({})));

        let node = f.node("A");
        assert_eq!(node.node_type, "task");
        assert_eq!(node.properties["task"]["status"], "done");
        assert_eq!(node.properties["keep"], true);

        let pending = f.scheduler.pending_write("A").unwrap();
        match pending.write {
            crate::db::PersistedWrite::Upsert { node } => assert_eq!(node.node_type, "task"),
            other => panic!("expected upsert, got {:?}", other),
        }
    }

    #[test]
    fn test_update_content_without_runtime_runs_both_tiers() {
        let target = "6ba7b810-9dad-11d1-80b4-00c04fd430c8";
        let f = fixture(&[("A", None, None)]);
        let (events, _sub) = record_events(&f.store);

        assert!(f
            .mutator
            .update_content("A", &format!("[@x](nodespace://{})", target)));

        assert_eq!(f.node("A").mentions, vec![target.to_string()]);
        assert!(f.scheduler.is_pending("A"));
        let events = events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            NodeEvent::NodeUpdated { update_type: UpdateType::Mentions, .. }
        )));
        assert!(events
            .iter()
            .any(|e| matches!(e, NodeEvent::ReferencesUpdateNeeded { node_id } if node_id == "A")));
    }

    #[test]
    fn test_remote_changes_are_not_written_back() {
        let f = fixture(&[("A", None, None)]);
        let mut remote = Node::new_with_id(
            "R".to_string(),
            "text".to_string(),
            "from elsewhere".to_string(),
            None,
            json!({}),
        )
        .with_before_sibling(s("A"));
        remote.version = 3;

        f.mutator.apply_remote_node(remote).unwrap();
        assert_eq!(f.children(None), vec!["A", "R"]);
        assert!(f.mutator.apply_remote_delete("A"));
        assert!(f.store.get("A").is_none());
        assert_eq!(f.scheduler.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_teardown_cancels_unflushed_placeholder_creates() {
        let f = fixture(&[("A", None, None)]);

        let persisted = f.mutator.create("A", "", "text", false).unwrap();
        f.scheduler.flush_all().await;
        let fresh = f.mutator.create(&persisted, "  ", "text", false).unwrap();
        let kept = f.mutator.create(&fresh, "real text", "text", false).unwrap();

        let mut removed = f.mutator.teardown_placeholders(None);
        removed.sort();
        let mut expected = vec![persisted.clone(), fresh.clone()];
        expected.sort();
        assert_eq!(removed, expected);
        assert_eq!(f.children(None), vec!["A", kept.as_str()]);
        assert_eq!(f.before(&kept), s("A"));

        f.scheduler.flush_all().await;
        let log = f.persistence.write_log().await;
        assert!(log
            .iter()
            .any(|r| r.node_id == persisted && r.kind == WriteKind::Delete));
        assert!(
            log.iter().all(|r| r.node_id != fresh),
            "never-persisted placeholder must not reach the store"
        );
        assert_eq!(
            f.persistence.get(&kept).await.unwrap().unwrap().before_sibling_id,
            s("A")
        );
    }
}
