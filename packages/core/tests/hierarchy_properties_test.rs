//! Hierarchy Property Tests
//!
//! Drives long pseudo-random sequences of structural operations against a small
//! forest and checks the structural invariants after every step:
//!
//! - every sibling group resolves to a clean chain
//! - `depth(child) == depth(parent) + 1`, and 0 when the parent is not loaded
//! - `container_node_id` names the nearest root for fully loaded ancestries
//!
//! A flush at the end must leave the durable store mirroring the in-memory forest.

#[cfg(test)]
mod hierarchy_property_tests {
    use anyhow::Result;
    use nodespace_hierarchy::db::{InMemoryPersistenceStore, PersistenceStore};
    use nodespace_hierarchy::models::{HydrationOptions, Node};
    use nodespace_hierarchy::services::{
        resolve_sibling_order, HierarchyMutator, NodeStore, PersistenceScheduler, ViewProjector,
    };
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Small deterministic generator so failures reproduce from the seed
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self) -> u64 {
            self.0 = self
                .0
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            self.0 >> 33
        }

        fn below(&mut self, n: usize) -> usize {
            (self.next() % n as u64) as usize
        }

        fn pick<'a>(&mut self, items: &'a [String]) -> &'a str {
            &items[self.below(items.len())]
        }
    }

    struct Session {
        store: Arc<NodeStore>,
        persistence: Arc<InMemoryPersistenceStore>,
        scheduler: Arc<PersistenceScheduler>,
        mutator: HierarchyMutator,
        projector: ViewProjector,
    }

    fn node(id: &str, parent: Option<&str>, container: Option<&str>, before: Option<&str>) -> Node {
        let mut node = Node::new_with_id(
            id.to_string(),
            "text".to_string(),
            format!("{} ", id),
            parent.map(str::to_string),
            json!({}),
        )
        .with_before_sibling(before.map(str::to_string));
        node.container_node_id = container.map(str::to_string);
        node
    }

    /// Three roots, each with three children; the middle child has two children
    fn seed_forest() -> Vec<Node> {
        let mut nodes = Vec::new();
        let mut previous_root: Option<String> = None;
        for r in 0..3 {
            let root = format!("r{}", r);
            nodes.push(node(&root, None, None, previous_root.as_deref()));

            let mut previous_child: Option<String> = None;
            for c in 0..3 {
                let child = format!("{}c{}", root, c);
                nodes.push(node(&child, Some(&root), Some(&root), previous_child.as_deref()));
                if c == 1 {
                    nodes.push(node(&format!("{}g0", child), Some(&child), Some(&root), None));
                    nodes.push(node(
                        &format!("{}g1", child),
                        Some(&child),
                        Some(&root),
                        Some(&format!("{}g0", child)),
                    ));
                }
                previous_child = Some(child);
            }
            previous_root = Some(root);
        }
        nodes
    }

    fn session() -> Session {
        let nodes = seed_forest();
        let store = Arc::new(NodeStore::new());
        let persistence = Arc::new(InMemoryPersistenceStore::with_nodes(nodes.clone()));
        store.hydrate(nodes, &HydrationOptions::default());
        let scheduler = Arc::new(PersistenceScheduler::new(
            persistence.clone(),
            store.clone(),
        ));
        let mutator = HierarchyMutator::new(store.clone(), scheduler.clone());
        let projector = ViewProjector::new(store.clone());
        Session {
            store,
            persistence,
            scheduler,
            mutator,
            projector,
        }
    }

    fn sorted_ids(store: &NodeStore) -> Vec<String> {
        let mut ids: Vec<String> = store.all_nodes().into_iter().map(|n| n.id).collect();
        ids.sort();
        ids
    }

    fn assert_invariants(store: &NodeStore, step: &str) {
        let nodes: HashMap<String, Node> = store
            .all_nodes()
            .into_iter()
            .map(|n| (n.id.clone(), n))
            .collect();
        let lookup: HashMap<String, Option<String>> = nodes
            .values()
            .map(|n| (n.id.clone(), n.before_sibling_id.clone()))
            .collect();

        let mut groups: HashMap<Option<String>, Vec<String>> = HashMap::new();
        for n in nodes.values() {
            groups.entry(n.parent_id.clone()).or_default().push(n.id.clone());
        }
        for (parent, mut ids) in groups {
            ids.sort();
            let sorted = resolve_sibling_order(&ids, parent.as_deref(), &lookup);
            assert!(
                sorted.is_clean(),
                "{}: chain under {:?} is corrupt: {:?}",
                step,
                parent,
                sorted.issues
            );
            let mut resolved = sorted.ordered.clone();
            resolved.sort();
            assert_eq!(resolved, ids, "{}: sort is not a permutation", step);
        }

        for n in nodes.values() {
            let depth = store.depth(&n.id).unwrap_or(usize::MAX);
            let expected = match n.parent_id.as_deref().filter(|p| nodes.contains_key(*p)) {
                Some(parent) => store.depth(parent).unwrap_or(usize::MAX) + 1,
                None => 0,
            };
            assert_eq!(depth, expected, "{}: depth of '{}'", step, n.id);

            // Nearest root, when every ancestor is loaded
            let mut root = n;
            let mut fully_loaded = true;
            while let Some(parent) = root.parent_id.as_deref() {
                match nodes.get(parent) {
                    Some(p) => root = p,
                    None => {
                        fully_loaded = false;
                        break;
                    }
                }
            }
            if fully_loaded {
                let expected = if n.is_root() { None } else { Some(root.id.clone()) };
                assert_eq!(
                    n.container_node_id, expected,
                    "{}: container of '{}'",
                    step, n.id
                );
            }
        }
    }

    fn run_random_ops(session: &Session, seed: u64, steps: usize) {
        let mut rng = Lcg(seed);

        for step in 0..steps {
            let ids = sorted_ids(&session.store);
            if ids.is_empty() {
                break;
            }
            let label;
            match rng.below(6) {
                0 => {
                    let after = rng.pick(&ids).to_string();
                    let content = if rng.below(3) == 0 { String::new() } else { format!("n{}", step) };
                    let at_beginning = rng.below(4) == 0;
                    session.mutator.create(&after, &content, "text", at_beginning);
                    label = format!("seed {} step {} create after {}", seed, step, after);
                }
                1 => {
                    let id = rng.pick(&ids).to_string();
                    session.mutator.indent(&id);
                    label = format!("seed {} step {} indent {}", seed, step, id);
                }
                2 => {
                    let id = rng.pick(&ids).to_string();
                    session.mutator.outdent(&id);
                    label = format!("seed {} step {} outdent {}", seed, step, id);
                }
                3 => {
                    let visible = session.projector.visible_ids(None);
                    if visible.len() < 2 {
                        continue;
                    }
                    let i = 1 + rng.below(visible.len() - 1);
                    session.mutator.combine(&visible[i], &visible[i - 1]);
                    label = format!(
                        "seed {} step {} combine {} into {}",
                        seed,
                        step,
                        visible[i],
                        visible[i - 1]
                    );
                }
                4 => {
                    if ids.len() <= 4 {
                        continue;
                    }
                    let id = rng.pick(&ids).to_string();
                    session.mutator.delete(&id);
                    label = format!("seed {} step {} delete {}", seed, step, id);
                }
                _ => {
                    let id = rng.pick(&ids).to_string();
                    session.mutator.toggle_expanded(&id);
                    label = format!("seed {} step {} toggle {}", seed, step, id);
                }
            }
            assert_invariants(&session.store, &label);
        }
    }

    #[test]
    fn test_structural_invariants_hold_under_random_operations() {
        for seed in 1..=25 {
            let session = session();
            assert_invariants(&session.store, "hydrated");
            run_random_ops(&session, seed, 150);
        }
    }

    #[test]
    fn test_durable_store_mirrors_forest_after_flush() -> Result<()> {
        for seed in [3u64, 17, 42] {
            let session = session();
            run_random_ops(&session, seed, 120);

            let report = tokio_test::block_on(session.scheduler.flush_all());
            assert!(report.is_clean(), "seed {}: {:?}", seed, report);
            assert_eq!(session.scheduler.pending_count(), 0);

            let mut durable: Vec<Node> = tokio_test::block_on(session.persistence.all_nodes());
            durable.sort_by(|a, b| a.id.cmp(&b.id));
            let mut local = session.store.all_nodes();
            local.sort_by(|a, b| a.id.cmp(&b.id));

            let ids = |nodes: &[Node]| nodes.iter().map(|n| n.id.clone()).collect::<Vec<_>>();
            assert_eq!(ids(&durable), ids(&local), "seed {}: node sets differ", seed);

            for (d, l) in durable.iter().zip(local.iter()) {
                assert_eq!(d.parent_id, l.parent_id, "seed {}: parent of {}", seed, l.id);
                assert_eq!(d.before_sibling_id, l.before_sibling_id, "seed {}: before of {}", seed, l.id);
                assert_eq!(d.container_node_id, l.container_node_id, "seed {}: container of {}", seed, l.id);
                assert_eq!(d.content, l.content, "seed {}: content of {}", seed, l.id);
                assert_eq!(d.version, l.version, "seed {}: version of {}", seed, l.id);
            }

            for id in ids(&local) {
                assert!(
                    tokio_test::block_on(session.persistence.get(&id))?.is_some(),
                    "seed {}: '{}' not durable",
                    seed,
                    id
                );
            }
        }
        Ok(())
    }

    #[test]
    fn test_indent_then_outdent_restores_position_for_every_node() {
        for id in sorted_ids(&session().store) {
            let session = session();
            let before = session.store.get(&id).expect("seeded node");
            let siblings = session.store.sorted_child_ids(before.parent_id.as_deref());

            if !session.mutator.indent(&id) {
                continue;
            }
            assert!(session.mutator.outdent(&id), "outdent of '{}' after indent", id);

            let after = session.store.get(&id).expect("node survives");
            assert_eq!(after.parent_id, before.parent_id, "parent of '{}'", id);
            assert_eq!(after.before_sibling_id, before.before_sibling_id, "before of '{}'", id);
            assert_eq!(
                session.store.sorted_child_ids(before.parent_id.as_deref()),
                siblings,
                "sibling order around '{}'",
                id
            );
            assert_invariants(&session.store, &format!("indent/outdent {}", id));
        }
    }

    #[test]
    fn test_combine_rehomes_children_and_clears_container() {
        let session = session();
        // r1 has children; combine it into the last visible row above it
        let visible = session.projector.visible_ids(None);
        let index = visible.iter().position(|id| id == "r1").expect("r1 visible");
        let previous = visible[index - 1].clone();

        assert!(session.mutator.combine("r1", &previous));
        assert!(!session.store.contains("r1"));

        for child in ["r1c0", "r1c1", "r1c2"] {
            let node = session.store.get(child).expect("child survives");
            assert!(node.is_root(), "'{}' should be a root after combining a root", child);
            assert_eq!(session.store.depth(child), Some(0));
        }
        assert!(session
            .store
            .all_nodes()
            .iter()
            .all(|n| n.container_node_id.as_deref() != Some("r1")));
        assert_invariants(&session.store, "combine r1");
    }

    #[test]
    fn test_delete_orphans_children_unlike_combine() {
        let session = session();
        assert!(session.mutator.delete("r1c1"));

        for orphan in ["r1c1g0", "r1c1g1"] {
            let node = session.store.get(orphan).expect("orphan kept");
            assert_eq!(node.parent_id.as_deref(), Some("r1c1"));
            assert_eq!(session.store.depth(orphan), Some(0));
        }
        assert_eq!(session.store.query_by_parent(Some("r1c1")).len(), 2);
        assert!(!session.projector.visible_ids(None).contains(&"r1c1g0".to_string()));
        assert_invariants(&session.store, "delete r1c1");
    }
}
