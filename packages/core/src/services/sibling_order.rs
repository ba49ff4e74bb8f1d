//! Sibling Order Resolution
//!
//! Converts a parent's unordered child-id list into display order by walking the
//! `before_sibling_id` chain.
//!
//! # Corruption Policy
//!
//! Reads never fail. A broken chain is logged with full diagnostics, resolved
//! best-effort, and reported so dependent projections can be told to recompute:
//!
//! | Condition        | Result                                       |
//! |------------------|----------------------------------------------|
//! | no head          | input order                                  |
//! | several heads    | first candidate wins; other chains appended  |
//! | cycle            | chain from the head, then the unvisited ids  |
//! | unreachable ids  | appended after the chain in input order      |
//!
//! The output is always a permutation of the input.
//!
//! # Memoization
//!
//! Results are cached per parent together with the unsorted list they were built
//! from. An entry is reused only when the next request passes an identical list
//! (same ids, same order). Pointer changes that keep the list intact are invisible
//! to that check, so structural mutations must call [`SiblingOrderResolver::invalidate`].

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Read access to sibling pointers
pub trait SiblingLookup {
    /// `before_sibling_id` of `node_id`; `None` when null or the node is unknown
    fn before_sibling_id(&self, node_id: &str) -> Option<&str>;
}

impl SiblingLookup for HashMap<String, Option<String>> {
    fn before_sibling_id(&self, node_id: &str) -> Option<&str> {
        self.get(node_id).and_then(|b| b.as_deref())
    }
}

/// Chain corruption detected while sorting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainIntegrityIssue {
    /// Every sibling points at another sibling
    NoHead,
    /// More than one sibling claims the head position
    MultipleHeads { heads: Vec<String> },
    /// Following pointers revisits a node
    Cycle { node_ids: Vec<String> },
    /// Ids not reachable from the chosen head
    Orphans { node_ids: Vec<String> },
}

/// Result of [`SiblingOrderResolver::sort_children`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortedChildren {
    pub ordered: Vec<String>,
    pub issues: Vec<ChainIntegrityIssue>,
    /// True when served from the memo cache (issues were reported when it was built)
    pub from_cache: bool,
}

impl SortedChildren {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// True only for a freshly computed result whose corruption must be signalled
    pub fn requires_invalidation(&self) -> bool {
        !self.from_cache && !self.issues.is_empty()
    }
}

#[derive(Debug, Clone)]
struct CachedOrder {
    unsorted: Vec<String>,
    sorted: Vec<String>,
    issues: Vec<ChainIntegrityIssue>,
}

/// Cache counters, mostly for tests and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Memoizing sibling-chain resolver
#[derive(Default)]
pub struct SiblingOrderResolver {
    cache: Mutex<HashMap<Option<String>, CachedOrder>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SiblingOrderResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sort `child_ids` (children of `parent_id`, `None` = roots)
    pub fn sort_children<L: SiblingLookup + ?Sized>(
        &self,
        child_ids: &[String],
        parent_id: Option<&str>,
        lookup: &L,
    ) -> SortedChildren {
        let key = parent_id.map(str::to_string);

        {
            let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = cache.get(&key) {
                if entry.unsorted.as_slice() == child_ids {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return SortedChildren {
                        ordered: entry.sorted.clone(),
                        issues: entry.issues.clone(),
                        from_cache: true,
                    };
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let result = resolve_sibling_order(child_ids, parent_id, lookup);

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.insert(
            key,
            CachedOrder {
                unsorted: child_ids.to_vec(),
                sorted: result.ordered.clone(),
                issues: result.issues.clone(),
            },
        );

        result
    }

    /// Drop the memoized order of one parent
    pub fn invalidate(&self, parent_id: Option<&str>) {
        let key = parent_id.map(str::to_string);
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
    }

    pub fn invalidate_all(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self
                .cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
        }
    }
}

/// Uncached chain walk
pub fn resolve_sibling_order<L: SiblingLookup + ?Sized>(
    child_ids: &[String],
    parent_id: Option<&str>,
    lookup: &L,
) -> SortedChildren {
    if child_ids.len() <= 1 {
        return SortedChildren {
            ordered: child_ids.to_vec(),
            issues: Vec::new(),
            from_cache: false,
        };
    }

    let members: HashSet<&str> = child_ids.iter().map(String::as_str).collect();

    // predecessor -> node. A second claimant for the same predecessor is left out
    // and surfaces as an orphan.
    let mut successor: HashMap<&str, &str> = HashMap::with_capacity(child_ids.len());
    let mut heads: Vec<&str> = Vec::new();
    for id in child_ids {
        match lookup.before_sibling_id(id) {
            Some(before) if members.contains(before) => {
                successor.entry(before).or_insert(id.as_str());
            }
            _ => heads.push(id.as_str()),
        }
    }

    let mut issues = Vec::new();

    if heads.is_empty() {
        tracing::error!(
            parent_id = parent_id.unwrap_or("<root>"),
            pointers = %describe_pointers(child_ids, lookup),
            "Sibling chain has no head; returning children unsorted"
        );
        return SortedChildren {
            ordered: child_ids.to_vec(),
            issues: vec![ChainIntegrityIssue::NoHead],
            from_cache: false,
        };
    }

    if heads.len() > 1 {
        tracing::error!(
            parent_id = parent_id.unwrap_or("<root>"),
            heads = ?heads,
            pointers = %describe_pointers(child_ids, lookup),
            "Sibling chain has {} heads; using the first",
            heads.len()
        );
        issues.push(ChainIntegrityIssue::MultipleHeads {
            heads: heads.iter().map(|h| h.to_string()).collect(),
        });
    }

    let mut visited: HashSet<&str> = HashSet::with_capacity(child_ids.len());
    let mut ordered: Vec<String> = Vec::with_capacity(child_ids.len());
    // Each node has one predecessor and the head has none, so this walk cannot
    // revisit a node. Cycles can only sit among the unvisited ids.
    let mut current = Some(heads[0]);
    while let Some(id) = current {
        visited.insert(id);
        ordered.push(id.to_string());
        current = successor.get(id).copied();
    }

    let unvisited: Vec<&str> = child_ids
        .iter()
        .map(String::as_str)
        .filter(|id| !visited.contains(id))
        .collect();

    if let Some(node_ids) = find_cycle(&unvisited, lookup) {
        tracing::error!(
            parent_id = parent_id.unwrap_or("<root>"),
            cycle = ?node_ids,
            pointers = %describe_pointers(child_ids, lookup),
            "Cycle in sibling chain"
        );
        issues.push(ChainIntegrityIssue::Cycle { node_ids });
    }

    if !unvisited.is_empty() {
        tracing::warn!(
            parent_id = parent_id.unwrap_or("<root>"),
            orphans = ?unvisited,
            "Appending {} sibling(s) unreachable from the chain head",
            unvisited.len()
        );
        issues.push(ChainIntegrityIssue::Orphans {
            node_ids: unvisited.iter().map(|id| id.to_string()).collect(),
        });
        ordered.extend(unvisited.iter().map(|id| id.to_string()));
    }

    SortedChildren {
        ordered,
        issues,
        from_cache: false,
    }
}

/// First cycle formed by `before_sibling_id` pointers among `candidates`
fn find_cycle<L: SiblingLookup + ?Sized>(candidates: &[&str], lookup: &L) -> Option<Vec<String>> {
    let set: HashSet<&str> = candidates.iter().copied().collect();
    let mut cleared: HashSet<&str> = HashSet::new();

    for start in candidates {
        if cleared.contains(start) {
            continue;
        }
        let mut path: Vec<&str> = Vec::new();
        let mut on_path: HashSet<&str> = HashSet::new();
        let mut current = *start;

        loop {
            if cleared.contains(current) {
                break;
            }
            if !on_path.insert(current) {
                let begin = path.iter().position(|id| *id == current).unwrap_or(0);
                return Some(path[begin..].iter().map(|id| id.to_string()).collect());
            }
            path.push(current);
            match lookup.before_sibling_id(current) {
                Some(before) if set.contains(before) => current = before,
                _ => break,
            }
        }
        cleared.extend(path);
    }

    None
}

fn describe_pointers<L: SiblingLookup + ?Sized>(child_ids: &[String], lookup: &L) -> String {
    child_ids
        .iter()
        .map(|id| {
            format!(
                "{} <- {}",
                id,
                lookup.before_sibling_id(id).unwrap_or("null")
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}
