//! The Cache State Table.
//!
//! A mapping from [`NodePath`] to the latest accepted [`NodeSnapshot`] plus
//! the set of children known to be cached. All mutation goes through
//! [`CacheTable::reconcile_node`] and [`CacheTable::reconcile_children`],
//! which apply the version rules and return the events the change produced.
//!
//! Invariants held by every method:
//! - In recursive mode a cached path implies every ancestor up to the root
//!   is cached; in single-node mode only the root is ever cached.
//! - An accepted snapshot always supersedes the one it replaces.

use std::collections::{BTreeSet, HashMap};

use coord_cache_types::{CacheEvent, NodePath, NodeSnapshot};

/// Whether the table mirrors a subtree or a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableMode {
    /// Track exactly the root path.
    SingleNode,
    /// Track the root and all of its descendants.
    Recursive,
}

/// A cached node and its cached children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Latest accepted state.
    pub snapshot: NodeSnapshot,
    /// Children currently present in the table (always empty in single-node mode).
    pub children: BTreeSet<NodePath>,
}

/// Result of reconciling a fresh node read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOutcome {
    /// The node was inserted.
    Added,
    /// The node was replaced by a newer version.
    Updated,
    /// The node (and its descendants) left the table.
    Removed,
    /// The read matches the cached version; nothing changed.
    Current,
    /// The read was older than the cached state and was discarded.
    Stale,
    /// The node is absent both locally and remotely.
    Unchanged,
    /// The path is outside the tracked tree or its parent is not cached.
    Rejected,
}

/// Result of reconciling a fresh children listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildrenOutcome {
    /// Children in the listing that are not cached yet and need tracking.
    pub discovered: Vec<NodePath>,
    /// Paths that left the table because their child was missing from the listing.
    pub removed: Vec<NodePath>,
    /// Events produced by the removals, deepest first.
    pub events: Vec<CacheEvent>,
}

/// In-memory mirror of the remote tree.
#[derive(Debug, Clone)]
pub struct CacheTable {
    root: NodePath,
    mode: TableMode,
    entries: HashMap<NodePath, CacheEntry>,
}

impl CacheTable {
    /// Create an empty table rooted at `root`.
    pub fn new(root: NodePath, mode: TableMode) -> Self {
        Self {
            root,
            mode,
            entries: HashMap::new(),
        }
    }

    /// The root path.
    pub fn root(&self) -> &NodePath {
        &self.root
    }

    /// The table's mode.
    pub fn mode(&self) -> TableMode {
        self.mode
    }

    /// Check whether `path` belongs to the tracked tree.
    pub fn covers(&self, path: &NodePath) -> bool {
        match self.mode {
            TableMode::SingleNode => path == &self.root,
            TableMode::Recursive => path == &self.root || self.root.is_ancestor_of(path),
        }
    }

    /// Get the cached snapshot for `path`.
    pub fn get(&self, path: &NodePath) -> Option<&NodeSnapshot> {
        self.entries.get(path).map(|e| &e.snapshot)
    }

    /// Get the full entry for `path`.
    pub fn entry(&self, path: &NodePath) -> Option<&CacheEntry> {
        self.entries.get(path)
    }

    /// Check whether `path` is cached.
    pub fn contains(&self, path: &NodePath) -> bool {
        self.entries.contains_key(path)
    }

    /// Number of cached nodes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy every cached snapshot, ordered by path.
    pub fn snapshots(&self) -> Vec<NodeSnapshot> {
        let mut all: Vec<NodeSnapshot> = self.entries.values().map(|e| e.snapshot.clone()).collect();
        all.sort_by(|a, b| a.path.cmp(&b.path));
        all
    }

    /// Apply a fresh read of `path` (`None` means the node does not exist).
    pub fn reconcile_node(
        &mut self,
        path: &NodePath,
        fresh: Option<NodeSnapshot>,
    ) -> (NodeOutcome, Vec<CacheEvent>) {
        if !self.covers(path) {
            return (NodeOutcome::Rejected, Vec::new());
        }

        match fresh {
            None => {
                if !self.entries.contains_key(path) {
                    return (NodeOutcome::Unchanged, Vec::new());
                }
                let events = self.remove_subtree(path);
                (NodeOutcome::Removed, events)
            }
            Some(snapshot) => {
                if let Some(entry) = self.entries.get_mut(path) {
                    if snapshot.stat == entry.snapshot.stat {
                        return (NodeOutcome::Current, Vec::new());
                    }
                    if !snapshot.stat.supersedes(&entry.snapshot.stat) {
                        return (NodeOutcome::Stale, Vec::new());
                    }
                    let old = std::mem::replace(&mut entry.snapshot, snapshot.clone());
                    return (
                        NodeOutcome::Updated,
                        vec![CacheEvent::Updated {
                            old,
                            node: snapshot,
                        }],
                    );
                }

                if path != &self.root {
                    let Some(parent) = path.parent() else {
                        return (NodeOutcome::Rejected, Vec::new());
                    };
                    match self.entries.get_mut(&parent) {
                        Some(parent_entry) => {
                            parent_entry.children.insert(path.clone());
                        }
                        None => return (NodeOutcome::Rejected, Vec::new()),
                    }
                }

                self.entries.insert(
                    path.clone(),
                    CacheEntry {
                        snapshot: snapshot.clone(),
                        children: BTreeSet::new(),
                    },
                );
                (NodeOutcome::Added, vec![CacheEvent::Added { node: snapshot }])
            }
        }
    }

    /// Apply a fresh children listing of `path`.
    ///
    /// `None` means the parent itself no longer exists; that is handled by
    /// the node read, so nothing changes here. Names that do not form a
    /// valid child path are skipped.
    pub fn reconcile_children(
        &mut self,
        path: &NodePath,
        names: Option<&[String]>,
    ) -> ChildrenOutcome {
        let mut outcome = ChildrenOutcome::default();
        if self.mode == TableMode::SingleNode || !self.covers(path) {
            return outcome;
        }
        let (Some(names), Some(entry)) = (names, self.entries.get(path)) else {
            return outcome;
        };

        let fresh: BTreeSet<NodePath> = names
            .iter()
            .filter_map(|name| path.child(name).ok())
            .collect();

        outcome.discovered = fresh.difference(&entry.children).cloned().collect();
        outcome.removed = entry.children.difference(&fresh).cloned().collect();

        for gone in &outcome.removed {
            outcome.events.extend(self.remove_subtree(gone));
        }
        outcome
    }

    /// Remove `path` and every cached descendant.
    ///
    /// Returns REMOVED events deepest first, ending with `path` itself.
    pub fn remove_subtree(&mut self, path: &NodePath) -> Vec<CacheEvent> {
        let mut doomed: Vec<NodePath> = Vec::new();
        let mut stack = vec![path.clone()];
        while let Some(current) = stack.pop() {
            if let Some(entry) = self.entries.get(&current) {
                stack.extend(entry.children.iter().cloned());
                doomed.push(current);
            }
        }
        // Deepest first; ties broken by path for a stable order.
        doomed.sort_by(|a, b| b.depth().cmp(&a.depth()).then_with(|| a.cmp(b)));

        let events = doomed
            .into_iter()
            .filter_map(|p| self.entries.remove(&p))
            .map(|entry| CacheEvent::Removed {
                old: entry.snapshot,
            })
            .collect();

        if let Some(parent) = path.parent() {
            if let Some(parent_entry) = self.entries.get_mut(&parent) {
                parent_entry.children.remove(path);
            }
        }
        events
    }

    /// Remove every entry, returning them ordered by path.
    pub fn drain(&mut self) -> Vec<NodeSnapshot> {
        let mut all: Vec<NodeSnapshot> = self.entries.drain().map(|(_, e)| e.snapshot).collect();
        all.sort_by(|a, b| a.path.cmp(&b.path));
        all
    }
}
