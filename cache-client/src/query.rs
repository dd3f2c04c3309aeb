//! Query Facade helpers.

use std::fmt;

use coord_cache_types::{NodePath, NodeSnapshot};

/// Boxed snapshot predicate.
pub type Predicate = Box<dyn Fn(&NodeSnapshot) -> bool + Send>;

/// A one-shot, lazily filtered pass over a point-in-time copy of the table.
///
/// The copy is taken when the stream is created; later changes to the
/// cache are not visible. Nodes are yielded in path order.
pub struct SnapshotStream {
    nodes: std::vec::IntoIter<NodeSnapshot>,
    predicate: Predicate,
}

impl SnapshotStream {
    pub(crate) fn new(nodes: Vec<NodeSnapshot>, predicate: Predicate) -> Self {
        Self {
            nodes: nodes.into_iter(),
            predicate,
        }
    }
}

impl fmt::Debug for SnapshotStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotStream")
            .field("remaining", &self.nodes.len())
            .finish_non_exhaustive()
    }
}

impl Iterator for SnapshotStream {
    type Item = NodeSnapshot;

    fn next(&mut self) -> Option<Self::Item> {
        let predicate = &self.predicate;
        self.nodes.by_ref().find(|node| predicate(node))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.nodes.len()))
    }
}

/// Matches nodes whose immediate parent is exactly `parent`.
///
/// Neither `parent` itself, deeper descendants, nor paths that merely share
/// a string prefix with it match.
pub fn parent_path_filter(
    parent: NodePath,
) -> impl Fn(&NodeSnapshot) -> bool + Send + Sync + Clone + 'static {
    move |node| parent.is_parent_of(&node.path)
}
