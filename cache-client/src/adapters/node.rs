//! Single-node change signal.

use coord_cache_types::{CacheEvent, NodePath};

use crate::listener::CacheListener;

/// Receives a bare change signal. Re-query the cache for the current state.
pub trait NodeListener: Send + Sync + 'static {
    /// The node was created, changed, or deleted.
    fn node_changed(&self);
}

impl<F> NodeListener for F
where
    F: Fn() + Send + Sync + 'static,
{
    fn node_changed(&self) {
        self()
    }
}

/// Fires on every ADDED, UPDATED and REMOVED of one path, ignoring payloads.
#[derive(Debug)]
pub struct NodeAdapter<L> {
    path: NodePath,
    listener: L,
}

impl<L: NodeListener> NodeAdapter<L> {
    /// Wrap `listener`, signalling changes to `path` only.
    pub fn new(path: NodePath, listener: L) -> Self {
        Self { path, listener }
    }
}

impl<L: NodeListener> CacheListener for NodeAdapter<L> {
    fn event(&self, event: &CacheEvent) {
        if event.is_node_event() && event.path() == Some(&self.path) {
            self.listener.node_changed();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coord_cache_types::{ConnectionState, NodePath, NodeSnapshot, Stat};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn signals_node_events_only() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let path = NodePath::new("/test/node").unwrap();
        let adapter = NodeAdapter::new(path.clone(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let node = NodeSnapshot::new(path, b"a".to_vec(), Stat::default());
        adapter.event(&CacheEvent::Added { node: node.clone() });
        adapter.event(&CacheEvent::Initialized);
        adapter.event(&CacheEvent::ConnectionStateChanged {
            state: ConnectionState::Suspended,
        });
        adapter.event(&CacheEvent::Removed { old: node });

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn ignores_other_paths() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let adapter = NodeAdapter::new(NodePath::new("/test").unwrap(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let child = NodeSnapshot::new(
            NodePath::new("/test/child").unwrap(),
            Vec::new(),
            Stat::default(),
        );
        adapter.event(&CacheEvent::Added { node: child.clone() });
        adapter.event(&CacheEvent::Removed { old: child });
        assert_eq!(count.load(Ordering::SeqCst), 0);

        let root = NodeSnapshot::new(NodePath::new("/test").unwrap(), Vec::new(), Stat::default());
        adapter.event(&CacheEvent::Added { node: root });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
