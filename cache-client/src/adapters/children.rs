//! Single-level child events.

use coord_cache_types::{CacheEvent, ConnectionState, NodePath, NodeSnapshot};

use crate::listener::CacheListener;

/// Child event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildEventKind {
    /// A direct child appeared.
    ChildAdded,
    /// A direct child's data changed.
    ChildUpdated,
    /// A direct child was removed.
    ChildRemoved,
    /// Initial population complete.
    Initialized,
    /// Connection suspended.
    ConnectionSuspended,
    /// Connection restored.
    ConnectionReconnected,
    /// Session lost.
    ConnectionLost,
}

/// A child event. `node` is set for the three child kinds; for removals it
/// carries the last-known state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildEvent {
    /// What happened.
    pub kind: ChildEventKind,
    /// The affected child.
    pub node: Option<NodeSnapshot>,
}

/// Receives [`ChildEvent`]s.
pub trait PathChildrenListener: Send + Sync + 'static {
    /// Handle one child event.
    fn child_event(&self, event: &ChildEvent);
}

impl<F> PathChildrenListener for F
where
    F: Fn(&ChildEvent) + Send + Sync + 'static,
{
    fn child_event(&self, event: &ChildEvent) {
        self(event)
    }
}

/// Filters the unified stream down to the direct children of one parent.
///
/// The parent itself and deeper descendants are dropped; so are paths that
/// only share a string prefix with the parent.
#[derive(Debug)]
pub struct PathChildrenAdapter<L> {
    parent: NodePath,
    listener: L,
}

impl<L: PathChildrenListener> PathChildrenAdapter<L> {
    /// Wrap `listener`, reporting children of `parent`.
    pub fn new(parent: NodePath, listener: L) -> Self {
        Self { parent, listener }
    }

    fn translate(&self, event: &CacheEvent) -> Option<ChildEvent> {
        let child = |kind, node: &NodeSnapshot| {
            self.parent.is_parent_of(&node.path).then(|| ChildEvent {
                kind,
                node: Some(node.clone()),
            })
        };
        let signal = |kind| Some(ChildEvent { kind, node: None });

        match event {
            CacheEvent::Added { node } => child(ChildEventKind::ChildAdded, node),
            CacheEvent::Updated { node, .. } => child(ChildEventKind::ChildUpdated, node),
            CacheEvent::Removed { old } => child(ChildEventKind::ChildRemoved, old),
            CacheEvent::Initialized => signal(ChildEventKind::Initialized),
            CacheEvent::ConnectionStateChanged { state } => match state {
                ConnectionState::Connected => None,
                ConnectionState::Suspended => signal(ChildEventKind::ConnectionSuspended),
                ConnectionState::Reconnected => signal(ChildEventKind::ConnectionReconnected),
                ConnectionState::Lost => signal(ChildEventKind::ConnectionLost),
            },
        }
    }
}

impl<L: PathChildrenListener> CacheListener for PathChildrenAdapter<L> {
    fn event(&self, event: &CacheEvent) {
        if let Some(child_event) = self.translate(event) {
            self.listener.child_event(&child_event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coord_cache_types::Stat;
    use std::sync::{Arc, Mutex};

    fn node(path: &str, version: u64) -> NodeSnapshot {
        NodeSnapshot::new(NodePath::new(path).unwrap(), Vec::new(), Stat::new(version, 1, 1))
    }

    fn collect(parent: &str, events: &[CacheEvent]) -> Vec<(ChildEventKind, Option<String>)> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let parent = NodePath::new(parent).unwrap();
        let adapter = PathChildrenAdapter::new(parent, move |e: &ChildEvent| {
            let path = e.node.as_ref().map(|n| n.path.to_string());
            sink.lock().unwrap().push((e.kind, path));
        });
        for event in events {
            adapter.event(event);
        }
        let out = seen.lock().unwrap().clone();
        out
    }

    #[test]
    fn only_direct_children_pass() {
        let events = [
            CacheEvent::Added { node: node("/test", 0) },
            CacheEvent::Added { node: node("/test/one", 0) },
            CacheEvent::Added { node: node("/test/one/deep", 0) },
            CacheEvent::Added { node: node("/testing", 0) },
        ];
        let seen = collect("/test", &events);
        assert_eq!(
            seen,
            vec![(ChildEventKind::ChildAdded, Some("/test/one".to_string()))]
        );
    }

    #[test]
    fn maps_node_kinds() {
        let events = [
            CacheEvent::Added { node: node("/test/one", 0) },
            CacheEvent::Updated {
                old: node("/test/one", 0),
                node: node("/test/one", 1),
            },
            CacheEvent::Removed { old: node("/test/one", 1) },
        ];
        let kinds: Vec<_> = collect("/test", &events).into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            kinds,
            vec![
                ChildEventKind::ChildAdded,
                ChildEventKind::ChildUpdated,
                ChildEventKind::ChildRemoved
            ]
        );
    }

    #[test]
    fn lifecycle_signals_without_connected() {
        let events = [
            CacheEvent::Initialized,
            CacheEvent::ConnectionStateChanged { state: ConnectionState::Connected },
            CacheEvent::ConnectionStateChanged { state: ConnectionState::Suspended },
            CacheEvent::ConnectionStateChanged { state: ConnectionState::Lost },
            CacheEvent::ConnectionStateChanged { state: ConnectionState::Reconnected },
        ];
        let seen = collect("/test", &events);
        assert_eq!(
            seen,
            vec![
                (ChildEventKind::Initialized, None),
                (ChildEventKind::ConnectionSuspended, None),
                (ChildEventKind::ConnectionLost, None),
                (ChildEventKind::ConnectionReconnected, None),
            ]
        );
    }
}
