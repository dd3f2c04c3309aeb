//! Full-tree events.

use coord_cache_types::{CacheEvent, ConnectionState, NodeSnapshot};

use crate::listener::CacheListener;

/// Tree event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeEventKind {
    /// A node appeared.
    NodeAdded,
    /// A node's data changed.
    NodeUpdated,
    /// A node was removed.
    NodeRemoved,
    /// Initial population complete.
    Initialized,
    /// Connection suspended.
    ConnectionSuspended,
    /// Connection restored.
    ConnectionReconnected,
    /// Session lost.
    ConnectionLost,
}

/// A tree event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEvent {
    /// What happened.
    pub kind: TreeEventKind,
    /// Current state for adds and updates, last-known state for removals.
    pub node: Option<NodeSnapshot>,
    /// Prior state, set for updates only.
    pub old: Option<NodeSnapshot>,
}

impl TreeEvent {
    fn signal(kind: TreeEventKind) -> Self {
        Self {
            kind,
            node: None,
            old: None,
        }
    }
}

/// Receives [`TreeEvent`]s.
pub trait TreeListener: Send + Sync + 'static {
    /// Handle one tree event.
    fn tree_event(&self, event: &TreeEvent);
}

impl<F> TreeListener for F
where
    F: Fn(&TreeEvent) + Send + Sync + 'static,
{
    fn tree_event(&self, event: &TreeEvent) {
        self(event)
    }
}

/// Passes node events for every depth through in tree shape.
#[derive(Debug)]
pub struct TreeAdapter<L> {
    listener: L,
}

impl<L: TreeListener> TreeAdapter<L> {
    /// Wrap `listener`.
    pub fn new(listener: L) -> Self {
        Self { listener }
    }
}

fn translate(event: &CacheEvent) -> Option<TreeEvent> {
    let event = match event {
        CacheEvent::Added { node } => TreeEvent {
            kind: TreeEventKind::NodeAdded,
            node: Some(node.clone()),
            old: None,
        },
        CacheEvent::Updated { old, node } => TreeEvent {
            kind: TreeEventKind::NodeUpdated,
            node: Some(node.clone()),
            old: Some(old.clone()),
        },
        CacheEvent::Removed { old } => TreeEvent {
            kind: TreeEventKind::NodeRemoved,
            node: Some(old.clone()),
            old: None,
        },
        CacheEvent::Initialized => TreeEvent::signal(TreeEventKind::Initialized),
        CacheEvent::ConnectionStateChanged { state } => match state {
            ConnectionState::Connected => return None,
            ConnectionState::Suspended => TreeEvent::signal(TreeEventKind::ConnectionSuspended),
            ConnectionState::Reconnected => {
                TreeEvent::signal(TreeEventKind::ConnectionReconnected)
            }
            ConnectionState::Lost => TreeEvent::signal(TreeEventKind::ConnectionLost),
        },
    };
    Some(event)
}

impl<L: TreeListener> CacheListener for TreeAdapter<L> {
    fn event(&self, event: &CacheEvent) {
        if let Some(tree_event) = translate(event) {
            self.listener.tree_event(&tree_event);
        }
    }
}
