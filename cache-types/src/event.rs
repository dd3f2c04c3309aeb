//! The unified event model and remote store signals.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::node::NodeSnapshot;
use crate::path::NodePath;

/// Connection state reported by the remote store client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// First successful connection.
    Connected,
    /// Connection interrupted; the session may still be alive.
    Suspended,
    /// Session lost; all server-side watches are gone.
    Lost,
    /// Connection re-established after a suspension or loss.
    Reconnected,
}

impl ConnectionState {
    /// Check whether the store can currently serve reads.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected | Self::Reconnected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connected => "CONNECTED",
            Self::Suspended => "SUSPENDED",
            Self::Lost => "LOST",
            Self::Reconnected => "RECONNECTED",
        };
        f.write_str(name)
    }
}

/// Kind of change reported by a fired watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// The node's data was modified.
    DataChanged,
    /// The node was deleted.
    NodeDeleted,
    /// A child was created or deleted.
    ChildrenChanged,
    /// The node was created.
    NodeCreated,
}

/// Discriminant of a [`CacheEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// A node appeared in the cache.
    Added,
    /// A cached node was replaced by a newer version.
    Updated,
    /// A node left the cache.
    Removed,
    /// The initial crawl completed.
    Initialized,
    /// The remote store connection changed state.
    ConnectionStateChanged,
}

/// An event produced by the cache, in production order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheEvent {
    /// A node was observed to exist for the first time.
    Added {
        /// The new state.
        node: NodeSnapshot,
    },
    /// A cached node changed.
    Updated {
        /// The state being replaced.
        old: NodeSnapshot,
        /// The new state.
        node: NodeSnapshot,
    },
    /// A cached node was deleted (or its ancestor was).
    Removed {
        /// The last known state.
        old: NodeSnapshot,
    },
    /// The startup crawl has resolved every node that existed at start.
    Initialized,
    /// The remote store connection changed state.
    ConnectionStateChanged {
        /// The new connection state.
        state: ConnectionState,
    },
}

impl CacheEvent {
    /// The event's discriminant.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Added { .. } => EventKind::Added,
            Self::Updated { .. } => EventKind::Updated,
            Self::Removed { .. } => EventKind::Removed,
            Self::Initialized => EventKind::Initialized,
            Self::ConnectionStateChanged { .. } => EventKind::ConnectionStateChanged,
        }
    }

    /// The affected path (absent for initialization and connection events).
    pub fn path(&self) -> Option<&NodePath> {
        match self {
            Self::Added { node } | Self::Updated { node, .. } => Some(&node.path),
            Self::Removed { old } => Some(&old.path),
            Self::Initialized | Self::ConnectionStateChanged { .. } => None,
        }
    }

    /// The new state (present for ADDED and UPDATED).
    pub fn new_data(&self) -> Option<&NodeSnapshot> {
        match self {
            Self::Added { node } | Self::Updated { node, .. } => Some(node),
            _ => None,
        }
    }

    /// The replaced state (present for UPDATED and REMOVED).
    pub fn old_data(&self) -> Option<&NodeSnapshot> {
        match self {
            Self::Updated { old, .. } | Self::Removed { old } => Some(old),
            _ => None,
        }
    }

    /// Check whether this event describes a node mutation.
    pub fn is_node_event(&self) -> bool {
        matches!(
            self,
            Self::Added { .. } | Self::Updated { .. } | Self::Removed { .. }
        )
    }
}
