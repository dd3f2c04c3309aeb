//! Listener contract and builder.
//!
//! Every listener sees the unified [`CacheEvent`] stream. The legacy
//! shapes in [`crate::adapters`] are themselves [`CacheListener`]s that
//! translate the stream, so one registration mechanism serves all four
//! shapes.
//!
//! ```ignore
//! let listener = CacheListenerBuilder::new()
//!     .for_creates(|node| println!("added {}", node.path))
//!     .for_deletes(|old| println!("removed {}", old.path))
//!     .for_initialized(|| println!("ready"))
//!     .after_initialized()
//!     .build();
//! cache.listenable().add_listener(listener);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use coord_cache_types::{CacheEvent, ConnectionState, NodePath, NodeSnapshot};
use uuid::Uuid;

use crate::adapters::{
    NodeAdapter, NodeListener, PathChildrenAdapter, PathChildrenListener, TreeAdapter,
    TreeListener,
};

/// Receives cache events.
///
/// Called from the dispatcher task, one event at a time, in production
/// order. A panic is caught and does not affect other listeners.
pub trait CacheListener: Send + Sync + 'static {
    /// Handle one event.
    fn event(&self, event: &CacheEvent);
}

impl<F> CacheListener for F
where
    F: Fn(&CacheEvent) + Send + Sync + 'static,
{
    fn event(&self, event: &CacheEvent) {
        self(event)
    }
}

/// Handle returned by registration, used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type BoxedListener = Box<dyn CacheListener>;

/// Builds a [`CompositeListener`].
#[derive(Default)]
pub struct CacheListenerBuilder {
    listeners: Vec<BoxedListener>,
    after_initialized: bool,
}

impl fmt::Debug for CacheListenerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheListenerBuilder")
            .field("listeners", &self.listeners.len())
            .field("after_initialized", &self.after_initialized)
            .finish()
    }
}

impl CacheListenerBuilder {
    /// Start composing a listener from per-event callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, listener: impl CacheListener) -> Self {
        self.listeners.push(Box::new(listener));
        self
    }

    /// Called with the new node for every ADDED.
    pub fn for_creates<F>(self, f: F) -> Self
    where
        F: Fn(&NodeSnapshot) + Send + Sync + 'static,
    {
        self.push(move |event: &CacheEvent| {
            if let CacheEvent::Added { node } = event {
                f(node)
            }
        })
    }

    /// Called with the old and new node for every UPDATED.
    pub fn for_changes<F>(self, f: F) -> Self
    where
        F: Fn(&NodeSnapshot, &NodeSnapshot) + Send + Sync + 'static,
    {
        self.push(move |event: &CacheEvent| {
            if let CacheEvent::Updated { old, node } = event {
                f(old, node)
            }
        })
    }

    /// Called for ADDED (with no old node) and UPDATED.
    pub fn for_creates_and_changes<F>(self, f: F) -> Self
    where
        F: Fn(Option<&NodeSnapshot>, &NodeSnapshot) + Send + Sync + 'static,
    {
        self.push(move |event: &CacheEvent| match event {
            CacheEvent::Added { node } => f(None, node),
            CacheEvent::Updated { old, node } => f(Some(old), node),
            _ => {}
        })
    }

    /// Called with the last-known node for every REMOVED.
    pub fn for_deletes<F>(self, f: F) -> Self
    where
        F: Fn(&NodeSnapshot) + Send + Sync + 'static,
    {
        self.push(move |event: &CacheEvent| {
            if let CacheEvent::Removed { old } = event {
                f(old)
            }
        })
    }

    /// Receive every event unfiltered.
    pub fn for_all(self, listener: impl CacheListener) -> Self {
        self.push(listener)
    }

    /// Called once when the initial crawl completes.
    pub fn for_initialized<F>(self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.push(move |event: &CacheEvent| {
            if matches!(event, CacheEvent::Initialized) {
                f()
            }
        })
    }

    /// Called on every connection state change.
    pub fn for_connection_changes<F>(self, f: F) -> Self
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.push(move |event: &CacheEvent| {
            if let CacheEvent::ConnectionStateChanged { state } = event {
                f(*state)
            }
        })
    }

    /// Bridge a path-children listener: direct children of `root` only.
    pub fn for_path_children_cache(
        self,
        root: NodePath,
        listener: impl PathChildrenListener,
    ) -> Self {
        self.push(PathChildrenAdapter::new(root, listener))
    }

    /// Bridge a tree listener: every node at any depth.
    pub fn for_tree_cache(self, listener: impl TreeListener) -> Self {
        self.push(TreeAdapter::new(listener))
    }

    /// Bridge a node listener: a bare change signal per event on `path`.
    pub fn for_node_cache(self, path: NodePath, listener: impl NodeListener) -> Self {
        self.push(NodeAdapter::new(path, listener))
    }

    /// Suppress everything until INITIALIZED, which is delivered.
    pub fn after_initialized(mut self) -> Self {
        self.after_initialized = true;
        self
    }

    /// Finish the listener.
    pub fn build(self) -> CompositeListener {
        CompositeListener {
            listeners: self.listeners,
            gate: self.after_initialized.then(|| AtomicBool::new(false)),
        }
    }
}

/// A listener assembled by [`CacheListenerBuilder`].
pub struct CompositeListener {
    listeners: Vec<BoxedListener>,
    /// Present when built with `after_initialized`; set once INITIALIZED passes.
    gate: Option<AtomicBool>,
}

impl fmt::Debug for CompositeListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeListener")
            .field("listeners", &self.listeners.len())
            .field("gated", &self.gate.is_some())
            .finish()
    }
}

impl CacheListener for CompositeListener {
    fn event(&self, event: &CacheEvent) {
        if let Some(open) = &self.gate {
            if matches!(event, CacheEvent::Initialized) {
                open.store(true, Ordering::Release);
            } else if !open.load(Ordering::Acquire) {
                return;
            }
        }
        for listener in &self.listeners {
            listener.event(event);
        }
    }
}
