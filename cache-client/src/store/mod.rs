//! Remote Node Store abstraction.
//!
//! This module defines the narrow boundary between the cache and the
//! hierarchical coordination service it mirrors. Connection management,
//! session handling and network retries live behind this trait; the cache
//! only sees reads, one-shot watches and connection-state signals.
//!
//! # Design
//!
//! - `get_data()` reads a node's payload and stat (`None` if absent)
//! - `list_children()` lists child names (`None` if the node is absent)
//! - `subscribe()` registers a one-shot [`Watch`] that must be re-issued
//!   after every fire
//! - `connection_events()` streams connection state transitions
//!
//! # Example
//!
//! ```ignore
//! let store = MemoryNodeStore::new();
//! let watch = store.subscribe(&path, WatchKinds::DATA).await?;
//! let node = store.get_data(&path).await?;
//! if let Some(fired) = watch.await {
//!     // re-subscribe, then re-read
//! }
//! ```

mod memory;

pub use memory::MemoryNodeStore;

use async_trait::async_trait;
use coord_cache_types::{ChangeKind, ConnectionState, NodePath, NodeSnapshot};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::{broadcast, oneshot};

/// Remote store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The connection to the store is down.
    #[error("connection loss")]
    ConnectionLoss,

    /// The session expired.
    #[error("session expired")]
    SessionExpired,

    /// The store rejected or could not serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The request timed out.
    #[error("request timed out")]
    Timeout,

    /// A node already exists at the path.
    #[error("node exists: {0}")]
    NodeExists(NodePath),

    /// No node exists at the path.
    #[error("no node: {0}")]
    NoNode(NodePath),

    /// The node has children and cannot be deleted.
    #[error("node not empty: {0}")]
    NotEmpty(NodePath),
}

impl StoreError {
    /// Check whether the error reflects the connection rather than the request.
    ///
    /// These are not retried in place; the re-crawl that follows
    /// reconnection reads the path again.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::ConnectionLoss | Self::SessionExpired)
    }
}

/// Which changes a watch registration should report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchKinds {
    /// Creation, data change and deletion of the node itself.
    pub data: bool,
    /// Creation and deletion of direct children.
    pub children: bool,
}

impl WatchKinds {
    /// Node-level changes only.
    pub const DATA: Self = Self {
        data: true,
        children: false,
    };

    /// Node-level and children changes.
    pub const DATA_AND_CHILDREN: Self = Self {
        data: true,
        children: true,
    };

    /// Check whether a change of `kind` is reported by these kinds.
    pub fn matches(&self, kind: ChangeKind) -> bool {
        match kind {
            ChangeKind::DataChanged | ChangeKind::NodeCreated => self.data,
            ChangeKind::ChildrenChanged => self.children,
            ChangeKind::NodeDeleted => self.data || self.children,
        }
    }
}

/// A fired watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchNotification {
    /// The watched path.
    pub path: NodePath,
    /// What changed.
    pub kind: ChangeKind,
}

/// A one-shot watch registration.
///
/// Resolves to the notification when the watch fires, or to `None` when the
/// store drops the registration (for example on session loss). Dropping the
/// `Watch` cancels the registration.
#[derive(Debug)]
pub struct Watch {
    rx: oneshot::Receiver<WatchNotification>,
}

impl Watch {
    /// Create a watch and the sender that fires it.
    pub fn channel() -> (oneshot::Sender<WatchNotification>, Watch) {
        let (tx, rx) = oneshot::channel();
        (tx, Watch { rx })
    }
}

impl Future for Watch {
    type Output = Option<WatchNotification>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(Result::ok)
    }
}

/// The Remote Node Store consumed by the cache.
///
/// Implementations handle connection management and retries; any error
/// returned here is treated by the cache as a transient refresh failure.
#[async_trait]
pub trait NodeStore: Send + Sync + 'static {
    /// Read a node's data and stat. `Ok(None)` means the node does not exist.
    async fn get_data(&self, path: &NodePath) -> Result<Option<NodeSnapshot>, StoreError>;

    /// List a node's child names. `Ok(None)` means the node does not exist.
    async fn list_children(&self, path: &NodePath) -> Result<Option<Vec<String>>, StoreError>;

    /// Register a one-shot watch on `path`, whether or not the node exists.
    async fn subscribe(&self, path: &NodePath, kinds: WatchKinds) -> Result<Watch, StoreError>;

    /// Current connection state.
    fn connection_state(&self) -> ConnectionState;

    /// Subscribe to connection state transitions.
    fn connection_events(&self) -> broadcast::Receiver<ConnectionState>;
}
