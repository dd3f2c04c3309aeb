//! # coord-cache-client
//!
//! A local mirror of a subtree (or a single node) of a hierarchical
//! coordination service, kept consistent through one-shot watches.
//!
//! ## Features
//!
//! - **Watch-then-refresh**: every fired watch is re-armed before the path
//!   is re-read, so no transition is missed
//! - **Version ordering**: out-of-order reads never regress a cached node
//! - **INITIALIZED milestone**: delivered once the startup crawl resolves
//! - **Legacy shapes**: path-children, tree and node listeners over one
//!   unified event stream
//! - **Store abstraction**: pluggable [`NodeStore`] (in-memory store
//!   included for tests and demos)
//!
//! ## Example
//!
//! ```ignore
//! use coord_cache_client::{CacheListenerBuilder, MemoryNodeStore, MirrorCache};
//!
//! let store = MemoryNodeStore::new();
//! let cache = MirrorCache::build(store, NodePath::new("/services")?, &[]);
//! cache.listenable().add_listener(
//!     CacheListenerBuilder::new()
//!         .for_creates(|node| println!("up: {}", node.path))
//!         .for_deletes(|node| println!("down: {}", node.path))
//!         .build(),
//! );
//! cache.start()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod cache;
pub mod config;
pub mod dispatch;
mod engine;
pub mod listener;
pub mod metrics;
pub mod query;
pub mod store;

pub use adapters::{
    ChildEvent, ChildEventKind, NodeAdapter, NodeListener, PathChildrenAdapter,
    PathChildrenListener, TreeAdapter, TreeEvent, TreeEventKind, TreeListener,
};
pub use cache::MirrorCache;
pub use config::{CacheConfig, CacheOption, ConfigError};
pub use dispatch::Listenable;
pub use listener::{CacheListener, CacheListenerBuilder, CompositeListener, ListenerId};
pub use metrics::{CacheMetrics, MetricsSnapshot};
pub use query::{parent_path_filter, SnapshotStream};
pub use store::{
    MemoryNodeStore, NodeStore, StoreError, Watch, WatchKinds, WatchNotification,
};

pub use coord_cache_types::{
    CacheError, CacheEvent, ChangeKind, ConnectionState, EventKind, NodePath, NodeSnapshot, Stat,
};
