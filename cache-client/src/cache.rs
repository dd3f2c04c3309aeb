//! MirrorCache - the caller-facing handle.
//!
//! Combines the Synchronization Engine with the Query Facade and the
//! listener registry.
//!
//! # Example
//!
//! ```ignore
//! use coord_cache_client::{MemoryNodeStore, MirrorCache, CacheOption};
//!
//! let store = MemoryNodeStore::new();
//! let cache = MirrorCache::build(store, NodePath::new("/config")?, &[]);
//! cache.listenable().add_listener(|event: &CacheEvent| println!("{:?}", event));
//! cache.start()?;
//!
//! let current = cache.get(&NodePath::new("/config/flags")?);
//! ```

use std::sync::Arc;

use coord_cache_types::{CacheError, NodePath, NodeSnapshot};

use crate::config::{CacheConfig, CacheOption, ConfigError};
use crate::dispatch::Listenable;
use crate::engine::{Engine, Lifecycle};
use crate::metrics::MetricsSnapshot;
use crate::query::SnapshotStream;
use crate::store::NodeStore;

/// A local mirror of a subtree (or single node) of a [`NodeStore`].
///
/// Stopping is guaranteed on drop, so every watch the cache registered is
/// cancelled on every exit path.
pub struct MirrorCache<S: NodeStore> {
    engine: Arc<Engine<S>>,
}

impl<S: NodeStore> std::fmt::Debug for MirrorCache<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorCache")
            .field("engine", &self.engine)
            .finish()
    }
}

impl<S: NodeStore> MirrorCache<S> {
    /// Build a cache rooted at `root`. Nothing happens until [`start`](Self::start).
    pub fn build(store: S, root: NodePath, options: &[CacheOption]) -> Self {
        Self {
            engine: Arc::new(Engine::new(store, root, CacheConfig::from_options(options))),
        }
    }

    /// Build a cache from an explicit configuration.
    pub fn with_config(
        store: S,
        root: NodePath,
        config: CacheConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            engine: Arc::new(Engine::new(store, root, config)),
        })
    }

    /// Start synchronizing.
    ///
    /// Returns once the initial reads have been issued; INITIALIZED is
    /// delivered to listeners when they complete. Must be called from within
    /// a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`CacheError::AlreadyStarted`] / [`CacheError::Stopped`] on misuse
    /// - [`CacheError::Startup`] when no runtime is available, or when a
    ///   connection is required and the store is not connected
    pub fn start(&self) -> Result<(), CacheError> {
        self.engine.start()
    }

    /// Stop synchronizing, cancel every watch and empty the table.
    ///
    /// Safe to call repeatedly and concurrently with in-flight refreshes;
    /// their results are discarded.
    pub fn stop(&self) {
        self.engine.stop();
    }

    /// The cache root.
    pub fn root(&self) -> &NodePath {
        self.engine.root()
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        self.engine.store()
    }

    /// Current cached state of `path`. Never touches the network.
    pub fn get(&self, path: &NodePath) -> Option<NodeSnapshot> {
        self.engine.get(path)
    }

    /// Current cached state of `path`, failing when it is not cached.
    pub fn require(&self, path: &NodePath) -> Result<NodeSnapshot, CacheError> {
        match self.engine.lifecycle() {
            Lifecycle::Latent => Err(CacheError::NotStarted),
            Lifecycle::Stopped => Err(CacheError::Stopped),
            Lifecycle::Started => self
                .engine
                .get(path)
                .ok_or_else(|| CacheError::NotPresent(path.clone())),
        }
    }

    /// Lazily filter a point-in-time copy of the cache.
    pub fn stream<P>(&self, predicate: P) -> SnapshotStream
    where
        P: Fn(&NodeSnapshot) -> bool + Send + 'static,
    {
        SnapshotStream::new(self.engine.snapshots(), Box::new(predicate))
    }

    /// Every cached node, in path order.
    pub fn stream_all(&self) -> SnapshotStream {
        self.stream(|_| true)
    }

    /// Cached direct children of `path`.
    pub fn children_of(&self, path: &NodePath) -> Vec<NodeSnapshot> {
        self.engine.children_of(path)
    }

    /// Number of cached nodes.
    pub fn size(&self) -> usize {
        self.engine.size()
    }

    /// Check whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Listener registry.
    pub fn listenable(&self) -> &Listenable {
        self.engine.listenable()
    }

    /// Check whether the initial crawl has completed.
    pub fn is_initialized(&self) -> bool {
        self.engine.is_initialized()
    }

    /// Diagnostic counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.engine.metrics().snapshot()
    }

    /// Number of paths currently tracked (one watch each).
    pub fn tracked_paths(&self) -> usize {
        self.engine.tracked_count()
    }
}

impl<S: NodeStore> Drop for MirrorCache<S> {
    fn drop(&mut self) {
        self.engine.stop();
    }
}
