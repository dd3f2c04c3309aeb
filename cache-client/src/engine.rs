//! Synchronization Engine.
//!
//! Keeps the [`CacheTable`] consistent with a [`NodeStore`] through
//! watch-then-refresh cycles. Each tracked path owns a [`PathTracker`]
//! holding its [`WatchState`]; the pure state machines in `cache-core`
//! decide what to do and this module performs the I/O.
//!
//! # Concurrency
//!
//! - Refreshes of one path are serialized by the tracker's async mutex, so
//!   a path is never read twice concurrently.
//! - Every table mutation happens under the table write lock, and the
//!   events it produces are queued before the lock is released, so the
//!   event stream is in table order.
//! - A tracker carries an epoch. Work started for a tracker that has since
//!   been untracked (or for a stopped cache) is dropped when it checks
//!   [`Engine::is_current`] under the table lock.
//!
//! ```text
//! NodeStore ──watch fired──► drive(Fired) ──► Subscribe ──► Refresh
//!                                                             │
//!                          Dispatcher ◄── events ◄── CacheTable::reconcile_*
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock};

use coord_cache_core::{
    CacheTable, DiscoveryCounter, NodeOutcome, SessionAction, SessionPhase, TableMode,
    WatchAction, WatchEvent, WatchState,
};
use coord_cache_types::{CacheError, CacheEvent, ConnectionState, NodePath, NodeSnapshot};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::dispatch::{Dispatcher, Listenable};
use crate::metrics::CacheMetrics;
use crate::store::{NodeStore, StoreError, WatchKinds};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The read found no node where one may have been tracked.
fn is_gone(outcome: NodeOutcome) -> bool {
    matches!(
        outcome,
        NodeOutcome::Removed | NodeOutcome::Unchanged | NodeOutcome::Rejected
    )
}

/// Cache lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    Latent,
    Started,
    Stopped,
}

/// Per-path tracking state.
#[derive(Debug)]
struct PathTracker {
    path: NodePath,
    epoch: u64,
    watch: Mutex<WatchState>,
    /// Serializes refreshes of this path.
    refresh_lock: tokio::sync::Mutex<()>,
    /// Task waiting on the current watch registration.
    watch_task: Mutex<Option<AbortHandle>>,
    /// Still owes a completion to the discovery counter.
    pending_initial: AtomicBool,
}

impl PathTracker {
    fn new(path: NodePath, epoch: u64) -> Self {
        Self {
            path,
            epoch,
            watch: Mutex::new(WatchState::default()),
            refresh_lock: tokio::sync::Mutex::new(()),
            watch_task: Mutex::new(None),
            pending_initial: AtomicBool::new(true),
        }
    }

    fn transition(&self, event: WatchEvent, recursive: bool) -> Vec<WatchAction> {
        let mut state = lock(&self.watch);
        let (next, actions) = state.on_event(event, recursive);
        *state = next;
        actions
    }

    fn replace_watch_task(&self, handle: AbortHandle) {
        if let Some(previous) = lock(&self.watch_task).replace(handle) {
            previous.abort();
        }
    }

    /// Abort the watch task, dropping its registration.
    fn cancel_watch(&self) {
        if let Some(handle) = lock(&self.watch_task).take() {
            handle.abort();
        }
    }
}

/// The Synchronization Engine for one cache instance.
pub(crate) struct Engine<S> {
    store: Arc<S>,
    config: CacheConfig,
    root: NodePath,
    table: RwLock<CacheTable>,
    trackers: DashMap<NodePath, Arc<PathTracker>>,
    discovery: DiscoveryCounter,
    session: Mutex<SessionPhase>,
    lifecycle: Mutex<Lifecycle>,
    running: AtomicBool,
    next_epoch: AtomicU64,
    runtime: OnceLock<Handle>,
    connection_task: Mutex<Option<AbortHandle>>,
    dispatcher: Dispatcher,
    listenable: Arc<Listenable>,
    metrics: Arc<CacheMetrics>,
}

impl<S> std::fmt::Debug for Engine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("root", &self.root)
            .field("config", &self.config)
            .field("trackers", &self.trackers.len())
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<S: NodeStore> Engine<S> {
    pub(crate) fn new(store: S, root: NodePath, config: CacheConfig) -> Self {
        let mode = if config.single_node {
            TableMode::SingleNode
        } else {
            TableMode::Recursive
        };
        Self {
            store: Arc::new(store),
            table: RwLock::new(CacheTable::new(root.clone(), mode)),
            root,
            config,
            trackers: DashMap::new(),
            discovery: DiscoveryCounter::new(),
            session: Mutex::new(SessionPhase::default()),
            lifecycle: Mutex::new(Lifecycle::Latent),
            running: AtomicBool::new(false),
            next_epoch: AtomicU64::new(0),
            runtime: OnceLock::new(),
            connection_task: Mutex::new(None),
            dispatcher: Dispatcher::default(),
            listenable: Arc::new(Listenable::default()),
            metrics: Arc::new(CacheMetrics::default()),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start tracking the root. Must be called from within a Tokio runtime.
    pub(crate) fn start(self: &Arc<Self>) -> Result<(), CacheError> {
        let runtime = Handle::try_current().map_err(|_| {
            CacheError::Startup("start() must be called from within a Tokio runtime".into())
        })?;

        let (mut connection_events, connected) = {
            let mut lifecycle = lock(&self.lifecycle);
            match *lifecycle {
                Lifecycle::Started => return Err(CacheError::AlreadyStarted),
                Lifecycle::Stopped => return Err(CacheError::Stopped),
                Lifecycle::Latent => {}
            }

            // Subscribe before sampling so no transition falls in between
            let events = self.store.connection_events();
            let state = self.store.connection_state();
            if !state.is_connected() && self.config.require_connection {
                return Err(CacheError::Startup(format!("store is {}", state)));
            }
            *lifecycle = Lifecycle::Started;
            (events, state.is_connected())
        };

        *lock(&self.session) = SessionPhase::new(connected);
        // Only the single Latent -> Started transition reaches here
        let _ = self.runtime.set(runtime.clone());
        self.dispatcher.open(
            &runtime,
            Arc::clone(&self.listenable),
            Arc::clone(&self.metrics),
        );
        self.running.store(true, Ordering::Release);

        let engine = Arc::clone(self);
        let task = runtime.spawn(async move {
            loop {
                match connection_events.recv().await {
                    Ok(state) => engine.on_connection_state(state),
                    Err(RecvError::Lagged(missed)) => {
                        warn!("Missed {} connection events, resyncing", missed);
                        let state = engine.store.connection_state();
                        engine.on_connection_state(state);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        *lock(&self.connection_task) = Some(task.abort_handle());

        info!(
            "Cache started at {} ({}, connected: {})",
            self.root,
            if self.recursive() { "recursive" } else { "single node" },
            connected
        );
        self.track(self.root.clone());
        Ok(())
    }

    /// Stop synchronizing. Returns `false` if the cache was not running.
    pub(crate) fn stop(&self) -> bool {
        {
            let mut lifecycle = lock(&self.lifecycle);
            let was = *lifecycle;
            *lifecycle = Lifecycle::Stopped;
            if was != Lifecycle::Started {
                return false;
            }
        }
        self.running.store(false, Ordering::Release);

        if let Some(task) = lock(&self.connection_task).take() {
            task.abort();
        }
        let trackers = self.tracker_list();
        self.trackers.clear();
        for tracker in &trackers {
            tracker.transition(WatchEvent::Untrack, self.recursive());
            tracker.cancel_watch();
        }

        let dropped = self
            .table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .len();
        self.dispatcher.close();
        info!(
            "Cache at {} stopped ({} watches cancelled, {} nodes dropped)",
            self.root,
            trackers.len(),
            dropped
        );
        true
    }

    pub(crate) fn lifecycle(&self) -> Lifecycle {
        *lock(&self.lifecycle)
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn recursive(&self) -> bool {
        !self.config.single_node
    }

    fn spawn<F>(&self, future: F) -> Option<AbortHandle>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.runtime
            .get()
            .map(|runtime| runtime.spawn(future).abort_handle())
    }

    // =========================================================================
    // Tracking
    // =========================================================================

    /// Start tracking `path`. Tracking an already tracked path is a no-op.
    fn track(self: &Arc<Self>, path: NodePath) -> bool {
        if !self.is_running() {
            return false;
        }
        let covered = self
            .table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .covers(&path);
        if !covered {
            return false;
        }

        let tracker = match self.trackers.entry(path) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(slot) => {
                let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
                let tracker = Arc::new(PathTracker::new(slot.key().clone(), epoch));
                // Registered before the discovering refresh completes its own unit
                self.discovery.begin();
                slot.insert(Arc::clone(&tracker));
                tracker
            }
        };
        debug!("Tracking {}", tracker.path);
        self.spawn(Arc::clone(self).drive(tracker, WatchEvent::Track));
        true
    }

    fn untrack(&self, path: &NodePath) {
        let Some((_, tracker)) = self.trackers.remove(path) else {
            return;
        };
        for action in tracker.transition(WatchEvent::Untrack, self.recursive()) {
            if action == WatchAction::Cancel {
                tracker.cancel_watch();
            }
        }
        debug!("Untracked {}", path);
        self.finish_initial(&tracker);
    }

    /// Untrack every tracked path strictly below `path`.
    fn untrack_descendants(&self, path: &NodePath) {
        let doomed: Vec<NodePath> = self
            .trackers
            .iter()
            .filter(|entry| path.is_ancestor_of(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        for descendant in &doomed {
            self.untrack(descendant);
        }
    }

    fn untrack_subtree(&self, path: &NodePath) {
        self.untrack_descendants(path);
        self.untrack(path);
    }

    fn tracker_list(&self) -> Vec<Arc<PathTracker>> {
        self.trackers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Check whether `tracker` is still the live tracker for its path.
    fn is_current(&self, tracker: &PathTracker) -> bool {
        self.is_running()
            && self
                .trackers
                .get(&tracker.path)
                .is_some_and(|live| live.epoch == tracker.epoch)
    }

    /// Release the tracker's initial discovery unit, once.
    fn finish_initial(&self, tracker: &PathTracker) {
        if tracker.pending_initial.swap(false, Ordering::AcqRel) && self.discovery.complete() {
            info!("Initial crawl of {} complete", self.root);
            self.dispatcher.publish(CacheEvent::Initialized);
        }
    }

    // =========================================================================
    // Watch / refresh cycle
    // =========================================================================

    /// Feed `event` to the tracker's watch machine and execute the actions.
    fn drive(
        self: Arc<Self>,
        tracker: Arc<PathTracker>,
        event: WatchEvent,
    ) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let actions = tracker.transition(event, self.recursive());
            for action in actions {
                match action {
                    WatchAction::Subscribe => self.arm(&tracker).await,
                    WatchAction::Refresh { children } => self.refresh(&tracker, children).await,
                    WatchAction::Cancel => tracker.cancel_watch(),
                }
            }
        })
    }

    /// Register a watch and spawn the task that waits for it.
    async fn arm(self: &Arc<Self>, tracker: &Arc<PathTracker>) {
        if !self.is_current(tracker) {
            return;
        }
        let kinds = if self.recursive() {
            WatchKinds::DATA_AND_CHILDREN
        } else {
            WatchKinds::DATA
        };

        let watch = match self.store.subscribe(&tracker.path, kinds).await {
            Ok(watch) => watch,
            Err(e) => {
                debug!("Failed to arm watch on {}: {}", tracker.path, e);
                tracker.transition(WatchEvent::ArmFailed, self.recursive());
                if self.should_retry(&e) {
                    self.schedule_retry(tracker);
                }
                return;
            }
        };
        if !self.is_current(tracker) {
            return;
        }

        // Armed before the waiter exists, so a fire always finds WatchActive
        tracker.transition(WatchEvent::Armed, self.recursive());

        let engine = Arc::clone(self);
        let fired = Arc::clone(tracker);
        let waiter = self.spawn(async move {
            // None: the store dropped the registration; a resync re-arms it
            if let Some(notification) = watch.await {
                debug!("Watch fired on {}: {:?}", notification.path, notification.kind);
                let drive = Arc::clone(&engine).drive(fired, WatchEvent::Fired(notification.kind));
                engine.spawn(drive);
            }
        });
        if let Some(waiter) = waiter {
            tracker.replace_watch_task(waiter);
        }
        if !self.is_current(tracker) {
            tracker.cancel_watch();
        }
    }

    /// Re-read the path (and its children) and reconcile into the table.
    async fn refresh(self: &Arc<Self>, tracker: &Arc<PathTracker>, children: bool) {
        let _serial = tracker.refresh_lock.lock().await;
        if !self.is_current(tracker) {
            return;
        }
        let path = &tracker.path;
        let store = &self.store;

        let fresh = match self
            .with_retries(path, "get_data", || store.get_data(path))
            .await
        {
            Ok(fresh) => fresh,
            Err(e) => return self.refresh_failed(tracker, e),
        };
        // A failed listing does not hold back the node read
        let mut listing_error = None;
        let listing = if children && fresh.is_some() {
            match self
                .with_retries(path, "list_children", || store.list_children(path))
                .await
            {
                Ok(listing) => listing,
                Err(e) => {
                    listing_error = Some(e);
                    None
                }
            }
        } else {
            None
        };
        let fresh = if self.config.cache_data {
            fresh
        } else {
            fresh.map(NodeSnapshot::without_data)
        };

        // Trackers are removed under the same lock as the entries they cover,
        // so a concurrent listing never sees a removed node as still tracked.
        let (outcome, discovered) = {
            let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
            if !self.is_current(tracker) {
                return;
            }
            let (outcome, mut events) = table.reconcile_node(path, fresh);
            let mut removed = Vec::new();
            let mut discovered = Vec::new();
            let listed = listing_error.is_none()
                && matches!(
                    outcome,
                    NodeOutcome::Added
                        | NodeOutcome::Updated
                        | NodeOutcome::Current
                        | NodeOutcome::Stale
                );
            if listed {
                let children = table.reconcile_children(path, listing.as_deref());
                events.extend(children.events);
                removed = children.removed;
                discovered = children.discovered;
            }
            for event in events {
                self.dispatcher.publish(event);
            }

            for gone in &removed {
                self.untrack_subtree(gone);
            }
            if is_gone(outcome) {
                // The root stays watched so its re-creation is seen
                if *path == self.root {
                    self.untrack_descendants(path);
                } else {
                    self.untrack_subtree(path);
                }
            }
            (outcome, discovered)
        };

        CacheMetrics::incr(&self.metrics.refreshes);
        match outcome {
            NodeOutcome::Stale => {
                CacheMetrics::incr(&self.metrics.stale_discarded);
                debug!("Discarded stale read of {}", path);
            }
            NodeOutcome::Rejected => debug!("Ignored read of {}: parent not cached", path),
            other => debug!("Reconciled {}: {:?}", path, other),
        }

        // Children begin their discovery units before this path completes its own
        for child in discovered {
            self.track(child);
        }
        if is_gone(outcome) && *path != self.root {
            // The node may have been re-created after the parent last listed it
            self.resync_parent(path);
        }

        match listing_error {
            Some(e) => self.refresh_failed(tracker, e),
            None => self.finish_initial(tracker),
        }
    }

    /// Run a store read, re-issuing it on transient failure.
    ///
    /// Connection errors return immediately; see [`Engine::should_retry`].
    async fn with_retries<T, F, Fut>(
        &self,
        path: &NodePath,
        operation: &str,
        mut call: F,
    ) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_connection_error() => return Err(e),
                Err(e) if attempt < self.config.max_refresh_attempts && self.is_running() => {
                    debug!(
                        "{} on {} failed (attempt {}/{}): {}",
                        operation, path, attempt, self.config.max_refresh_attempts, e
                    );
                    attempt += 1;
                    tokio::time::sleep(self.config.refresh_retry_delay()).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn refresh_failed(self: &Arc<Self>, tracker: &Arc<PathTracker>, error: StoreError) {
        CacheMetrics::incr(&self.metrics.refresh_failures);
        if self.should_retry(&error) {
            warn!(
                "Refresh of {} failed, retrying in {:?}: {}",
                tracker.path,
                self.config.refresh_retry_delay(),
                error
            );
            self.schedule_retry(tracker);
        } else {
            debug!("Refresh of {} deferred until reconnect: {}", tracker.path, error);
        }
    }

    /// Connection errors while disconnected are left to the reconnect re-crawl.
    fn should_retry(&self, error: &StoreError) -> bool {
        !error.is_connection_error() || self.store.connection_state().is_connected()
    }

    /// Re-drive `tracker` after the retry delay, unless it has been untracked.
    fn schedule_retry(self: &Arc<Self>, tracker: &Arc<PathTracker>) {
        let engine = Arc::clone(self);
        let tracker = Arc::clone(tracker);
        let delay = self.config.refresh_retry_delay();
        self.spawn(async move {
            tokio::time::sleep(delay).await;
            if engine.is_current(&tracker) {
                Arc::clone(&engine).drive(tracker, WatchEvent::Resync).await;
            }
        });
    }

    /// Re-read the tracked parent of `path`, if any.
    fn resync_parent(self: &Arc<Self>, path: &NodePath) {
        let parent = path
            .parent()
            .and_then(|parent| self.trackers.get(&parent).map(|entry| Arc::clone(entry.value())));
        if let Some(parent) = parent {
            self.spawn(Arc::clone(self).drive(parent, WatchEvent::Resync));
        }
    }

    // =========================================================================
    // Connection handling
    // =========================================================================

    fn on_connection_state(self: &Arc<Self>, state: ConnectionState) {
        if !self.is_running() {
            return;
        }
        let actions = {
            let mut phase = lock(&self.session);
            let (next, actions) = phase.on_state(state);
            *phase = next;
            actions
        };
        info!("Connection state changed to {}", state);

        for action in actions {
            match action {
                SessionAction::EmitConnectionEvent(state) => {
                    self.dispatcher
                        .publish(CacheEvent::ConnectionStateChanged { state });
                }
                SessionAction::ExpireWatches => {
                    for tracker in self.tracker_list() {
                        tracker.transition(WatchEvent::SessionLost, self.recursive());
                        tracker.cancel_watch();
                    }
                }
                SessionAction::Recrawl => self.recrawl(),
            }
        }
    }

    /// Re-read every tracked path, re-arming watches that need it.
    fn recrawl(self: &Arc<Self>) {
        CacheMetrics::incr(&self.metrics.recrawls);
        self.track(self.root.clone());
        let trackers = self.tracker_list();
        info!("Re-crawling {} tracked paths under {}", trackers.len(), self.root);
        for tracker in trackers {
            self.spawn(Arc::clone(self).drive(tracker, WatchEvent::Resync));
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    fn read_table(&self) -> std::sync::RwLockReadGuard<'_, CacheTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn root(&self) -> &NodePath {
        &self.root
    }

    pub(crate) fn get(&self, path: &NodePath) -> Option<NodeSnapshot> {
        self.read_table().get(path).cloned()
    }

    pub(crate) fn snapshots(&self) -> Vec<NodeSnapshot> {
        self.read_table().snapshots()
    }

    pub(crate) fn size(&self) -> usize {
        self.read_table().len()
    }

    pub(crate) fn children_of(&self, path: &NodePath) -> Vec<NodeSnapshot> {
        let table = self.read_table();
        table
            .entry(path)
            .map(|entry| {
                entry
                    .children
                    .iter()
                    .filter_map(|child| table.get(child).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.discovery.is_initialized()
    }

    pub(crate) fn tracked_count(&self) -> usize {
        self.trackers.len()
    }

    pub(crate) fn listenable(&self) -> &Listenable {
        &self.listenable
    }

    pub(crate) fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    pub(crate) fn store(&self) -> &S {
        &self.store
    }
}
