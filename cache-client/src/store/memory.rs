//! In-memory node store for testing and demos.
//!
//! Behaves like a single coordination-service server: a tree of nodes with
//! per-incarnation versions, a store-wide transaction counter, one-shot
//! watches, and a connection state that can be driven from tests. Also
//! allows injecting failures into the next read or subscribe call.

use super::{NodeStore, StoreError, Watch, WatchKinds, WatchNotification};
use async_trait::async_trait;
use coord_cache_types::{ChangeKind, ConnectionState, NodePath, NodeSnapshot, Stat};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, oneshot};

const CONNECTION_EVENT_CAPACITY: usize = 64;

#[derive(Debug)]
struct MemNode {
    data: Vec<u8>,
    stat: Stat,
    children: BTreeSet<String>,
}

#[derive(Debug)]
struct Registration {
    kinds: WatchKinds,
    tx: oneshot::Sender<WatchNotification>,
}

#[derive(Debug)]
struct MemoryStoreInner {
    nodes: HashMap<NodePath, MemNode>,
    zxid: u64,
    watches: HashMap<NodePath, Vec<Registration>>,
    state: ConnectionState,
    fail_next_get_data: Option<StoreError>,
    fail_next_list_children: Option<StoreError>,
    fail_next_subscribe: Option<StoreError>,
    get_data_calls: u64,
}

impl Default for MemoryStoreInner {
    fn default() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            NodePath::root(),
            MemNode {
                data: Vec::new(),
                stat: Stat::default(),
                children: BTreeSet::new(),
            },
        );
        Self {
            nodes,
            zxid: 0,
            watches: HashMap::new(),
            state: ConnectionState::Connected,
            fail_next_get_data: None,
            fail_next_list_children: None,
            fail_next_subscribe: None,
            get_data_calls: 0,
        }
    }
}

impl MemoryStoreInner {
    fn next_zxid(&mut self) -> u64 {
        self.zxid += 1;
        self.zxid
    }

    fn check_connected(&self) -> Result<(), StoreError> {
        match self.state {
            ConnectionState::Connected | ConnectionState::Reconnected => Ok(()),
            ConnectionState::Suspended => Err(StoreError::ConnectionLoss),
            ConnectionState::Lost => Err(StoreError::SessionExpired),
        }
    }

    /// Fire and drop every registration on `path` that reports `kind`.
    ///
    /// While disconnected nothing fires; registrations stay in place, as a
    /// server would keep them for a session that is merely suspended.
    fn fire(&mut self, path: &NodePath, kind: ChangeKind) {
        if !self.state.is_connected() {
            return;
        }
        let Some(registrations) = self.watches.remove(path) else {
            return;
        };

        let mut kept = Vec::new();
        for registration in registrations {
            if registration.tx.is_closed() {
                continue;
            }
            if registration.kinds.matches(kind) {
                let _ = registration.tx.send(WatchNotification {
                    path: path.clone(),
                    kind,
                });
            } else {
                kept.push(registration);
            }
        }
        if !kept.is_empty() {
            self.watches.insert(path.clone(), kept);
        }
    }
}

/// In-memory [`NodeStore`].
///
/// Clones share the same tree, so a test can hand one clone to the cache
/// and mutate the tree through another.
#[derive(Debug, Clone)]
pub struct MemoryNodeStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
    events: broadcast::Sender<ConnectionState>,
}

impl Default for MemoryNodeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNodeStore {
    /// Create a connected store containing only the root node.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(CONNECTION_EVENT_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(MemoryStoreInner::default())),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryStoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a node. The parent must exist.
    pub fn create(&self, path: &NodePath, data: &[u8]) -> Result<Stat, StoreError> {
        let mut inner = self.lock();
        if inner.nodes.contains_key(path) {
            return Err(StoreError::NodeExists(path.clone()));
        }
        let parent = path
            .parent()
            .ok_or_else(|| StoreError::NodeExists(path.clone()))?;
        if !inner.nodes.contains_key(&parent) {
            return Err(StoreError::NoNode(parent));
        }

        let zxid = inner.next_zxid();
        let stat = Stat::new(0, zxid, zxid);
        inner.nodes.insert(
            path.clone(),
            MemNode {
                data: data.to_vec(),
                stat,
                children: BTreeSet::new(),
            },
        );
        if let Some(parent_node) = inner.nodes.get_mut(&parent) {
            parent_node.children.insert(path.name().to_string());
        }

        inner.fire(path, ChangeKind::NodeCreated);
        inner.fire(&parent, ChangeKind::ChildrenChanged);
        Ok(stat)
    }

    /// Create a node, creating any missing ancestors with empty data.
    pub fn create_parents(&self, path: &NodePath, data: &[u8]) -> Result<Stat, StoreError> {
        let mut missing = Vec::new();
        let mut current = path.parent();
        while let Some(ancestor) = current {
            if self.exists(&ancestor) {
                break;
            }
            current = ancestor.parent();
            missing.push(ancestor);
        }
        for ancestor in missing.into_iter().rev() {
            match self.create(&ancestor, &[]) {
                Ok(_) | Err(StoreError::NodeExists(_)) => {}
                Err(e) => return Err(e),
            }
        }
        self.create(path, data)
    }

    /// Replace a node's data, bumping its version.
    pub fn set_data(&self, path: &NodePath, data: &[u8]) -> Result<Stat, StoreError> {
        let mut inner = self.lock();
        let zxid = inner.next_zxid();
        let node = inner
            .nodes
            .get_mut(path)
            .ok_or_else(|| StoreError::NoNode(path.clone()))?;
        node.data = data.to_vec();
        node.stat.version += 1;
        node.stat.mzxid = zxid;
        let stat = node.stat;

        inner.fire(path, ChangeKind::DataChanged);
        Ok(stat)
    }

    /// Delete a childless node.
    pub fn delete(&self, path: &NodePath) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let Some(parent) = path.parent() else {
            return Err(StoreError::Unavailable("cannot delete the root".into()));
        };
        match inner.nodes.get(path) {
            None => return Err(StoreError::NoNode(path.clone())),
            Some(node) if !node.children.is_empty() => {
                return Err(StoreError::NotEmpty(path.clone()))
            }
            Some(_) => {}
        }

        inner.next_zxid();
        inner.nodes.remove(path);
        if let Some(parent_node) = inner.nodes.get_mut(&parent) {
            parent_node.children.remove(path.name());
        }

        inner.fire(path, ChangeKind::NodeDeleted);
        inner.fire(&parent, ChangeKind::ChildrenChanged);
        Ok(())
    }

    /// Delete a node and all of its descendants, deepest first.
    pub fn delete_recursive(&self, path: &NodePath) -> Result<(), StoreError> {
        let mut doomed: Vec<NodePath> = {
            let inner = self.lock();
            if !inner.nodes.contains_key(path) {
                return Err(StoreError::NoNode(path.clone()));
            }
            inner
                .nodes
                .keys()
                .filter(|p| *p == path || path.is_ancestor_of(p))
                .cloned()
                .collect()
        };
        doomed.sort_by_key(|p| std::cmp::Reverse(p.depth()));
        for p in doomed {
            self.delete(&p)?;
        }
        Ok(())
    }

    /// Check whether a node exists.
    pub fn exists(&self, path: &NodePath) -> bool {
        self.lock().nodes.contains_key(path)
    }

    /// Read a node's data directly, bypassing connection state.
    pub fn data(&self, path: &NodePath) -> Option<Vec<u8>> {
        self.lock().nodes.get(path).map(|n| n.data.clone())
    }

    /// Change the connection state and broadcast the transition.
    ///
    /// `Lost` expires the session: every registered watch is dropped and
    /// resolves to `None`.
    pub fn set_connection_state(&self, state: ConnectionState) {
        {
            let mut inner = self.lock();
            inner.state = state;
            if state == ConnectionState::Lost {
                inner.watches.clear();
            }
        }
        // No receivers is fine
        let _ = self.events.send(state);
    }

    /// Number of live watch registrations.
    pub fn watch_count(&self) -> usize {
        self.lock()
            .watches
            .values()
            .flatten()
            .filter(|r| !r.tx.is_closed())
            .count()
    }

    /// Number of `get_data` calls served or failed so far.
    pub fn get_data_calls(&self) -> u64 {
        self.lock().get_data_calls
    }

    /// Cause the next `get_data()` to fail with the given error.
    pub fn fail_next_get_data(&self, error: StoreError) {
        self.lock().fail_next_get_data = Some(error);
    }

    /// Cause the next `list_children()` to fail with the given error.
    pub fn fail_next_list_children(&self, error: StoreError) {
        self.lock().fail_next_list_children = Some(error);
    }

    /// Cause the next `subscribe()` to fail with the given error.
    pub fn fail_next_subscribe(&self, error: StoreError) {
        self.lock().fail_next_subscribe = Some(error);
    }
}

#[async_trait]
impl NodeStore for MemoryNodeStore {
    async fn get_data(&self, path: &NodePath) -> Result<Option<NodeSnapshot>, StoreError> {
        let mut inner = self.lock();
        inner.get_data_calls += 1;
        inner.check_connected()?;

        // Check for forced failure
        if let Some(error) = inner.fail_next_get_data.take() {
            return Err(error);
        }

        Ok(inner
            .nodes
            .get(path)
            .map(|node| NodeSnapshot::new(path.clone(), node.data.clone(), node.stat)))
    }

    async fn list_children(&self, path: &NodePath) -> Result<Option<Vec<String>>, StoreError> {
        let mut inner = self.lock();
        inner.check_connected()?;

        if let Some(error) = inner.fail_next_list_children.take() {
            return Err(error);
        }

        Ok(inner
            .nodes
            .get(path)
            .map(|node| node.children.iter().cloned().collect()))
    }

    async fn subscribe(&self, path: &NodePath, kinds: WatchKinds) -> Result<Watch, StoreError> {
        let mut inner = self.lock();
        inner.check_connected()?;

        if let Some(error) = inner.fail_next_subscribe.take() {
            return Err(error);
        }

        let (tx, watch) = Watch::channel();
        inner
            .watches
            .entry(path.clone())
            .or_default()
            .push(Registration { kinds, tx });
        Ok(watch)
    }

    fn connection_state(&self) -> ConnectionState {
        self.lock().state
    }

    fn connection_events(&self) -> broadcast::Receiver<ConnectionState> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn path(s: &str) -> NodePath {
        NodePath::new(s).unwrap()
    }

    // ===========================================
    // Tree Mutation Tests
    // ===========================================

    #[tokio::test]
    async fn create_and_read_back() {
        let store = MemoryNodeStore::new();
        store.create(&path("/test"), b"hello").unwrap();

        let node = store.get_data(&path("/test")).await.unwrap().unwrap();
        assert_eq!(node.data(), Some(&b"hello"[..]));
        assert_eq!(node.stat.version, 0);

        let children = store.list_children(&NodePath::root()).await.unwrap().unwrap();
        assert_eq!(children, vec!["test".to_string()]);
    }

    #[tokio::test]
    async fn create_requires_parent() {
        let store = MemoryNodeStore::new();
        let result = store.create(&path("/a/b"), b"");
        assert!(matches!(result, Err(StoreError::NoNode(p)) if p == path("/a")));

        store.create_parents(&path("/a/b/c"), b"x").unwrap();
        assert!(store.exists(&path("/a")));
        assert!(store.exists(&path("/a/b")));
        assert_eq!(store.data(&path("/a/b/c")), Some(b"x".to_vec()));
    }

    #[tokio::test]
    async fn set_data_bumps_version_and_zxid() {
        let store = MemoryNodeStore::new();
        let created = store.create(&path("/n"), b"a").unwrap();
        let updated = store.set_data(&path("/n"), b"b").unwrap();

        assert_eq!(updated.version, 1);
        assert_eq!(updated.czxid, created.czxid);
        assert!(updated.mzxid > created.mzxid);
    }

    #[tokio::test]
    async fn recreated_node_gets_new_incarnation() {
        let store = MemoryNodeStore::new();
        let first = store.create(&path("/n"), b"a").unwrap();
        store.set_data(&path("/n"), b"b").unwrap();
        store.delete(&path("/n")).unwrap();
        let second = store.create(&path("/n"), b"c").unwrap();

        assert_eq!(second.version, 0);
        assert!(second.supersedes(&first));
    }

    #[tokio::test]
    async fn delete_rejects_non_empty() {
        let store = MemoryNodeStore::new();
        store.create_parents(&path("/a/b"), b"").unwrap();
        assert!(matches!(
            store.delete(&path("/a")),
            Err(StoreError::NotEmpty(_))
        ));

        store.delete_recursive(&path("/a")).unwrap();
        assert!(!store.exists(&path("/a")));
        assert!(!store.exists(&path("/a/b")));
    }

    // ===========================================
    // Watch Tests
    // ===========================================

    #[tokio::test]
    async fn data_watch_fires_once() {
        let store = MemoryNodeStore::new();
        store.create(&path("/n"), b"a").unwrap();

        let watch = store.subscribe(&path("/n"), WatchKinds::DATA).await.unwrap();
        store.set_data(&path("/n"), b"b").unwrap();
        let fired = watch.await.unwrap();
        assert_eq!(fired.kind, ChangeKind::DataChanged);

        // One-shot: nothing remains registered
        assert_eq!(store.watch_count(), 0);
    }

    #[tokio::test]
    async fn watch_on_missing_node_reports_creation() {
        let store = MemoryNodeStore::new();
        let watch = store.subscribe(&path("/n"), WatchKinds::DATA).await.unwrap();
        store.create(&path("/n"), b"a").unwrap();
        assert_eq!(watch.await.unwrap().kind, ChangeKind::NodeCreated);
    }

    #[tokio::test]
    async fn children_watch_fires_on_child_create() {
        let store = MemoryNodeStore::new();
        store.create(&path("/p"), b"").unwrap();

        let data_only = store.subscribe(&path("/p"), WatchKinds::DATA).await.unwrap();
        let with_children = store
            .subscribe(&path("/p"), WatchKinds::DATA_AND_CHILDREN)
            .await
            .unwrap();
        store.create(&path("/p/c"), b"").unwrap();

        assert_eq!(with_children.await.unwrap().kind, ChangeKind::ChildrenChanged);
        // The data-only registration is still waiting
        assert_eq!(store.watch_count(), 1);
        drop(data_only);
        assert_eq!(store.watch_count(), 0);
    }

    #[tokio::test]
    async fn session_loss_drops_watches() {
        let store = MemoryNodeStore::new();
        let watch = store.subscribe(&path("/n"), WatchKinds::DATA).await.unwrap();

        store.set_connection_state(ConnectionState::Lost);
        assert!(watch.await.is_none());
    }

    #[tokio::test]
    async fn suspended_store_holds_fires() {
        let store = MemoryNodeStore::new();
        store.create(&path("/n"), b"a").unwrap();
        let mut watch = store.subscribe(&path("/n"), WatchKinds::DATA).await.unwrap();

        store.set_connection_state(ConnectionState::Suspended);
        store.set_data(&path("/n"), b"b").unwrap();
        let pending = tokio::time::timeout(Duration::from_millis(50), &mut watch).await;
        assert!(pending.is_err(), "watch must not fire while suspended");

        store.set_connection_state(ConnectionState::Reconnected);
        store.set_data(&path("/n"), b"c").unwrap();
        assert_eq!(watch.await.unwrap().kind, ChangeKind::DataChanged);
    }

    // ===========================================
    // Connection and Failure Injection Tests
    // ===========================================

    #[tokio::test]
    async fn reads_fail_while_disconnected() {
        let store = MemoryNodeStore::new();
        store.set_connection_state(ConnectionState::Suspended);
        assert!(matches!(
            store.get_data(&path("/")).await,
            Err(StoreError::ConnectionLoss)
        ));

        store.set_connection_state(ConnectionState::Lost);
        assert!(matches!(
            store.subscribe(&path("/"), WatchKinds::DATA).await,
            Err(StoreError::SessionExpired)
        ));
    }

    #[tokio::test]
    async fn connection_events_are_broadcast() {
        let store = MemoryNodeStore::new();
        let mut events = store.connection_events();

        store.set_connection_state(ConnectionState::Suspended);
        store.set_connection_state(ConnectionState::Reconnected);

        assert_eq!(events.recv().await.unwrap(), ConnectionState::Suspended);
        assert_eq!(events.recv().await.unwrap(), ConnectionState::Reconnected);
        assert_eq!(store.connection_state(), ConnectionState::Reconnected);
    }

    #[tokio::test]
    async fn forced_get_data_failure() {
        let store = MemoryNodeStore::new();
        store.fail_next_get_data(StoreError::Timeout);

        assert!(matches!(
            store.get_data(&path("/")).await,
            Err(StoreError::Timeout)
        ));
        // Next read should work
        assert!(store.get_data(&path("/")).await.unwrap().is_some());
        assert_eq!(store.get_data_calls(), 2);
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let store1 = MemoryNodeStore::new();
        let store2 = store1.clone();

        store1.create(&path("/shared"), b"x").unwrap();
        assert!(store2.exists(&path("/shared")));
    }
}
