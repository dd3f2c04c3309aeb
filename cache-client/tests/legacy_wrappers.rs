//! End-to-end tests of the unified listener and the three legacy shapes
//! against the in-memory store.

use std::time::Duration;

use coord_cache_client::{
    CacheEvent, CacheListenerBuilder, CacheOption, ChildEvent, ChildEventKind, EventKind,
    MemoryNodeStore, MirrorCache, NodePath, TreeEvent, TreeEventKind,
};
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(5);

fn path(s: &str) -> NodePath {
    NodePath::new(s).unwrap()
}

async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("listener channel closed")
}

async fn assert_quiet<T: std::fmt::Debug>(rx: &mut mpsc::UnboundedReceiver<T>) {
    let result = tokio::time::timeout(Duration::from_millis(150), rx.recv()).await;
    assert!(result.is_err(), "unexpected event: {:?}", result);
}

// ===========================================
// Unified / Tree Shape
// ===========================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tree_scenario() {
    let store = MemoryNodeStore::new();
    store.create(&path("/test"), b"").unwrap();

    let cache = MirrorCache::build(store.clone(), path("/test"), &[]);
    let (tx, mut rx) = mpsc::unbounded_channel();
    cache.listenable().add_listener(
        CacheListenerBuilder::new()
            .for_tree_cache(move |e: &TreeEvent| {
                let _ = tx.send(e.clone());
            })
            .build(),
    );
    cache.start().unwrap();

    let added = recv(&mut rx).await;
    assert_eq!(added.kind, TreeEventKind::NodeAdded);
    assert_eq!(added.node.unwrap().path, path("/test"));
    assert_eq!(recv(&mut rx).await.kind, TreeEventKind::Initialized);
    assert!(cache.children_of(&path("/test")).is_empty());

    store.create(&path("/test/one"), b"hey there").unwrap();
    let added = recv(&mut rx).await;
    assert_eq!(added.kind, TreeEventKind::NodeAdded);
    assert_eq!(added.node.unwrap().path, path("/test/one"));
    assert_eq!(
        cache.get(&path("/test/one")).unwrap().data(),
        Some(&b"hey there"[..])
    );

    store.set_data(&path("/test/one"), b"sup!").unwrap();
    let updated = recv(&mut rx).await;
    assert_eq!(updated.kind, TreeEventKind::NodeUpdated);
    assert_eq!(updated.node.unwrap().path, path("/test/one"));
    assert_eq!(
        cache.get(&path("/test/one")).unwrap().data(),
        Some(&b"sup!"[..])
    );

    store.delete(&path("/test/one")).unwrap();
    let removed = recv(&mut rx).await;
    assert_eq!(removed.kind, TreeEventKind::NodeRemoved);
    let old = removed.node.unwrap();
    assert_eq!(old.path, path("/test/one"));
    assert_eq!(old.data(), Some(&b"sup!"[..]));
    assert!(cache.get(&path("/test/one")).is_none());

    assert_quiet(&mut rx).await;
}

// ===========================================
// Path-Children Shape
// ===========================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn path_children_scenario() {
    let store = MemoryNodeStore::new();
    store.create(&path("/test"), b"").unwrap();

    let cache = MirrorCache::build(store.clone(), path("/test"), &[]);
    let (tx, mut rx) = mpsc::unbounded_channel();
    cache.listenable().add_listener(
        CacheListenerBuilder::new()
            .for_path_children_cache(path("/test"), move |e: &ChildEvent| {
                let _ = tx.send(e.clone());
            })
            .build(),
    );
    cache.start().unwrap();

    // The root itself is never reported
    assert_eq!(recv(&mut rx).await.kind, ChildEventKind::Initialized);

    store.create(&path("/test/one"), b"hey there").unwrap();
    let event = recv(&mut rx).await;
    assert_eq!(event.kind, ChildEventKind::ChildAdded);
    assert_eq!(event.node.unwrap().path, path("/test/one"));

    store.set_data(&path("/test/one"), b"sup!").unwrap();
    let event = recv(&mut rx).await;
    assert_eq!(event.kind, ChildEventKind::ChildUpdated);
    assert_eq!(event.node.unwrap().data(), Some(&b"sup!"[..]));

    // Deeper descendants are not direct children
    store.create(&path("/test/one/deep"), b"").unwrap();
    assert_quiet(&mut rx).await;
    store.delete(&path("/test/one/deep")).unwrap();
    assert_quiet(&mut rx).await;

    store.delete(&path("/test/one")).unwrap();
    let event = recv(&mut rx).await;
    assert_eq!(event.kind, ChildEventKind::ChildRemoved);
    assert_eq!(event.node.unwrap().path, path("/test/one"));

    // Changing the root itself is not a child event
    store.set_data(&path("/test"), b"root change").unwrap();
    assert_quiet(&mut rx).await;
}

// ===========================================
// Node Shape
// ===========================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn node_scenario() {
    let store = MemoryNodeStore::new();
    store.create(&path("/test"), b"").unwrap();
    let node_path = path("/test/node");

    let cache = MirrorCache::build(store.clone(), node_path.clone(), &[CacheOption::SingleNodeCache]);
    let (tx, mut rx) = mpsc::unbounded_channel();
    cache.listenable().add_listener(
        CacheListenerBuilder::new()
            .for_node_cache(node_path.clone(), move || {
                let _ = tx.send(());
            })
            .build(),
    );
    let (init_tx, mut init_rx) = mpsc::unbounded_channel();
    cache.listenable().add_listener(
        CacheListenerBuilder::new()
            .for_initialized(move || {
                let _ = init_tx.send(());
            })
            .build(),
    );
    cache.start().unwrap();
    recv(&mut init_rx).await;

    assert!(cache.get(&node_path).is_none());
    assert!(cache.require(&node_path).is_err());

    store.create(&node_path, b"a").unwrap();
    recv(&mut rx).await;
    assert_eq!(cache.get(&node_path).unwrap().data(), Some(&b"a"[..]));

    store.set_data(&node_path, b"b").unwrap();
    recv(&mut rx).await;
    assert_eq!(cache.require(&node_path).unwrap().data(), Some(&b"b"[..]));

    store.delete(&node_path).unwrap();
    recv(&mut rx).await;
    assert!(cache.get(&node_path).is_none());

    // Single-node caches never track children or siblings
    store.create(&path("/test/other"), b"").unwrap();
    assert_quiet(&mut rx).await;
    assert_eq!(cache.tracked_paths(), 1);
}

// ===========================================
// Event Ordering Properties
// ===========================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn one_added_then_updates_then_one_removed() {
    let store = MemoryNodeStore::new();
    store.create(&path("/test"), b"").unwrap();

    let cache = MirrorCache::build(store.clone(), path("/test"), &[]);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let target = path("/test/churn");
    let filter = target.clone();
    cache.listenable().add_listener(move |e: &CacheEvent| {
        if e.path() == Some(&filter) {
            let _ = tx.send(e.clone());
        }
    });
    cache.start().unwrap();

    store.create(&target, b"0").unwrap();
    for i in 1..=20u32 {
        store.set_data(&target, i.to_string().as_bytes()).unwrap();
    }

    // The cache converges on the latest write
    let mut kinds = Vec::new();
    loop {
        let event = recv(&mut rx).await;
        kinds.push(event.kind());
        if let CacheEvent::Updated { node, .. } | CacheEvent::Added { node } = &event {
            if node.data() == Some(&b"20"[..]) {
                break;
            }
        }
    }
    store.delete(&target).unwrap();
    kinds.push(recv(&mut rx).await.kind());
    assert_quiet(&mut rx).await;

    assert_eq!(kinds.first(), Some(&EventKind::Added));
    assert_eq!(kinds.last(), Some(&EventKind::Removed));
    assert!(kinds[1..kinds.len() - 1]
        .iter()
        .all(|k| *k == EventKind::Updated));
    assert!(cache.get(&target).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn versions_never_regress() {
    let store = MemoryNodeStore::new();
    store.create(&path("/test"), b"").unwrap();

    let cache = MirrorCache::build(store.clone(), path("/test"), &[]);
    let (tx, mut rx) = mpsc::unbounded_channel();
    cache.listenable().add_listener(
        CacheListenerBuilder::new()
            .for_creates_and_changes(move |_, node| {
                let _ = tx.send(node.version());
            })
            .build(),
    );
    cache.start().unwrap();
    assert_eq!(recv(&mut rx).await, 0); // root

    let target = path("/test/v");
    store.create(&target, b"").unwrap();
    for _ in 0..30 {
        store.set_data(&target, b"x").unwrap();
    }

    let mut last = None;
    loop {
        let version = recv(&mut rx).await;
        if let Some(previous) = last {
            assert!(version > previous, "version regressed: {} after {}", version, previous);
        }
        last = Some(version);
        if version == 30 {
            break;
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn initialized_exactly_once() {
    let store = MemoryNodeStore::new();
    for p in ["/test/a/b", "/test/c"] {
        store.create_parents(&path(p), b"").unwrap();
    }

    let cache = MirrorCache::build(store.clone(), path("/test"), &[]);
    let (tx, mut rx) = mpsc::unbounded_channel();
    cache.listenable().add_listener(move |e: &CacheEvent| {
        let _ = tx.send(e.kind());
    });
    cache.start().unwrap();

    let mut before = 0;
    loop {
        match recv(&mut rx).await {
            EventKind::Initialized => break,
            EventKind::Added => before += 1,
            other => panic!("unexpected {:?}", other),
        }
    }
    // Every node existing at start was reconciled first
    assert_eq!(before, 4);

    store.create(&path("/test/d"), b"").unwrap();
    store.delete(&path("/test/c")).unwrap();
    let mut later = vec![recv(&mut rx).await, recv(&mut rx).await];
    later.sort_by_key(|k| format!("{:?}", k));
    assert_eq!(later, vec![EventKind::Added, EventKind::Removed]);
    assert_quiet(&mut rx).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn after_initialized_listener_skips_initial_crawl() {
    let store = MemoryNodeStore::new();
    store.create_parents(&path("/test/existing"), b"").unwrap();

    let cache = MirrorCache::build(store.clone(), path("/test"), &[]);
    let (tx, mut rx) = mpsc::unbounded_channel();
    cache.listenable().add_listener(
        CacheListenerBuilder::new()
            .for_all(move |e: &CacheEvent| {
                let _ = tx.send(e.kind());
            })
            .after_initialized()
            .build(),
    );
    cache.start().unwrap();

    assert_eq!(recv(&mut rx).await, EventKind::Initialized);
    store.create(&path("/test/fresh"), b"").unwrap();
    assert_eq!(recv(&mut rx).await, EventKind::Added);
}
