//! CLI command implementations.

pub mod replay;
pub mod snapshot;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::ValueEnum;
use coord_cache_client::{
    CacheEvent, CacheListenerBuilder, ChildEvent, CompositeListener, MemoryNodeStore,
    MirrorCache, NodePath, NodeSnapshot, TreeEvent,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

use crate::scenario::Scenario;

/// How long to wait for the initial crawl before giving up.
const INITIALIZE_TIMEOUT: Duration = Duration::from_secs(10);

/// Listener shapes that `replay` can attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ListenerShape {
    /// Unified cache events
    Unified,
    /// Path-children events for direct children of the root
    Children,
    /// Tree events for every node under the root
    Tree,
    /// Bare change signals for the root node
    Node,
}

/// One event as printed by the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Observed {
    /// Event name.
    pub event: String,
    /// Affected node, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Payload: UTF-8 text, or `base64:` followed by the encoded bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Node data version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl Observed {
    fn signal(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            path: None,
            data: None,
            version: None,
        }
    }

    fn node(event: impl Into<String>, node: Option<&NodeSnapshot>) -> Self {
        let mut observed = Self::signal(event);
        if let Some(node) = node {
            observed.path = Some(node.path.to_string());
            observed.data = node.data().map(render_data);
            observed.version = Some(node.version());
        }
        observed
    }

    fn from_cache_event(event: &CacheEvent) -> Self {
        match event {
            CacheEvent::ConnectionStateChanged { state } => {
                Self::signal(format!("{:?}({})", event.kind(), state))
            }
            _ => Self::node(format!("{:?}", event.kind()), event.new_data().or(event.old_data())),
        }
    }

    fn from_child_event(event: &ChildEvent) -> Self {
        Self::node(format!("{:?}", event.kind), event.node.as_ref())
    }

    fn from_tree_event(event: &TreeEvent) -> Self {
        Self::node(format!("{:?}", event.kind), event.node.as_ref())
    }

    /// Single-line human-readable form.
    pub fn to_line(&self) -> String {
        let mut line = self.event.clone();
        if let Some(path) = &self.path {
            line.push(' ');
            line.push_str(path);
        }
        if let Some(version) = self.version {
            line.push_str(&format!(" v{}", version));
        }
        if let Some(data) = &self.data {
            line.push_str(&format!(" {:?}", data));
        }
        line
    }
}

/// Render a payload as text when it is valid UTF-8.
pub fn render_data(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => format!("base64:{}", STANDARD.encode(bytes)),
    }
}

/// Build a listener of the given shape that forwards what it sees to `tx`.
pub fn listener_for(
    shape: ListenerShape,
    root: NodePath,
    tx: mpsc::UnboundedSender<Observed>,
) -> CompositeListener {
    let builder = CacheListenerBuilder::new();
    let builder = match shape {
        ListenerShape::Unified => builder.for_all(move |event: &CacheEvent| {
            let _ = tx.send(Observed::from_cache_event(event));
        }),
        ListenerShape::Children => {
            builder.for_path_children_cache(root, move |event: &ChildEvent| {
                let _ = tx.send(Observed::from_child_event(event));
            })
        }
        ListenerShape::Tree => builder.for_tree_cache(move |event: &TreeEvent| {
            let _ = tx.send(Observed::from_tree_event(event));
        }),
        ListenerShape::Node => builder.for_node_cache(root, move || {
            let _ = tx.send(Observed::signal("NodeChanged"));
        }),
    };
    builder.build()
}

/// Seed a store, start a cache over it, wait for INITIALIZED, apply every
/// step, then let the cache settle.
///
/// `listener` is registered before the cache starts so it observes the
/// initial crawl.
pub async fn run_scenario(
    scenario: &Scenario,
    listener: Option<CompositeListener>,
    settle: Duration,
) -> Result<MirrorCache<MemoryNodeStore>> {
    let root = scenario.root_path()?;
    let store = MemoryNodeStore::new();
    scenario.seed_store(&store)?;

    let cache = MirrorCache::build(store.clone(), root, &scenario.options());
    if let Some(listener) = listener {
        cache.listenable().add_listener(listener);
    }

    let initialized = Arc::new(Notify::new());
    let signal = Arc::clone(&initialized);
    cache.listenable().add_listener(
        CacheListenerBuilder::new()
            .for_initialized(move || signal.notify_one())
            .build(),
    );

    cache.start().context("Failed to start cache")?;
    tokio::time::timeout(INITIALIZE_TIMEOUT, initialized.notified())
        .await
        .context("Cache did not initialize")?;
    tracing::info!(root = %cache.root(), nodes = cache.size(), "cache initialized");

    for (index, step) in scenario.steps.iter().enumerate() {
        tracing::debug!(index, ?step, "applying step");
        step.apply(&store)
            .await
            .with_context(|| format!("Step {} failed", index + 1))?;
    }

    tokio::time::sleep(settle).await;
    Ok(cache)
}

#[cfg(test)]
mod tests {
    use super::*;
    use coord_cache_client::{ConnectionState, Stat};

    fn snapshot(path: &str, data: &[u8], version: u64) -> NodeSnapshot {
        NodeSnapshot::new(
            NodePath::new(path).unwrap(),
            data.to_vec(),
            Stat::new(version, 1, 1),
        )
    }

    // ===========================================
    // Rendering Tests
    // ===========================================

    #[test]
    fn render_text_and_binary() {
        assert_eq!(render_data(b"hey there"), "hey there");
        assert_eq!(render_data(&[0xff, 0x00]), "base64:/wA=");
    }

    #[test]
    fn observed_from_unified_events() {
        let added = Observed::from_cache_event(&CacheEvent::Added {
            node: snapshot("/test/one", b"hey there", 0),
        });
        assert_eq!(added.to_line(), "Added /test/one v0 \"hey there\"");

        let removed = Observed::from_cache_event(&CacheEvent::Removed {
            old: snapshot("/test/one", b"sup!", 1),
        });
        assert_eq!(removed.event, "Removed");
        assert_eq!(removed.data.as_deref(), Some("sup!"));

        let state = Observed::from_cache_event(&CacheEvent::ConnectionStateChanged {
            state: ConnectionState::Suspended,
        });
        assert_eq!(state.to_line(), "ConnectionStateChanged(SUSPENDED)");
        assert_eq!(
            serde_json::to_string(&state).unwrap(),
            r#"{"event":"ConnectionStateChanged(SUSPENDED)"}"#
        );
    }

    // ===========================================
    // Scenario Driver Tests
    // ===========================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn tree_shape_replay() {
        let scenario = Scenario::parse(
            r#"
root = "/test"
[[seed]]
path = "/test"
[[step]]
op = "create"
path = "/test/one"
data = "hey there"
[[step]]
op = "wait"
ms = 100
[[step]]
op = "set"
path = "/test/one"
data = "sup!"
[[step]]
op = "wait"
ms = 100
[[step]]
op = "delete"
path = "/test/one"
"#,
        )
        .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = listener_for(ListenerShape::Tree, scenario.root_path().unwrap(), tx);
        let cache = run_scenario(&scenario, Some(listener), Duration::from_millis(200))
            .await
            .unwrap();
        cache.stop();

        let mut events = Vec::new();
        while let Ok(observed) = rx.try_recv() {
            events.push(observed.to_line());
        }
        assert_eq!(
            events,
            vec![
                "NodeAdded /test v0 \"\"",
                "Initialized",
                "NodeAdded /test/one v0 \"hey there\"",
                "NodeUpdated /test/one v1 \"sup!\"",
                "NodeRemoved /test/one v1 \"sup!\"",
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failing_step_reports_index() {
        let scenario = Scenario::parse(
            "root = \"/test\"\n[[step]]\nop = \"delete\"\npath = \"/test/missing\"\n",
        )
        .unwrap();
        let err = run_scenario(&scenario, None, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("Step 1 failed"));
    }
}
