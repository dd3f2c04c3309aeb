//! Event Dispatcher.
//!
//! The engine publishes events into an unbounded channel while it still
//! holds the table lock, so channel order is reconciliation order. A single
//! delivery task drains the channel and hands each event to every listener
//! registered at that moment.
//!
//! Delivery works from a copy of the listener set, so listeners can add or
//! remove listeners (themselves included) from inside a callback.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use coord_cache_types::CacheEvent;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::listener::{CacheListener, ListenerId};
use crate::metrics::CacheMetrics;

type SharedListener = Arc<dyn CacheListener>;

/// Listener registry for one cache.
#[derive(Default)]
pub struct Listenable {
    listeners: RwLock<Vec<(ListenerId, SharedListener)>>,
}

impl std::fmt::Debug for Listenable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listenable")
            .field("listeners", &self.len())
            .finish()
    }
}

impl Listenable {
    /// Register a listener. It receives every event delivered from now on.
    pub fn add_listener(&self, listener: impl CacheListener) -> ListenerId {
        self.add_shared(Arc::new(listener))
    }

    /// Register an already shared listener.
    pub fn add_shared(&self, listener: Arc<dyn CacheListener>) -> ListenerId {
        let id = ListenerId::new();
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check whether no listeners are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn current(&self) -> Vec<SharedListener> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect()
    }

    /// Deliver one event to every listener, isolating panics.
    pub(crate) fn deliver(&self, event: &CacheEvent, metrics: &CacheMetrics) {
        for listener in self.current() {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener.event(event)));
            if outcome.is_err() {
                CacheMetrics::incr(&metrics.listener_panics);
                warn!("Listener panicked handling {:?} event", event.kind());
            }
        }
        CacheMetrics::incr(&metrics.events_dispatched);
    }
}

/// Ordered event channel plus its delivery task.
#[derive(Debug, Default)]
pub(crate) struct Dispatcher {
    tx: Mutex<Option<mpsc::UnboundedSender<CacheEvent>>>,
}

impl Dispatcher {
    /// Start the delivery task on `runtime`.
    pub(crate) fn open(
        &self,
        runtime: &Handle,
        listeners: Arc<Listenable>,
        metrics: Arc<CacheMetrics>,
    ) {
        let (tx, mut rx) = mpsc::unbounded_channel::<CacheEvent>();
        runtime.spawn(async move {
            while let Some(event) = rx.recv().await {
                listeners.deliver(&event, &metrics);
            }
            debug!("Event dispatcher drained");
        });
        *self.tx.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
    }

    /// Queue an event. Returns `false` once the dispatcher is closed.
    pub(crate) fn publish(&self, event: CacheEvent) -> bool {
        match self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Stop accepting events. Already queued events are still delivered.
    pub(crate) fn close(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}
