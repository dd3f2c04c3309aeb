//! Per-path watch state machine.
//!
//! Remote watches are one-shot: once a notification fires the registration
//! is gone and must be re-armed before the notification counts as handled.
//! This module models that lifecycle as a pure state machine. The engine in
//! `cache-client` feeds it events and executes the returned actions.
//!
//! ```text
//!            Track                Armed
//! Unwatched ──────► WatchPending ──────► WatchActive
//!     ▲                  ▲                    │
//!     │ Untrack          └──── Fired ─────────┘
//!     └──────────── (from any state)
//! ```
//!
//! Every path through `Fired` goes back via `WatchPending`, so the engine
//! always re-subscribes before it refreshes.

use coord_cache_types::ChangeKind;

/// Watch lifecycle for one tracked path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchState {
    /// No registration and no intent to hold one.
    #[default]
    Unwatched,
    /// A registration is needed (initial, after a fire, or after session loss).
    WatchPending,
    /// A registration is in place on the remote store.
    WatchActive,
}

/// Inputs to the watch state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    /// Start tracking the path.
    Track,
    /// The subscription call succeeded.
    Armed,
    /// The subscription call failed.
    ArmFailed,
    /// The registered watch fired.
    Fired(ChangeKind),
    /// The store session expired; server-side watches are gone.
    SessionLost,
    /// The connection came back; re-read everything.
    Resync,
    /// Stop tracking the path.
    Untrack,
}

/// Instructions for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchAction {
    /// Register a watch on the path.
    Subscribe,
    /// Re-read the node, and its children listing when `children` is set.
    Refresh {
        /// Whether to list children as well.
        children: bool,
    },
    /// Drop any registration held for the path.
    Cancel,
}

impl WatchState {
    /// Process an event and return the new state plus actions to execute.
    ///
    /// `recursive` is true when the path is part of a subtree cache, in which
    /// case every refresh includes a children listing: one combined watch
    /// covers both data and children, so a child change racing with the
    /// re-arm would otherwise go unseen.
    pub fn on_event(self, event: WatchEvent, recursive: bool) -> (Self, Vec<WatchAction>) {
        let refresh = WatchAction::Refresh {
            children: recursive,
        };
        match (self, event) {
            (_, WatchEvent::Untrack) => (Self::Unwatched, vec![WatchAction::Cancel]),

            (Self::Unwatched, WatchEvent::Track) => {
                (Self::WatchPending, vec![WatchAction::Subscribe, refresh])
            }

            (Self::WatchPending, WatchEvent::Armed) => (Self::WatchActive, vec![]),
            (Self::WatchPending, WatchEvent::ArmFailed) => (Self::WatchPending, vec![]),

            (Self::WatchActive, WatchEvent::Fired(_)) => {
                (Self::WatchPending, vec![WatchAction::Subscribe, refresh])
            }
            // A fire observed while a re-arm is outstanding still needs a read.
            (Self::WatchPending, WatchEvent::Fired(_)) => (Self::WatchPending, vec![refresh]),

            (Self::WatchActive | Self::WatchPending, WatchEvent::SessionLost) => {
                (Self::WatchPending, vec![])
            }

            (Self::WatchPending, WatchEvent::Resync) => {
                (Self::WatchPending, vec![WatchAction::Subscribe, refresh])
            }
            (Self::WatchActive, WatchEvent::Resync) => (Self::WatchActive, vec![refresh]),

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Check whether the path is being tracked.
    pub fn is_tracked(&self) -> bool {
        !matches!(self, Self::Unwatched)
    }

    /// Check whether a registration is currently in place.
    pub fn is_armed(&self) -> bool {
        matches!(self, Self::WatchActive)
    }
}
