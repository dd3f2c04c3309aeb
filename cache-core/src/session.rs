//! Connection episode state machine.
//!
//! The remote store reports CONNECTED, SUSPENDED, LOST and RECONNECTED.
//! Changes made while the connection was down produce no notifications, so
//! the cache must re-crawl its tracked tree whenever connectivity returns
//! after an interruption. This machine decides when that happens.
//!
//! Pure: no I/O. The engine in `cache-client` interprets the actions.

use coord_cache_types::ConnectionState;

/// Where the cache is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Started without a confirmed connection.
    #[default]
    Initial,
    /// Connected; watches are live.
    Live,
    /// Connection interrupted.
    Interrupted {
        /// Whether the session expired during this interruption.
        lost: bool,
    },
}

/// Actions for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    /// Deliver a CONNECTION_STATE_CHANGED event to listeners.
    EmitConnectionEvent(ConnectionState),
    /// Mark every tracked watch as needing a re-arm.
    ExpireWatches,
    /// Re-read every tracked path and re-arm pending watches.
    Recrawl,
}

impl SessionPhase {
    /// Create the starting phase given the store's state at cache start.
    pub fn new(connected: bool) -> Self {
        if connected {
            Self::Live
        } else {
            Self::Initial
        }
    }

    /// Process a connection state and return the new phase plus actions.
    pub fn on_state(self, state: ConnectionState) -> (Self, Vec<SessionAction>) {
        let emit = SessionAction::EmitConnectionEvent(state);
        match (self, state) {
            // Connectivity arrives or returns: catch up on missed changes.
            (
                Self::Initial | Self::Interrupted { .. },
                ConnectionState::Connected | ConnectionState::Reconnected,
            ) => (Self::Live, vec![emit, SessionAction::Recrawl]),

            (Self::Live, ConnectionState::Connected | ConnectionState::Reconnected) => {
                (Self::Live, vec![emit])
            }

            (Self::Initial | Self::Live, ConnectionState::Suspended) => {
                (Self::Interrupted { lost: false }, vec![emit])
            }

            (Self::Initial | Self::Live | Self::Interrupted { .. }, ConnectionState::Lost) => (
                Self::Interrupted { lost: true },
                vec![emit, SessionAction::ExpireWatches],
            ),

            // Repeated suspension while already interrupted
            (Self::Interrupted { lost }, ConnectionState::Suspended) => {
                (Self::Interrupted { lost }, vec![])
            }
        }
    }

    /// Check whether the connection is currently usable.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }
}
