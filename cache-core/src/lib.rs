//! # cache-core
//!
//! Pure logic for the mirror cache (no I/O, instant tests).
//!
//! This crate implements the reconciliation rules and state machines that
//! keep a local table consistent with a remote hierarchical store, without
//! any network access:
//! - [`CacheTable`] - the Cache State Table and its compare-and-replace rules
//! - [`WatchState`] - per-path one-shot watch lifecycle
//! - [`SessionPhase`] - connection episodes and when to re-crawl
//! - [`DiscoveryCounter`] - outstanding crawl work for the INITIALIZED milestone
//!
//! The async engine in `cache-client` performs the actual store calls and
//! interprets the actions these machines produce.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod discovery;
pub mod session;
pub mod table;
pub mod watch;

pub use discovery::DiscoveryCounter;
pub use session::{SessionAction, SessionPhase};
pub use table::{CacheEntry, CacheTable, ChildrenOutcome, NodeOutcome, TableMode};
pub use watch::{WatchAction, WatchEvent, WatchState};
