//! Legacy listener shapes.
//!
//! Each adapter is a [`CacheListener`](crate::CacheListener) that consumes
//! the unified event stream and re-expresses it in an older, narrower
//! contract:
//!
//! - [`PathChildrenAdapter`]: direct children of one parent only
//! - [`TreeAdapter`]: every node at any depth, plus INITIALIZED
//! - [`NodeAdapter`]: a bare "changed" signal for a single-node cache
//!
//! None of the legacy shapes surface `CONNECTED`; the older contracts only
//! report interruptions and recoveries.

mod children;
mod node;
mod tree;

pub use children::{ChildEvent, ChildEventKind, PathChildrenAdapter, PathChildrenListener};
pub use node::{NodeAdapter, NodeListener};
pub use tree::{TreeAdapter, TreeEvent, TreeEventKind, TreeListener};
