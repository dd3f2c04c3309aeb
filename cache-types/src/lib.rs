//! # cache-types
//!
//! Foundation types for the coordination-service mirror cache.
//!
//! This crate provides the types shared by every other crate in the workspace:
//! - [`NodePath`] - Normalized hierarchical path
//! - [`Stat`], [`NodeSnapshot`] - Last known state of a remote node
//! - [`CacheEvent`] - The unified event model delivered to listeners
//! - [`ConnectionState`], [`ChangeKind`] - Signals from the remote store
//! - [`CacheError`], [`PathError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod event;
mod node;
mod path;

pub use error::{CacheError, PathError};
pub use event::{CacheEvent, ChangeKind, ConnectionState, EventKind};
pub use node::{NodeSnapshot, Stat};
pub use path::NodePath;
