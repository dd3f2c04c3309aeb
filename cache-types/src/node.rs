//! Node snapshots as observed from the remote store.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::path::NodePath;

/// Remote store metadata attached to every snapshot.
///
/// `version` counts data modifications within one incarnation of the node
/// and restarts when the node is deleted and created again. `czxid` is the
/// store-wide sequence number of the creating transaction, so the pair
/// `(czxid, version)` grows monotonically for a path across incarnations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stat {
    /// Data version within the current incarnation.
    pub version: u64,
    /// Transaction id that created this incarnation.
    pub czxid: u64,
    /// Transaction id of the last modification.
    pub mzxid: u64,
}

impl Stat {
    /// Create a new stat.
    pub fn new(version: u64, czxid: u64, mzxid: u64) -> Self {
        Self {
            version,
            czxid,
            mzxid,
        }
    }

    /// Check whether this stat describes a strictly newer state than `other`.
    ///
    /// Equal or older stats are stale refresh results.
    pub fn supersedes(&self, other: &Stat) -> bool {
        (self.czxid, self.version) > (other.czxid, other.version)
    }
}

/// The latest known state of one node.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    /// The node's path.
    pub path: NodePath,
    /// The node's payload, or `None` when data is not cached.
    pub data: Option<Vec<u8>>,
    /// Remote store metadata.
    pub stat: Stat,
}

impl NodeSnapshot {
    /// Create a snapshot carrying data.
    pub fn new(path: NodePath, data: Vec<u8>, stat: Stat) -> Self {
        Self {
            path,
            data: Some(data),
            stat,
        }
    }

    /// Drop the payload, keeping path and stat.
    pub fn without_data(mut self) -> Self {
        self.data = None;
        self
    }

    /// Borrow the payload bytes, if cached.
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// The node's data version.
    pub fn version(&self) -> u64 {
        self.stat.version
    }
}

impl fmt::Debug for NodeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSnapshot")
            .field("path", &self.path)
            .field(
                "data",
                &self
                    .data
                    .as_ref()
                    .map(|d| format!("[{} bytes]", d.len())),
            )
            .field("stat", &self.stat)
            .finish()
    }
}
