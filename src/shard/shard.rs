//! Shard metadata: a time-bounded slice of one adjacency list.

use serde::{Deserialize, Serialize};

/// A time-bounded partition of one node's adjacency list for one
/// [`DirectedEdgeMeta`](crate::DirectedEdgeMeta).
///
/// The shard index is derived from creation time and grows monotonically
/// within a directory; index 0 ([`Shard::MIN`]) always exists as the default
/// partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    /// Monotonic shard id derived from creation time (epoch ms)
    pub index: u64,
    /// Creation time, epoch ms
    pub created: u64,
    /// True once this shard holds the merged rows of everything older
    pub compacted: bool,
}

impl Shard {
    /// The default partition; present in every shard directory.
    pub const MIN: Shard = Shard {
        index: 0,
        created: 0,
        compacted: false,
    };

    /// Create a new uncompacted shard.
    pub fn new(index: u64, created: u64) -> Self {
        Self {
            index,
            created,
            compacted: false,
        }
    }

    /// True for the always-present default partition.
    pub fn is_min(&self) -> bool {
        self.index == 0
    }
}

impl std::fmt::Display for Shard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Shard({}, created={}, compacted={})",
            self.index, self.created, self.compacted
        )
    }
}
