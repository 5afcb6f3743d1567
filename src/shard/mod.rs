//! Online partition management for adjacency lists.
//!
//! Each (scope, [`DirectedEdgeMeta`](crate::DirectedEdgeMeta)) owns an
//! independent series of [`Shard`]s created on demand as its adjacency list
//! grows, resolved through the TTL-based [`NodeShardCache`], counted by the
//! approximate [`NodeShardApproximation`], and eventually converged back to
//! a single shard by [`compaction`].

mod approximation;
mod cache;
pub mod compaction;
mod group;
mod shard;

pub use approximation::NodeShardApproximation;
pub use cache::NodeShardCache;
pub use group::{build_groups, ShardEntryGroup};
pub use shard::Shard;
