//! # shardgraph
//!
//! A multi-tenant, horizontally-sharded, versioned directed-edge graph store
//! built on a lexicographically ordered key-value backend.
//!
//! ## Core Principles
//!
//! - **Online Partitioning**: adjacency lists split into time-ordered shards
//!   on demand and converge back through background compaction, with no
//!   offline step and no lost or duplicated edges
//! - **Racy By Design**: no distributed lock; concurrent shard allocation is
//!   tolerated because every read merges across whatever shards exist
//! - **Lazy Reads**: all reads are pull-driven paged iterators with exclusive
//!   resume cursors and an SLA breaker
//! - **Tombstones Over Rewrites**: soft delete marks edges and nodes; a
//!   background sweep performs the physical removal
//!
//! ## Architecture
//!
//! ```text
//! GraphManager (scoped façade)
//!     ↓
//! EdgeStream / NameStream (merge, dedup, paging, SLA breaker)
//!     ↓
//! NodeShardCache + NodeShardApproximation (shard resolution)
//!     ↓
//! EdgeSerialization (row encoding, atomic batches)
//!     ↓
//! Storage Backend (RocksDB, memory)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use shardgraph::{
//!     ApplicationScope, Edge, GraphConfig, GraphManagerFactory, Id, SearchByEdgeType,
//! };
//!
//! let factory = GraphManagerFactory::in_memory(GraphConfig::default());
//! let scope = ApplicationScope::new(Id::generate("application"));
//! let graph = factory.for_scope(scope).unwrap();
//!
//! let user = Id::generate("user");
//! let post = Id::generate("post");
//! graph
//!     .write_edge(Edge::new(user.clone(), "likes", post, 100))
//!     .unwrap();
//!
//! let likes: Vec<_> = graph
//!     .load_edges_from_source(SearchByEdgeType::new(user, "likes", u64::MAX))
//!     .unwrap()
//!     .collect::<Result<_, _>>()
//!     .unwrap();
//! assert_eq!(likes.len(), 1);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod graph;
mod maintenance;
mod serialization;
pub mod shard;
pub mod storage;
pub mod stream;

// Re-export main types
pub use config::GraphConfig;
pub use error::{GraphError, Result};
pub use graph::{
    ApplicationScope, DirectedEdgeMeta, Edge, EdgeDirection, GraphManager, GraphManagerFactory,
    Id, MarkedEdge, SearchByEdge, SearchByEdgeType, SearchByIdType, SearchEdgeType, SearchIdType,
};
pub use shard::{Shard, ShardEntryGroup};
pub use storage::{BatchOperation, MemoryBackend, StorageBackend};
#[cfg(feature = "rocksdb-backend")]
pub use storage::RocksDBBackend;
pub use stream::{EdgeStream, NameStream};
