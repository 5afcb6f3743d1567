//! Process-local, TTL-based resolution of write shards and read groups.
//!
//! The cache maps (scope, meta) to the meta's shard directory. Entries are
//! served until `shard_cache_timeout` elapses, then refreshed from storage
//! by whichever caller observes the expiry; concurrent callers keep getting
//! the stale-but-unexpired entry. The cache is a performance layer only:
//! shard allocation stays intentionally racy across processes, and the read
//! path's merge absorbs any duplicate allocation.

use super::approximation::NodeShardApproximation;
use super::group::{build_groups, ShardEntryGroup};
use super::shard::Shard;
use crate::config::GraphConfig;
use crate::error::Result;
use crate::graph::meta::DirectedEdgeMeta;
use crate::graph::types::ApplicationScope;
use crate::serialization::EdgeSerialization;
use crate::storage::StorageBackend;
use dashmap::DashMap;
use log::{debug, info};
use std::sync::Arc;
use std::time::Instant;

struct CacheEntry {
    shards: Arc<Vec<Shard>>,
    refreshed: Instant,
}

/// TTL cache resolving (scope, meta) to the current write shard and to the
/// read shard groups; drives on-demand shard allocation.
pub struct NodeShardCache {
    serialization: EdgeSerialization,
    approximation: Arc<NodeShardApproximation>,
    config: Arc<GraphConfig>,
    entries: DashMap<String, CacheEntry>,
}

impl NodeShardCache {
    /// Create a cache over the given backend.
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        approximation: Arc<NodeShardApproximation>,
        config: Arc<GraphConfig>,
    ) -> Self {
        Self {
            serialization: EdgeSerialization::new(storage),
            approximation,
            config,
            entries: DashMap::new(),
        }
    }

    /// Resolve the shard new writes for (scope, meta) should target.
    ///
    /// When the approximate count for the current write shard has crossed
    /// `shard_size`, a fresh shard (index derived from `timestamp_ms`, kept
    /// monotonic) is allocated and persisted, and subsequent writes target
    /// it. Two processes may race here and allocate two shards; reads merge
    /// across all of them, and compaction converges the directory later.
    ///
    /// # Errors
    ///
    /// Storage failures during directory refresh or shard persistence
    /// propagate to the caller that triggered them.
    pub fn get_write_shard(
        &self,
        scope: &ApplicationScope,
        meta: &DirectedEdgeMeta,
        timestamp_ms: u64,
    ) -> Result<Shard> {
        let scope_key = scope.key_part();
        let meta_key = meta.storage_key();
        let shards = self.shards(&scope_key, &meta_key)?;
        let newest = shards[0];

        let written = self
            .approximation
            .count(&scope_key, &meta_key, newest.index);
        if written < self.config.shard_size {
            return Ok(newest);
        }

        // Shard is full: allocate the next one above it
        let index = timestamp_ms.max(newest.index + 1);
        let shard = Shard::new(index, timestamp_ms);
        self.serialization
            .write_shard_entry(&scope_key, &meta_key, &shard)?;
        info!("Allocated shard {shard} for {meta} after ~{written} edges");

        let mut updated = Vec::with_capacity(shards.len() + 1);
        updated.push(shard);
        updated.extend(shards.iter().copied());
        self.entries.insert(
            cache_key(&scope_key, &meta_key),
            CacheEntry {
                shards: Arc::new(updated),
                refreshed: Instant::now(),
            },
        );

        Ok(shard)
    }

    /// Resolve the shard groups whose union covers `[0, max_version]` for a
    /// read, newest first.
    ///
    /// # Errors
    ///
    /// Storage failures during directory refresh propagate to the caller
    /// that triggered the refresh.
    pub fn get_read_shard_groups(
        &self,
        scope: &ApplicationScope,
        _max_version: u64,
        meta: &DirectedEdgeMeta,
    ) -> Result<Vec<ShardEntryGroup>> {
        let shards = self.shards(&scope.key_part(), &meta.storage_key())?;
        Ok(build_groups(&shards))
    }

    /// Drop the cached directory for one meta, forcing the next resolution
    /// to re-read storage. Called after compaction rewrites the directory.
    pub fn invalidate(&self, scope: &ApplicationScope, meta: &DirectedEdgeMeta) {
        self.entries
            .remove(&cache_key(&scope.key_part(), &meta.storage_key()));
    }

    fn shards(&self, scope_key: &str, meta_key: &str) -> Result<Arc<Vec<Shard>>> {
        let key = cache_key(scope_key, meta_key);
        if let Some(entry) = self.entries.get(&key) {
            if entry.refreshed.elapsed() < self.config.shard_cache_timeout() {
                return Ok(entry.shards.clone());
            }
        }

        debug!("Refreshing shard directory for {key}");
        let shards = Arc::new(self.serialization.load_shard_directory(scope_key, meta_key)?);
        self.entries.insert(
            key,
            CacheEntry {
                shards: shards.clone(),
                refreshed: Instant::now(),
            },
        );
        Ok(shards)
    }
}

fn cache_key(scope_key: &str, meta_key: &str) -> String {
    format!("{scope_key}:{meta_key}")
}
