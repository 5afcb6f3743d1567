//! Tuning knobs for shard allocation, caching, compaction and read SLAs.

use serde::Deserialize;
use std::time::Duration;

/// Configuration surface for the graph store.
///
/// Passed explicitly to [`GraphManagerFactory`](crate::GraphManagerFactory);
/// there is no global configuration singleton.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Approximate maximum number of edges per shard before a new shard is
    /// allocated for subsequent writes.
    pub shard_size: u64,

    /// TTL in milliseconds for cached shard directories. A cache entry never
    /// serves a shard set older than this past its refresh.
    pub shard_cache_timeout_ms: u64,

    /// Minimum age in milliseconds of a group's newest shard before the group
    /// becomes eligible for compaction.
    pub shard_min_delta_ms: u64,

    /// Number of counted edges buffered in memory before the approximate
    /// shard counter is flushed to storage.
    pub counter_flush_count: u64,

    /// Read SLA in milliseconds enforced by the stream breaker. A stream
    /// polled past this deadline yields a single timeout error and stops.
    pub read_timeout_ms: u64,

    /// Number of rows fetched from storage per page on the read path.
    pub page_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            shard_size: 10_000,
            shard_cache_timeout_ms: 30_000,
            shard_min_delta_ms: 60_000,
            counter_flush_count: 100,
            read_timeout_ms: 10_000,
            page_size: 1_000,
        }
    }
}

impl GraphConfig {
    /// Shard cache TTL as a [`Duration`].
    pub fn shard_cache_timeout(&self) -> Duration {
        Duration::from_millis(self.shard_cache_timeout_ms)
    }

    /// Read SLA as a [`Duration`].
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}
