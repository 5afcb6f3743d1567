//! Approximate, batched counting of edges written per shard.
//!
//! The counter decides when a shard is "full" and a new one should be
//! allocated. It is intentionally approximate: increments buffer in memory
//! and flush to storage every `counter_flush_count` edges, flush failures
//! are logged and retried on the next flush, and concurrent writers may
//! briefly under- or over-count. It is a performance signal, never a source
//! of consistency.

use crate::config::GraphConfig;
use crate::serialization::counter_key;
use crate::storage::StorageBackend;
use dashmap::DashMap;
use log::warn;
use std::sync::Arc;

/// Approximate edge counter per (scope, meta, shard).
pub struct NodeShardApproximation {
    storage: Arc<dyn StorageBackend>,
    flush_count: u64,
    /// Increments not yet flushed to storage
    pending: DashMap<String, u64>,
    /// Last known flushed value per counter row
    stored: DashMap<String, u64>,
}

impl NodeShardApproximation {
    /// Create a counter over the given backend.
    pub fn new(storage: Arc<dyn StorageBackend>, config: &GraphConfig) -> Self {
        Self {
            storage,
            flush_count: config.counter_flush_count.max(1),
            pending: DashMap::new(),
            stored: DashMap::new(),
        }
    }

    /// Record one edge written to the given shard.
    pub fn increment(&self, scope_key: &str, meta_key: &str, shard_index: u64) {
        let key = counter_key(scope_key, meta_key, shard_index);
        let buffered = {
            let mut entry = self.pending.entry(key.clone()).or_insert(0);
            *entry += 1;
            *entry
        };
        if buffered >= self.flush_count {
            self.flush(&key);
        }
    }

    /// Approximate number of edges written to the given shard: last flushed
    /// value plus whatever is buffered locally.
    pub fn count(&self, scope_key: &str, meta_key: &str, shard_index: u64) -> u64 {
        let key = counter_key(scope_key, meta_key, shard_index);
        let stored = self.stored_value(&key);
        let buffered = self.pending.get(&key).map(|v| *v).unwrap_or(0);
        stored + buffered
    }

    fn stored_value(&self, key: &str) -> u64 {
        if let Some(value) = self.stored.get(key) {
            return *value;
        }
        let loaded = match self.storage.get(key.as_bytes()) {
            Ok(Some(value)) => serde_json::from_slice(&value).unwrap_or(0),
            Ok(None) => 0,
            Err(e) => {
                // Approximate by design: treat unreadable as zero
                warn!("Failed to load shard counter {key}: {e}");
                0
            }
        };
        self.stored.insert(key.to_string(), loaded);
        loaded
    }

    fn flush(&self, key: &str) {
        let buffered = match self.pending.remove(key) {
            Some((_, v)) => v,
            None => return,
        };
        let total = self.stored_value(key) + buffered;
        let value = match serde_json::to_vec(&total) {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to encode shard counter {key}: {e}");
                return;
            }
        };
        match self.storage.put(key.as_bytes(), &value) {
            Ok(()) => {
                self.stored.insert(key.to_string(), total);
            }
            Err(e) => {
                // Put the increments back; the next flush retries
                warn!("Failed to flush shard counter {key}: {e}");
                *self.pending.entry(key.to_string()).or_insert(0) += buffered;
            }
        }
    }
}
