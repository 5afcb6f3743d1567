//! Storage backend abstractions and implementations.
//!
//! This module defines the [`StorageBackend`] trait and provides implementations:
//! - [`RocksDBBackend`]: Production-ready persistent storage
//! - [`MemoryBackend`]: In-memory storage for testing
//!
//! The graph layer only relies on the contracts here: lexicographically
//! ordered bounded range scans, and atomic multi-row write batches. Any
//! column-family engine that upholds them can sit behind the trait.

mod memory;
#[cfg(feature = "rocksdb-backend")]
mod rocksdb_backend;

pub use memory::MemoryBackend;
#[cfg(feature = "rocksdb-backend")]
pub use rocksdb_backend::RocksDBBackend;

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Key-value pair for storage operations.
pub type KeyValue = (Vec<u8>, Vec<u8>);

/// Trait defining the storage backend interface.
///
/// All operations take `&self`: backends are shared across request threads
/// and background workers, so mutation goes through interior mutability.
/// Implementations must ensure atomic batch operations and keys ordered by
/// unsigned byte comparison.
pub trait StorageBackend: Send + Sync {
    /// Store a key-value pair.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Storage`](crate::GraphError::Storage) if the write fails.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Retrieve a value by key.
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Storage`](crate::GraphError::Storage) if the read fails.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Delete a key-value pair.
    ///
    /// Does not error if the key doesn't exist (idempotent).
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Storage`](crate::GraphError::Storage) if the delete fails.
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Return all key-value pairs whose keys start with the given prefix, in
    /// ascending key order.
    ///
    /// Intended for small metadata ranges (shard directories); paged data
    /// reads go through [`scan_range`](Self::scan_range).
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Storage`](crate::GraphError::Storage) if iteration fails.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KeyValue>>;

    /// Return up to `limit` key-value pairs with `start <= key < end`, in
    /// ascending key order.
    ///
    /// This is the paged read primitive: callers resume by passing the
    /// successor of the last key they consumed as the next `start`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Storage`](crate::GraphError::Storage) if iteration fails.
    fn scan_range(&self, start: &[u8], end: &[u8], limit: usize) -> Result<Vec<KeyValue>>;

    /// Execute a batch of write operations atomically.
    ///
    /// Either all operations succeed or none do.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Storage`](crate::GraphError::Storage) if any operation fails.
    fn write_batch(&self, operations: Vec<BatchOperation>) -> Result<()>;

    /// Flush any buffered writes to disk.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Storage`](crate::GraphError::Storage) if flush fails.
    fn flush(&self) -> Result<()>;
}

/// Batch write operation for atomic updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BatchOperation {
    /// Put a key-value pair
    Put {
        /// Key to write
        key: Vec<u8>,
        /// Value to write
        value: Vec<u8>,
    },
    /// Delete a key
    Delete {
        /// Key to delete
        key: Vec<u8>,
    },
}

/// Compute the smallest key strictly greater than every key with the given
/// prefix, for use as an exclusive range end.
///
/// Returns `None` if no such key exists (prefix is all `0xFF`), in which case
/// callers should scan to the end of the keyspace.
pub(crate) fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.last_mut() {
        if *last < 0xFF {
            *last += 1;
            return Some(end);
        }
        end.pop();
    }
    None
}

/// Successor of a key: the smallest key strictly greater than `key`.
pub(crate) fn key_after(key: &[u8]) -> Vec<u8> {
    let mut next = key.to_vec();
    next.push(0);
    next
}
