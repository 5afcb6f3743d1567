//! Asynchronous merge of a shard entry group into its newest shard.
//!
//! Compaction is the convergence mechanism for racy shard allocation: rows
//! from a group's older shards migrate into the group's write shard in
//! atomic move batches, after which the directory is rewritten so the group
//! collapses to a single compacted shard. Every step is idempotent; a crash
//! mid-merge leaves each row in exactly one shard of the same group, so the
//! read path (which always merges the whole group) never loses or
//! duplicates an edge, and a re-run completes the migration.

use super::cache::NodeShardCache;
use super::group::build_groups;
use crate::config::GraphConfig;
use crate::error::Result;
use crate::graph::meta::DirectedEdgeMeta;
use crate::graph::types::{now_millis, ApplicationScope};
use crate::serialization::{edge_shard_prefix, EdgeSerialization};
use crate::storage::{prefix_end, BatchOperation, StorageBackend};
use log::{info, warn};
use std::sync::Arc;

/// Rows moved per migration batch.
const MIGRATION_BATCH: usize = 512;

/// Audit one meta's shard directory and merge every group that is eligible.
///
/// Eligibility re-checks [`should_compact`](super::ShardEntryGroup::should_compact)
/// against a fresh directory read, so a stale audit request degrades to a
/// no-op. Returns how many groups were merged.
///
/// # Errors
///
/// Returns the first storage failure encountered; the merge is safe to
/// retry on the next audit pass.
pub fn compact_eligible(
    storage: &Arc<dyn StorageBackend>,
    config: &GraphConfig,
    scope: &ApplicationScope,
    meta: &DirectedEdgeMeta,
    cache: Option<&NodeShardCache>,
) -> Result<usize> {
    let serialization = EdgeSerialization::new(storage.clone());
    let scope_key = scope.key_part();
    let meta_key = meta.storage_key();

    let shards = serialization.load_shard_directory(&scope_key, &meta_key)?;
    let now = now_millis();
    let mut merged = 0;

    for group in build_groups(&shards) {
        if !group.should_compact(now, config) {
            continue;
        }

        let target = *group.write_shard();
        for source in group.compaction_sources() {
            migrate_shard_rows(storage, &scope_key, &meta_key, source.index, target.index)?;
        }
        serialization.commit_compaction(&scope_key, &meta_key, &group)?;
        info!(
            "Compacted {} shard(s) into {target} for {meta}",
            group.compaction_sources().len()
        );
        merged += 1;
    }

    if merged > 0 {
        if let Some(cache) = cache {
            cache.invalidate(scope, meta);
        }
    }
    Ok(merged)
}

/// Move every edge row of one shard into another, in atomic put+delete
/// batches. Re-running after a partial failure resumes where it stopped.
fn migrate_shard_rows(
    storage: &Arc<dyn StorageBackend>,
    scope_key: &str,
    meta_key: &str,
    source_index: u64,
    target_index: u64,
) -> Result<()> {
    let source_prefix = edge_shard_prefix(scope_key, meta_key, source_index);
    let target_prefix = edge_shard_prefix(scope_key, meta_key, target_index);
    let end = match prefix_end(source_prefix.as_bytes()) {
        Some(end) => end,
        None => return Ok(()),
    };

    loop {
        let rows = storage.scan_range(source_prefix.as_bytes(), &end, MIGRATION_BATCH)?;
        if rows.is_empty() {
            return Ok(());
        }

        let mut ops = Vec::with_capacity(rows.len() * 2);
        for (key, value) in rows {
            let remainder = &key[source_prefix.len()..];
            if remainder.is_empty() {
                warn!("Skipping malformed edge row key during compaction");
                continue;
            }
            let mut moved = target_prefix.clone().into_bytes();
            moved.extend_from_slice(remainder);
            ops.push(BatchOperation::Put {
                key: moved,
                value,
            });
            ops.push(BatchOperation::Delete { key });
        }
        storage.write_batch(ops)?;
    }
}
