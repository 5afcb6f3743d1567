//! Shard entry groups and the compaction state machine.
//!
//! A [`ShardEntryGroup`] is the set of shards whose rows must currently be
//! merged to answer a read for one meta. Groups move monotonically through
//! OPEN → COMPACTION_PENDING → COMPACTED: once more than one shard
//! accumulates, the group is pending; once the newest shard is old enough
//! that no process can still cache a pre-merge write target, the merge may
//! proceed and the group collapses back to a single (compacted) shard.

use super::shard::Shard;
use crate::config::GraphConfig;

/// An ordered set of shards (newest first) answering one meta's reads,
/// plus its compaction state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardEntryGroup {
    shards: Vec<Shard>,
}

impl ShardEntryGroup {
    /// Build a group from shards sorted by descending index.
    ///
    /// Callers normally get groups from [`build_groups`]; this is public for
    /// tests and diagnostics.
    pub fn new(shards: Vec<Shard>) -> Self {
        debug_assert!(!shards.is_empty());
        debug_assert!(shards.windows(2).all(|w| w[0].index > w[1].index));
        Self { shards }
    }

    /// The shard new writes for this group target: the newest one.
    pub fn write_shard(&self) -> &Shard {
        &self.shards[0]
    }

    /// All shards that must be merged to answer a read, newest first.
    pub fn read_shards(&self) -> &[Shard] {
        &self.shards
    }

    /// True while this group still spans multiple shards and therefore has a
    /// merge outstanding.
    pub fn is_compaction_pending(&self) -> bool {
        self.shards.len() > 1
    }

    /// True once the merge may actually run: the group is pending and the
    /// newest shard has aged past `shard_min_delta` plus one full cache-TTL
    /// cycle, so no process can still hold a cached pre-merge write target.
    pub fn should_compact(&self, now_ms: u64, config: &GraphConfig) -> bool {
        if !self.is_compaction_pending() {
            return false;
        }
        let safe_after = self
            .write_shard()
            .created
            .saturating_add(config.shard_min_delta_ms)
            .saturating_add(config.shard_cache_timeout_ms);
        now_ms >= safe_after
    }

    /// The shards whose rows the merge migrates into the write shard.
    pub(crate) fn compaction_sources(&self) -> &[Shard] {
        &self.shards[1..]
    }
}

/// Partition a shard directory (sorted by descending index, ending with
/// [`Shard::MIN`]) into its entry groups.
///
/// Walking newest to oldest, a run of uncompacted shards is terminated by
/// the first compacted shard below it: a compacted shard is self-contained,
/// so nothing older contributes to reads above it.
pub fn build_groups(shards: &[Shard]) -> Vec<ShardEntryGroup> {
    let mut groups = Vec::new();
    let mut current: Vec<Shard> = Vec::new();

    for shard in shards {
        current.push(*shard);
        if shard.compacted {
            groups.push(ShardEntryGroup::new(std::mem::take(&mut current)));
        }
    }

    if !current.is_empty() {
        groups.push(ShardEntryGroup::new(current));
    }

    groups
}
