//! Physical read/write of edge rows against the backing store.
//!
//! Rows live in a single lexicographically ordered keyspace under typed
//! prefixes. Version fields are stored inverted (`u64::MAX - v`) and
//! fixed-width hex-encoded, so an ascending key scan yields versions in
//! descending numeric order without reverse iterators.
//!
//! Row families:
//! - `shards:{scope}:{meta}:{rev index}` — shard directory per meta
//! - `edges:{scope}:{meta}:{shard}:{rev version}:{peer}` — adjacency rows
//! - `versions:{scope}:{source}:{type}:{target}:{rev version}` — per-logical-edge version index
//! - `types:{scope}:{dir}:{node}:{type}` — distinct edge-type registry
//! - `idtypes:{scope}:{dir}:{node}:{type}:{peer type}` — distinct peer-type registry
//! - `marks:{scope}:{node}` — node-level tombstones
//! - `counts:{scope}:{meta}:{shard}` — flushed approximate counters

use crate::error::{GraphError, Result};
use crate::graph::meta::{DirectedEdgeMeta, EdgeDirection};
use crate::graph::types::{escape_key_part, ApplicationScope, Edge, Id, MarkedEdge};
use crate::shard::{Shard, ShardEntryGroup};
use crate::storage::{prefix_end, BatchOperation, StorageBackend};
use log::trace;
use std::sync::Arc;

/// Inverted version: ascending lexicographic order of the encoding equals
/// descending numeric order of the value.
pub(crate) fn rev(v: u64) -> u64 {
    u64::MAX - v
}

pub(crate) fn shard_dir_prefix(scope_key: &str, meta_key: &str) -> String {
    format!("shards:{scope_key}:{meta_key}:")
}

pub(crate) fn shard_dir_key(scope_key: &str, meta_key: &str, index: u64) -> String {
    format!("{}{:016x}", shard_dir_prefix(scope_key, meta_key), rev(index))
}

pub(crate) fn edge_shard_prefix(scope_key: &str, meta_key: &str, shard_index: u64) -> String {
    format!("edges:{scope_key}:{meta_key}:{shard_index:016x}:")
}

pub(crate) fn edge_row_key(
    scope_key: &str,
    meta_key: &str,
    shard_index: u64,
    version: u64,
    peer: &Id,
) -> String {
    format!(
        "{}{:016x}:{}",
        edge_shard_prefix(scope_key, meta_key, shard_index),
        rev(version),
        peer.key_part()
    )
}

/// Inclusive scan start covering all rows with version <= `max_version`
/// within one shard.
pub(crate) fn edge_version_start(
    scope_key: &str,
    meta_key: &str,
    shard_index: u64,
    max_version: u64,
) -> String {
    format!(
        "{}{:016x}",
        edge_shard_prefix(scope_key, meta_key, shard_index),
        rev(max_version)
    )
}

pub(crate) fn version_row_prefix(scope_key: &str, source: &Id, edge_type: &str, target: &Id) -> String {
    format!(
        "versions:{scope_key}:{}:{}:{}:",
        source.key_part(),
        escape_key_part(edge_type),
        target.key_part()
    )
}

pub(crate) fn version_row_key(scope_key: &str, edge: &Edge) -> String {
    format!(
        "{}{:016x}",
        version_row_prefix(scope_key, &edge.source, &edge.edge_type, &edge.target),
        rev(edge.version)
    )
}

pub(crate) fn type_registry_prefix(scope_key: &str, direction: EdgeDirection, node: &Id) -> String {
    format!(
        "types:{scope_key}:{}:{}:",
        direction.key_part(),
        node.key_part()
    )
}

pub(crate) fn type_registry_key(
    scope_key: &str,
    direction: EdgeDirection,
    node: &Id,
    edge_type: &str,
) -> String {
    format!(
        "{}{}",
        type_registry_prefix(scope_key, direction, node),
        escape_key_part(edge_type)
    )
}

pub(crate) fn id_type_registry_prefix(
    scope_key: &str,
    direction: EdgeDirection,
    node: &Id,
    edge_type: &str,
) -> String {
    format!(
        "idtypes:{scope_key}:{}:{}:{}:",
        direction.key_part(),
        node.key_part(),
        escape_key_part(edge_type)
    )
}

pub(crate) fn id_type_registry_key(
    scope_key: &str,
    direction: EdgeDirection,
    node: &Id,
    edge_type: &str,
    peer_type: &str,
) -> String {
    format!(
        "{}{}",
        id_type_registry_prefix(scope_key, direction, node, edge_type),
        escape_key_part(peer_type)
    )
}

pub(crate) fn node_mark_key(scope_key: &str, node: &Id) -> String {
    format!("marks:{scope_key}:{}", node.key_part())
}

pub(crate) fn counter_key(scope_key: &str, meta_key: &str, shard_index: u64) -> String {
    format!("counts:{scope_key}:{meta_key}:{shard_index:016x}")
}

pub(crate) fn decode_marked_edge(value: &[u8]) -> Result<MarkedEdge> {
    serde_json::from_slice(value)
        .map_err(|e| GraphError::serialization("Failed to deserialize edge row", Some(e)))
}

fn encode_marked_edge(edge: &MarkedEdge) -> Result<Vec<u8>> {
    serde_json::to_vec(edge)
        .map_err(|e| GraphError::serialization("Failed to serialize edge row", Some(e)))
}

fn decode_shard(value: &[u8]) -> Result<Shard> {
    serde_json::from_slice(value)
        .map_err(|e| GraphError::serialization("Failed to deserialize shard entry", Some(e)))
}

/// Physical persistence of edges, scoped to the shards it is handed.
///
/// All multi-row mutations go through a single atomic batch, which is the
/// storage boundary contract the read path's merge relies on: an edge is
/// either present in all of its index rows or in none.
#[derive(Clone)]
pub struct EdgeSerialization {
    storage: Arc<dyn StorageBackend>,
}

impl EdgeSerialization {
    /// Create a serializer over the given backend.
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// Persist one (possibly tombstoned) edge row set atomically: four
    /// adjacency rows in their resolved write shards, the version-index row,
    /// and the type registry rows.
    pub(crate) fn write_edge_rows(
        &self,
        scope: &ApplicationScope,
        marked: &MarkedEdge,
        targets: &[(DirectedEdgeMeta, Shard)],
    ) -> Result<()> {
        let scope_key = scope.key_part();
        let value = encode_marked_edge(marked)?;
        let edge = &marked.edge;
        let mut ops = Vec::with_capacity(targets.len() + 5);

        for (meta, shard) in targets {
            let key = edge_row_key(
                &scope_key,
                &meta.storage_key(),
                shard.index,
                edge.version,
                edge.peer(meta.direction),
            );
            ops.push(BatchOperation::Put {
                key: key.into_bytes(),
                value: value.clone(),
            });
        }

        ops.push(BatchOperation::Put {
            key: version_row_key(&scope_key, edge).into_bytes(),
            value: value.clone(),
        });

        // Distinct-type registries; idempotent re-puts on every write.
        // Keys carry the escaped name, values the raw name for enumeration.
        ops.push(BatchOperation::Put {
            key: type_registry_key(
                &scope_key,
                EdgeDirection::FromSource,
                &edge.source,
                &edge.edge_type,
            )
            .into_bytes(),
            value: edge.edge_type.clone().into_bytes(),
        });
        ops.push(BatchOperation::Put {
            key: type_registry_key(
                &scope_key,
                EdgeDirection::ToTarget,
                &edge.target,
                &edge.edge_type,
            )
            .into_bytes(),
            value: edge.edge_type.clone().into_bytes(),
        });
        ops.push(BatchOperation::Put {
            key: id_type_registry_key(
                &scope_key,
                EdgeDirection::FromSource,
                &edge.source,
                &edge.edge_type,
                &edge.target.node_type,
            )
            .into_bytes(),
            value: edge.target.node_type.clone().into_bytes(),
        });
        ops.push(BatchOperation::Put {
            key: id_type_registry_key(
                &scope_key,
                EdgeDirection::ToTarget,
                &edge.target,
                &edge.edge_type,
                &edge.source.node_type,
            )
            .into_bytes(),
            value: edge.source.node_type.clone().into_bytes(),
        });

        self.storage.write_batch(ops)?;
        trace!("Persisted edge rows for {edge}");
        Ok(())
    }

    /// Read the version-index row for one exact (source, type, target, version).
    pub(crate) fn read_version_row(
        &self,
        scope: &ApplicationScope,
        edge: &Edge,
    ) -> Result<Option<MarkedEdge>> {
        let key = version_row_key(&scope.key_part(), edge);
        match self.storage.get(key.as_bytes())? {
            Some(value) => Ok(Some(decode_marked_edge(&value)?)),
            None => Ok(None),
        }
    }

    /// Physically remove every index row of one edge version.
    ///
    /// The adjacency row may live in any shard of each meta's directory, so
    /// deletes are issued for every shard; extra deletes are no-ops. Type
    /// registry rows are dropped only once a bounded existence check
    /// confirms no edge of that type remains.
    pub(crate) fn delete_edge_rows(&self, scope: &ApplicationScope, edge: &Edge) -> Result<()> {
        let scope_key = scope.key_part();
        let mut ops = Vec::new();

        for meta in DirectedEdgeMeta::for_edge(edge) {
            let meta_key = meta.storage_key();
            for shard in self.load_shard_directory(&scope_key, &meta_key)? {
                let key = edge_row_key(
                    &scope_key,
                    &meta_key,
                    shard.index,
                    edge.version,
                    edge.peer(meta.direction),
                );
                ops.push(BatchOperation::Delete {
                    key: key.into_bytes(),
                });
            }
        }

        ops.push(BatchOperation::Delete {
            key: version_row_key(&scope_key, edge).into_bytes(),
        });

        self.storage.write_batch(ops)?;
        self.cleanup_type_registries(scope, edge)?;
        trace!("Deleted edge rows for {edge}");
        Ok(())
    }

    /// Drop registry rows whose last edge just went away.
    fn cleanup_type_registries(&self, scope: &ApplicationScope, edge: &Edge) -> Result<()> {
        let scope_key = scope.key_part();
        let checks = [
            (
                DirectedEdgeMeta::from_source(edge.source.clone(), edge.edge_type.clone()),
                type_registry_key(
                    &scope_key,
                    EdgeDirection::FromSource,
                    &edge.source,
                    &edge.edge_type,
                ),
            ),
            (
                DirectedEdgeMeta::to_target(edge.target.clone(), edge.edge_type.clone()),
                type_registry_key(
                    &scope_key,
                    EdgeDirection::ToTarget,
                    &edge.target,
                    &edge.edge_type,
                ),
            ),
            (
                DirectedEdgeMeta::from_source_by_type(
                    edge.source.clone(),
                    edge.edge_type.clone(),
                    edge.target.node_type.clone(),
                ),
                id_type_registry_key(
                    &scope_key,
                    EdgeDirection::FromSource,
                    &edge.source,
                    &edge.edge_type,
                    &edge.target.node_type,
                ),
            ),
            (
                DirectedEdgeMeta::to_target_by_type(
                    edge.target.clone(),
                    edge.edge_type.clone(),
                    edge.source.node_type.clone(),
                ),
                id_type_registry_key(
                    &scope_key,
                    EdgeDirection::ToTarget,
                    &edge.target,
                    &edge.edge_type,
                    &edge.source.node_type,
                ),
            ),
        ];

        for (meta, registry_key) in checks {
            if !self.has_any_edge(&scope_key, &meta.storage_key())? {
                self.storage.delete(registry_key.as_bytes())?;
            }
        }
        Ok(())
    }

    /// Bounded check: does any adjacency row exist for this meta, in any shard?
    fn has_any_edge(&self, scope_key: &str, meta_key: &str) -> Result<bool> {
        let prefix = format!("edges:{scope_key}:{meta_key}:");
        let end = match prefix_end(prefix.as_bytes()) {
            Some(end) => end,
            None => return Ok(false),
        };
        Ok(!self
            .storage
            .scan_range(prefix.as_bytes(), &end, 1)?
            .is_empty())
    }

    /// Load the shard directory for one meta, newest first.
    ///
    /// [`Shard::MIN`] is implicit: it is appended if no index-0 entry is
    /// stored, so every directory has at least one shard.
    pub(crate) fn load_shard_directory(
        &self,
        scope_key: &str,
        meta_key: &str,
    ) -> Result<Vec<Shard>> {
        let prefix = shard_dir_prefix(scope_key, meta_key);
        let rows = self.storage.scan_prefix(prefix.as_bytes())?;

        let mut shards = Vec::with_capacity(rows.len() + 1);
        for (_, value) in rows {
            shards.push(decode_shard(&value)?);
        }
        if shards.last().map(|s| s.index != 0).unwrap_or(true) {
            shards.push(Shard::MIN);
        }
        Ok(shards)
    }

    /// Persist one shard directory entry.
    pub(crate) fn write_shard_entry(
        &self,
        scope_key: &str,
        meta_key: &str,
        shard: &Shard,
    ) -> Result<()> {
        let key = shard_dir_key(scope_key, meta_key, shard.index);
        let value = serde_json::to_vec(shard)
            .map_err(|e| GraphError::serialization("Failed to serialize shard entry", Some(e)))?;
        self.storage.put(key.as_bytes(), &value)
    }

    /// Rewrite the directory after a merge: the target becomes compacted,
    /// the migrated source entries disappear, atomically.
    pub(crate) fn commit_compaction(
        &self,
        scope_key: &str,
        meta_key: &str,
        group: &ShardEntryGroup,
    ) -> Result<()> {
        let mut target = *group.write_shard();
        target.compacted = true;
        let value = serde_json::to_vec(&target)
            .map_err(|e| GraphError::serialization("Failed to serialize shard entry", Some(e)))?;

        let mut ops = vec![BatchOperation::Put {
            key: shard_dir_key(scope_key, meta_key, target.index).into_bytes(),
            value,
        }];
        for source in group.compaction_sources() {
            ops.push(BatchOperation::Delete {
                key: shard_dir_key(scope_key, meta_key, source.index).into_bytes(),
            });
            ops.push(BatchOperation::Delete {
                key: counter_key(scope_key, meta_key, source.index).into_bytes(),
            });
        }
        self.storage.write_batch(ops)
    }

    /// Write a node-level tombstone.
    pub(crate) fn write_node_mark(
        &self,
        scope: &ApplicationScope,
        node: &Id,
        timestamp: u64,
    ) -> Result<()> {
        let key = node_mark_key(&scope.key_part(), node);
        let value = serde_json::to_vec(&timestamp)
            .map_err(|e| GraphError::serialization("Failed to serialize node mark", Some(e)))?;
        self.storage.put(key.as_bytes(), &value)
    }

    /// Read a node-level tombstone timestamp, if any.
    pub(crate) fn read_node_mark(
        &self,
        scope_key: &str,
        node: &Id,
    ) -> Result<Option<u64>> {
        let key = node_mark_key(scope_key, node);
        match self.storage.get(key.as_bytes())? {
            Some(value) => serde_json::from_slice(&value)
                .map(Some)
                .map_err(|e| GraphError::serialization("Failed to deserialize node mark", Some(e))),
            None => Ok(None),
        }
    }
}
