//! The graph façade: scoped edge writes, tombstones, deletes and paged reads.

use crate::config::GraphConfig;
use crate::error::{GraphError, Result};
use crate::graph::meta::{DirectedEdgeMeta, EdgeDirection};
use crate::graph::types::{
    now_millis, validate_id, ApplicationScope, Edge, Id, MarkedEdge, SearchByEdge,
    SearchByEdgeType, SearchByIdType, SearchEdgeType, SearchIdType,
};
use crate::maintenance::{MaintenanceWorker, Task};
use crate::serialization::{id_type_registry_prefix, type_registry_prefix, EdgeSerialization};
use crate::shard::{NodeShardApproximation, NodeShardCache};
use crate::storage::{MemoryBackend, StorageBackend};
use crate::stream::{EdgeStream, NameStream};
use log::{debug, info};
use std::sync::mpsc::Sender;
use std::sync::Arc;

/// Shared infrastructure behind every [`GraphManager`]: one storage backend,
/// one shard cache, one approximate counter and one maintenance worker.
///
/// Dropping the factory shuts the maintenance worker down after it drains
/// its queue; managers created from it stay usable but stop enqueueing
/// background work.
pub struct GraphManagerFactory {
    storage: Arc<dyn StorageBackend>,
    config: Arc<GraphConfig>,
    approximation: Arc<NodeShardApproximation>,
    cache: Arc<NodeShardCache>,
    worker: MaintenanceWorker,
}

impl GraphManagerFactory {
    /// Create a factory over an already-opened backend.
    pub fn new(storage: Arc<dyn StorageBackend>, config: GraphConfig) -> Self {
        let config = Arc::new(config);
        let approximation = Arc::new(NodeShardApproximation::new(storage.clone(), &config));
        let cache = Arc::new(NodeShardCache::new(
            storage.clone(),
            approximation.clone(),
            config.clone(),
        ));
        let worker = MaintenanceWorker::spawn(storage.clone(), config.clone(), cache.clone());
        info!("Graph manager factory initialized");
        Self {
            storage,
            config,
            approximation,
            cache,
            worker,
        }
    }

    /// Open a RocksDB-backed factory at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Storage`] if the database cannot be opened.
    #[cfg(feature = "rocksdb-backend")]
    pub fn open(path: impl AsRef<std::path::Path>, config: GraphConfig) -> Result<Self> {
        let backend = crate::storage::RocksDBBackend::open(path)?;
        Ok(Self::new(Arc::new(backend), config))
    }

    /// Create a factory over a fresh in-memory backend.
    pub fn in_memory(config: GraphConfig) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), config)
    }

    /// Create a manager bound to one tenant scope.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Validation`] if the scope's application id is
    /// nil or untyped.
    pub fn for_scope(&self, scope: ApplicationScope) -> Result<GraphManager> {
        scope.validate()?;
        Ok(GraphManager {
            storage: self.storage.clone(),
            serialization: EdgeSerialization::new(self.storage.clone()),
            config: self.config.clone(),
            approximation: self.approximation.clone(),
            cache: self.cache.clone(),
            tasks: self.worker.sender(),
            scope,
        })
    }
}

/// Tenant-scoped graph operations.
///
/// Every row a manager touches is keyed under its [`ApplicationScope`];
/// managers of different scopes can never observe each other's edges.
/// Cheap to create, one per scope per request if desired.
pub struct GraphManager {
    storage: Arc<dyn StorageBackend>,
    serialization: EdgeSerialization,
    config: Arc<GraphConfig>,
    approximation: Arc<NodeShardApproximation>,
    cache: Arc<NodeShardCache>,
    tasks: Sender<Task>,
    scope: ApplicationScope,
}

impl GraphManager {
    /// The scope this manager is bound to.
    pub fn scope(&self) -> &ApplicationScope {
        &self.scope
    }

    /// Write one edge: four adjacency rows in their current write shards,
    /// the version-index row and the type registries, atomically.
    ///
    /// Writing the same (source, type, target, version) again is an
    /// idempotent overwrite. A higher version on an existing logical key
    /// becomes the version reads deduplicate to.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Validation`] before any I/O if a field is
    /// missing, and [`GraphError::Storage`] if persistence fails.
    pub fn write_edge(&self, edge: Edge) -> Result<Edge> {
        edge.validate()?;
        let now = now_millis();

        let mut targets = Vec::with_capacity(4);
        for meta in DirectedEdgeMeta::for_edge(&edge) {
            let shard = self.cache.get_write_shard(&self.scope, &meta, now)?;
            targets.push((meta, shard));
        }

        self.serialization
            .write_edge_rows(&self.scope, &MarkedEdge::active(edge.clone()), &targets)?;

        let scope_key = self.scope.key_part();
        for (meta, shard) in &targets {
            self.approximation
                .increment(&scope_key, &meta.storage_key(), shard.index);
        }

        debug!("Wrote {edge}");
        Ok(edge)
    }

    /// Soft-delete one edge version with a tombstone.
    ///
    /// Idempotent: marking an already-marked edge returns the existing
    /// tombstone unchanged. The live adjacency row may sit in any shard of
    /// each meta's directory, so the tombstone is rewritten onto every
    /// shard; compaction migrates the tombstone like any other row. Marking
    /// is the required precursor to [`delete_edge`](Self::delete_edge).
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Validation`] before any I/O if a field is
    /// missing, and [`GraphError::Storage`] if persistence fails.
    pub fn mark_edge(&self, edge: Edge) -> Result<MarkedEdge> {
        edge.validate()?;

        if let Some(existing) = self.serialization.read_version_row(&self.scope, &edge)? {
            if existing.deleted {
                return Ok(existing);
            }
        }

        let now = now_millis();
        let marked = MarkedEdge::tombstone(edge, now);
        let scope_key = self.scope.key_part();
        let mut targets = Vec::new();
        for meta in DirectedEdgeMeta::for_edge(&marked.edge) {
            let shards = self
                .serialization
                .load_shard_directory(&scope_key, &meta.storage_key())?;
            for shard in shards {
                targets.push((meta.clone(), shard));
            }
        }
        self.serialization
            .write_edge_rows(&self.scope, &marked, &targets)?;

        debug!("Marked {}", marked.edge);
        Ok(marked)
    }

    /// Tombstone a node: every edge touching it with version at or below
    /// `timestamp` becomes invisible to subsequent reads. A single row
    /// write; no per-edge rewrite happens.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Validation`] for a nil or untyped node id, and
    /// [`GraphError::Storage`] if persistence fails.
    pub fn mark_node(&self, node: Id, timestamp: u64) -> Result<Id> {
        validate_id(&node, "node")?;
        self.serialization
            .write_node_mark(&self.scope, &node, timestamp)?;
        debug!("Marked node {node} at {timestamp}");
        Ok(node)
    }

    /// Physically remove every index row of one previously marked edge
    /// version. The removal itself runs on the maintenance worker; this
    /// call only verifies the precondition and enqueues it.
    ///
    /// Idempotent: deleting an edge whose rows are already gone is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvalidOperation`] if the edge exists and has
    /// not been marked, [`GraphError::Validation`] for malformed input, and
    /// [`GraphError::Storage`] if the precondition read fails.
    pub fn delete_edge(&self, edge: Edge) -> Result<()> {
        edge.validate()?;

        match self.serialization.read_version_row(&self.scope, &edge)? {
            None => Ok(()), // already swept
            Some(row) if !row.deleted => Err(GraphError::invalid_operation(format!(
                "edge {edge} must be marked before deletion"
            ))),
            Some(_) => {
                self.tasks
                    .send(Task::DeleteEdge {
                        scope: self.scope.clone(),
                        edge,
                    })
                    .map_err(|_| {
                        GraphError::invalid_operation("maintenance worker is shut down")
                    })
            }
        }
    }

    /// Stream every stored version of one logical edge, newest first,
    /// tombstoned versions included and no deduplication applied.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Validation`] for malformed input; storage
    /// failures surface through the stream.
    pub fn load_edge_versions(&self, search: SearchByEdge) -> Result<EdgeStream> {
        validate_id(&search.source, "source")?;
        validate_id(&search.target, "target")?;
        if search.edge_type.is_empty() {
            return Err(GraphError::validation("edge_type", "must not be empty"));
        }
        Ok(EdgeStream::versions(
            self.storage.clone(),
            self.config.clone(),
            self.scope.clone(),
            search.source,
            search.edge_type,
            search.target,
            search.max_version,
            search.last.as_ref(),
        ))
    }

    /// Stream edges leaving a source node with the given type, newest
    /// version first, deduplicated to the latest visible version per target.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Validation`] for malformed input; storage and
    /// timeout failures surface through the stream.
    pub fn load_edges_from_source(&self, search: SearchByEdgeType) -> Result<EdgeStream> {
        validate_id(&search.node, "node")?;
        if search.edge_type.is_empty() {
            return Err(GraphError::validation("edge_type", "must not be empty"));
        }
        let meta = DirectedEdgeMeta::from_source(search.node, search.edge_type);
        Ok(self.adjacency_stream(meta, search.max_version, search.last.as_ref()))
    }

    /// Stream edges leaving a source node with the given type and target
    /// id type.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Validation`] for malformed input; storage and
    /// timeout failures surface through the stream.
    pub fn load_edges_from_source_by_type(&self, search: SearchByIdType) -> Result<EdgeStream> {
        validate_id(&search.node, "node")?;
        if search.edge_type.is_empty() {
            return Err(GraphError::validation("edge_type", "must not be empty"));
        }
        if search.id_type.is_empty() {
            return Err(GraphError::validation("id_type", "must not be empty"));
        }
        let meta =
            DirectedEdgeMeta::from_source_by_type(search.node, search.edge_type, search.id_type);
        Ok(self.adjacency_stream(meta, search.max_version, search.last.as_ref()))
    }

    /// Stream edges arriving at a target node with the given type, newest
    /// version first, deduplicated to the latest visible version per source.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Validation`] for malformed input; storage and
    /// timeout failures surface through the stream.
    pub fn load_edges_to_target(&self, search: SearchByEdgeType) -> Result<EdgeStream> {
        validate_id(&search.node, "node")?;
        if search.edge_type.is_empty() {
            return Err(GraphError::validation("edge_type", "must not be empty"));
        }
        let meta = DirectedEdgeMeta::to_target(search.node, search.edge_type);
        Ok(self.adjacency_stream(meta, search.max_version, search.last.as_ref()))
    }

    /// Stream edges arriving at a target node with the given type and
    /// source id type.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Validation`] for malformed input; storage and
    /// timeout failures surface through the stream.
    pub fn load_edges_to_target_by_type(&self, search: SearchByIdType) -> Result<EdgeStream> {
        validate_id(&search.node, "node")?;
        if search.edge_type.is_empty() {
            return Err(GraphError::validation("edge_type", "must not be empty"));
        }
        if search.id_type.is_empty() {
            return Err(GraphError::validation("id_type", "must not be empty"));
        }
        let meta =
            DirectedEdgeMeta::to_target_by_type(search.node, search.edge_type, search.id_type);
        Ok(self.adjacency_stream(meta, search.max_version, search.last.as_ref()))
    }

    /// Stream the distinct edge types leaving a node, ascending.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Validation`] for a malformed node id.
    pub fn get_edge_types_from_source(&self, search: SearchEdgeType) -> Result<NameStream> {
        self.type_stream(EdgeDirection::FromSource, search)
    }

    /// Stream the distinct edge types arriving at a node, ascending.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Validation`] for a malformed node id.
    pub fn get_edge_types_to_target(&self, search: SearchEdgeType) -> Result<NameStream> {
        self.type_stream(EdgeDirection::ToTarget, search)
    }

    /// Stream the distinct target id types under one (source, edge type),
    /// ascending.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Validation`] for malformed input.
    pub fn get_id_types_from_source(&self, search: SearchIdType) -> Result<NameStream> {
        self.id_type_stream(EdgeDirection::FromSource, search)
    }

    /// Stream the distinct source id types under one (target, edge type),
    /// ascending.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Validation`] for malformed input.
    pub fn get_id_types_to_target(&self, search: SearchIdType) -> Result<NameStream> {
        self.id_type_stream(EdgeDirection::ToTarget, search)
    }

    fn adjacency_stream(
        &self,
        meta: DirectedEdgeMeta,
        max_version: u64,
        last: Option<&Edge>,
    ) -> EdgeStream {
        EdgeStream::adjacency(
            self.storage.clone(),
            self.cache.clone(),
            self.config.clone(),
            self.scope.clone(),
            meta,
            max_version,
            last,
            Some(self.tasks.clone()),
        )
    }

    fn type_stream(&self, direction: EdgeDirection, search: SearchEdgeType) -> Result<NameStream> {
        validate_id(&search.node, "node")?;
        let base = type_registry_prefix(&self.scope.key_part(), direction, &search.node);
        Ok(NameStream::new(
            self.storage.clone(),
            &self.config,
            base,
            search.prefix.as_deref(),
            search.last.as_deref(),
        ))
    }

    fn id_type_stream(&self, direction: EdgeDirection, search: SearchIdType) -> Result<NameStream> {
        validate_id(&search.node, "node")?;
        if search.edge_type.is_empty() {
            return Err(GraphError::validation("edge_type", "must not be empty"));
        }
        let base = id_type_registry_prefix(
            &self.scope.key_part(),
            direction,
            &search.node,
            &search.edge_type,
        );
        Ok(NameStream::new(
            self.storage.clone(),
            &self.config,
            base,
            search.prefix.as_deref(),
            search.last.as_deref(),
        ))
    }
}
