//! Integration tests for shard growth under load and compaction convergence:
//! edges must be read exactly once no matter how many shards they span.

use shardgraph::shard::{compaction, NodeShardApproximation, NodeShardCache};
use shardgraph::{
    ApplicationScope, DirectedEdgeMeta, Edge, GraphConfig, GraphManagerFactory, Id,
    MemoryBackend, SearchByEdgeType, StorageBackend,
};
use std::collections::HashSet;
use std::sync::Arc;

/// Small shards, immediate counter flushes, no cache TTL: every write sees
/// the freshest directory and shards fill after a handful of edges.
fn growth_config() -> GraphConfig {
    GraphConfig {
        shard_size: 4,
        counter_flush_count: 1,
        shard_cache_timeout_ms: 0,
        // Blocks compaction so the multi-shard layout stays observable
        shard_min_delta_ms: u64::MAX / 2,
        page_size: 3,
        ..GraphConfig::default()
    }
}

fn eager_config() -> GraphConfig {
    GraphConfig {
        shard_min_delta_ms: 0,
        shard_cache_timeout_ms: 0,
        shard_size: 4,
        counter_flush_count: 1,
        page_size: 3,
        ..GraphConfig::default()
    }
}

fn fresh_cache(storage: &Arc<dyn StorageBackend>, config: GraphConfig) -> NodeShardCache {
    let config = Arc::new(config);
    let approx = Arc::new(NodeShardApproximation::new(storage.clone(), &config));
    NodeShardCache::new(storage.clone(), approx, config)
}

#[test]
fn test_writes_spill_into_new_shards_and_read_exactly_once() {
    let backend = MemoryBackend::new();
    let storage: Arc<dyn StorageBackend> = Arc::new(backend.clone());
    let factory = GraphManagerFactory::new(Arc::new(backend), growth_config());
    let scope = ApplicationScope::new(Id::generate("application"));
    let graph = factory.for_scope(scope.clone()).unwrap();

    let source = Id::generate("user");
    let mut targets = HashSet::new();
    for i in 1..=20u64 {
        let target = Id::generate("post");
        targets.insert(target.uuid);
        graph
            .write_edge(Edge::new(source.clone(), "likes", target, i))
            .unwrap();
    }

    // The adjacency list outgrew a single shard
    let meta = DirectedEdgeMeta::from_source(source.clone(), "likes");
    let cache = fresh_cache(&storage, growth_config());
    let groups = cache.get_read_shard_groups(&scope, u64::MAX, &meta).unwrap();
    assert_eq!(groups.len(), 1);
    assert!(groups[0].read_shards().len() > 1);
    assert!(groups[0].is_compaction_pending());

    // Every edge comes back exactly once, in descending version order
    let read: Vec<Edge> = graph
        .load_edges_from_source(SearchByEdgeType::new(source, "likes", u64::MAX))
        .unwrap()
        .map(|r| r.unwrap().edge)
        .collect();
    assert_eq!(read.len(), 20);
    let versions: Vec<u64> = read.iter().map(|e| e.version).collect();
    assert_eq!(versions, (1..=20u64).rev().collect::<Vec<_>>());
    let seen: HashSet<_> = read.iter().map(|e| e.target.uuid).collect();
    assert_eq!(seen, targets);
}

#[test]
fn test_compaction_converges_directory_and_preserves_edges() {
    let backend = MemoryBackend::new();
    let storage: Arc<dyn StorageBackend> = Arc::new(backend.clone());
    let scope = ApplicationScope::new(Id::generate("application"));
    let source = Id::generate("user");

    {
        let factory = GraphManagerFactory::new(Arc::new(backend.clone()), growth_config());
        let graph = factory.for_scope(scope.clone()).unwrap();
        for i in 1..=12u64 {
            graph
                .write_edge(Edge::new(source.clone(), "likes", Id::generate("post"), i))
                .unwrap();
        }
    }

    let meta = DirectedEdgeMeta::from_source(source.clone(), "likes");
    let eager = eager_config();
    let merged = compaction::compact_eligible(&storage, &eager, &scope, &meta, None).unwrap();
    assert!(merged >= 1);

    // The group collapsed: no merge outstanding anywhere
    let cache = fresh_cache(&storage, eager.clone());
    let groups = cache.get_read_shard_groups(&scope, u64::MAX, &meta).unwrap();
    assert!(groups.iter().all(|g| !g.is_compaction_pending()));

    // A second pass finds nothing to do
    assert_eq!(
        compaction::compact_eligible(&storage, &eager, &scope, &meta, None).unwrap(),
        0
    );

    // All 12 edges survive the merge
    let factory = GraphManagerFactory::new(Arc::new(backend), eager);
    let graph = factory.for_scope(scope).unwrap();
    let read: Vec<Edge> = graph
        .load_edges_from_source(SearchByEdgeType::new(source, "likes", u64::MAX))
        .unwrap()
        .map(|r| r.unwrap().edge)
        .collect();
    assert_eq!(read.len(), 12);
}

#[test]
fn test_marked_edge_stays_hidden_after_compaction() {
    let backend = MemoryBackend::new();
    let storage: Arc<dyn StorageBackend> = Arc::new(backend.clone());
    let scope = ApplicationScope::new(Id::generate("application"));
    let source = Id::generate("user");

    // Two-edge shards: the oldest edge ends up in an older shard than the
    // write shard current at mark time
    let tiny = GraphConfig {
        shard_size: 2,
        ..growth_config()
    };
    {
        let factory = GraphManagerFactory::new(Arc::new(backend.clone()), tiny);
        let graph = factory.for_scope(scope.clone()).unwrap();
        let oldest = graph
            .write_edge(Edge::new(source.clone(), "likes", Id::generate("post"), 10))
            .unwrap();
        for v in [20u64, 30] {
            graph
                .write_edge(Edge::new(source.clone(), "likes", Id::generate("post"), v))
                .unwrap();
        }

        graph.mark_edge(oldest).unwrap();
        let visible: Vec<u64> = graph
            .load_edges_from_source(SearchByEdgeType::new(source.clone(), "likes", u64::MAX))
            .unwrap()
            .map(|r| r.unwrap().edge.version)
            .collect();
        assert_eq!(visible, vec![30, 20]);
    }

    // Merging the older shard into the target must not resurrect the edge
    let meta = DirectedEdgeMeta::from_source(source.clone(), "likes");
    let eager = eager_config();
    let merged = compaction::compact_eligible(&storage, &eager, &scope, &meta, None).unwrap();
    assert!(merged >= 1);

    let factory = GraphManagerFactory::new(Arc::new(backend), eager);
    let graph = factory.for_scope(scope).unwrap();
    let after: Vec<u64> = graph
        .load_edges_from_source(SearchByEdgeType::new(source, "likes", u64::MAX))
        .unwrap()
        .map(|r| r.unwrap().edge.version)
        .collect();
    assert_eq!(after, vec![30, 20]);
}

#[test]
fn test_reads_audit_and_worker_compacts_in_background() {
    let backend = MemoryBackend::new();
    let storage: Arc<dyn StorageBackend> = Arc::new(backend.clone());
    let scope = ApplicationScope::new(Id::generate("application"));
    let source = Id::generate("user");

    // Populate shards without letting compaction run yet
    {
        let factory = GraphManagerFactory::new(Arc::new(backend.clone()), growth_config());
        let graph = factory.for_scope(scope.clone()).unwrap();
        for i in 1..=10u64 {
            graph
                .write_edge(Edge::new(source.clone(), "likes", Id::generate("post"), i))
                .unwrap();
        }
    }

    // Any read under an eager config enqueues the audit on first poll;
    // dropping the factory drains the worker queue before we inspect the
    // directory.
    let factory = GraphManagerFactory::new(Arc::new(backend.clone()), eager_config());
    let graph = factory.for_scope(scope.clone()).unwrap();
    let first = graph
        .load_edges_from_source(SearchByEdgeType::new(source.clone(), "likes", u64::MAX))
        .unwrap()
        .next();
    assert!(first.is_some());
    drop(graph);
    drop(factory);

    let meta = DirectedEdgeMeta::from_source(source.clone(), "likes");
    let cache = fresh_cache(&storage, eager_config());
    let groups = cache.get_read_shard_groups(&scope, u64::MAX, &meta).unwrap();
    assert!(groups.iter().all(|g| !g.is_compaction_pending()));

    // Post-compaction reads still see every edge exactly once
    let factory = GraphManagerFactory::new(Arc::new(backend), eager_config());
    let graph = factory.for_scope(scope).unwrap();
    let after: Vec<Edge> = graph
        .load_edges_from_source(SearchByEdgeType::new(source, "likes", u64::MAX))
        .unwrap()
        .map(|r| r.unwrap().edge)
        .collect();
    assert_eq!(after.len(), 10);
    let versions: HashSet<u64> = after.iter().map(|e| e.version).collect();
    assert_eq!(versions.len(), 10);
}
