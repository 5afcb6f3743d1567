//! End-to-end tests of the GraphManager lifecycle: write, read, tombstone,
//! delete, cursor paging, type enumeration and the read SLA breaker.

use shardgraph::{
    ApplicationScope, Edge, GraphConfig, GraphManager, GraphManagerFactory, Id, MemoryBackend,
    SearchByEdge, SearchByEdgeType, SearchByIdType, SearchEdgeType, SearchIdType,
};
use std::sync::Arc;

fn graph() -> (GraphManagerFactory, GraphManager) {
    let factory = GraphManagerFactory::in_memory(GraphConfig::default());
    let manager = factory
        .for_scope(ApplicationScope::new(Id::generate("application")))
        .unwrap();
    (factory, manager)
}

fn edges_of(stream: shardgraph::EdgeStream) -> Vec<Edge> {
    stream.map(|r| r.unwrap().edge).collect()
}

#[test]
fn test_write_then_read_from_source() {
    let (_factory, graph) = graph();
    let a = Id::generate("user");
    let b = Id::generate("post");
    let edge = graph
        .write_edge(Edge::new(a.clone(), "likes", b, 100))
        .unwrap();

    let found = edges_of(
        graph
            .load_edges_from_source(SearchByEdgeType::new(a.clone(), "likes", 100))
            .unwrap(),
    );
    assert_eq!(found, vec![edge]);

    // A different edge type matches nothing
    let other = edges_of(
        graph
            .load_edges_from_source(SearchByEdgeType::new(a, "likesX", 100))
            .unwrap(),
    );
    assert!(other.is_empty());
}

#[test]
fn test_read_to_target_and_by_type_forms() {
    let (_factory, graph) = graph();
    let user = Id::generate("user");
    let post = Id::generate("post");
    let comment = Id::generate("comment");
    graph
        .write_edge(Edge::new(user.clone(), "likes", post.clone(), 100))
        .unwrap();
    graph
        .write_edge(Edge::new(user.clone(), "likes", comment, 200))
        .unwrap();

    let from = edges_of(
        graph
            .load_edges_from_source(SearchByEdgeType::new(user.clone(), "likes", u64::MAX))
            .unwrap(),
    );
    assert_eq!(from.len(), 2);

    // Narrowed to targets of type "post"
    let by_type = edges_of(
        graph
            .load_edges_from_source_by_type(SearchByIdType {
                node: user.clone(),
                edge_type: "likes".into(),
                id_type: "post".into(),
                max_version: u64::MAX,
                last: None,
            })
            .unwrap(),
    );
    assert_eq!(by_type.len(), 1);
    assert_eq!(by_type[0].target, post);

    // Reverse direction
    let to = edges_of(
        graph
            .load_edges_to_target(SearchByEdgeType::new(post.clone(), "likes", u64::MAX))
            .unwrap(),
    );
    assert_eq!(to.len(), 1);
    assert_eq!(to[0].source, user.clone());

    let to_by_type = edges_of(
        graph
            .load_edges_to_target_by_type(SearchByIdType {
                node: post,
                edge_type: "likes".into(),
                id_type: "user".into(),
                max_version: u64::MAX,
                last: None,
            })
            .unwrap(),
    );
    assert_eq!(to_by_type.len(), 1);
}

#[test]
fn test_reads_deduplicate_to_latest_visible_version() {
    let (_factory, graph) = graph();
    let a = Id::generate("user");
    let b = Id::generate("post");
    graph
        .write_edge(Edge::new(a.clone(), "likes", b.clone(), 100))
        .unwrap();
    graph
        .write_edge(Edge::new(a.clone(), "likes", b.clone(), 200))
        .unwrap();

    // Unbounded read sees only the newest version of the logical edge
    let latest = edges_of(
        graph
            .load_edges_from_source(SearchByEdgeType::new(a.clone(), "likes", u64::MAX))
            .unwrap(),
    );
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].version, 200);

    // Bounding below the newer version exposes the older one
    let bounded = edges_of(
        graph
            .load_edges_from_source(SearchByEdgeType::new(a.clone(), "likes", 100))
            .unwrap(),
    );
    assert_eq!(bounded.len(), 1);
    assert_eq!(bounded[0].version, 100);

    // Bounding below every version matches nothing
    let none = edges_of(
        graph
            .load_edges_from_source(SearchByEdgeType::new(a, "likes", 50))
            .unwrap(),
    );
    assert!(none.is_empty());
}

#[test]
fn test_load_edge_versions_includes_tombstones_newest_first() {
    let (_factory, graph) = graph();
    let a = Id::generate("user");
    let b = Id::generate("post");
    graph
        .write_edge(Edge::new(a.clone(), "likes", b.clone(), 100))
        .unwrap();
    graph
        .write_edge(Edge::new(a.clone(), "likes", b.clone(), 200))
        .unwrap();
    graph
        .mark_edge(Edge::new(a.clone(), "likes", b.clone(), 200))
        .unwrap();

    let versions: Vec<_> = graph
        .load_edge_versions(SearchByEdge {
            source: a,
            edge_type: "likes".into(),
            target: b,
            max_version: u64::MAX,
            last: None,
        })
        .unwrap()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0].edge.version, 200);
    assert!(versions[0].deleted);
    assert_eq!(versions[1].edge.version, 100);
    assert!(!versions[1].deleted);
}

#[test]
fn test_marked_edge_is_hidden_from_adjacency_reads() {
    let (_factory, graph) = graph();
    let a = Id::generate("user");
    let b = Id::generate("post");
    let edge = graph
        .write_edge(Edge::new(a.clone(), "likes", b.clone(), 100))
        .unwrap();

    graph.mark_edge(edge).unwrap();

    let from = edges_of(
        graph
            .load_edges_from_source(SearchByEdgeType::new(a, "likes", u64::MAX))
            .unwrap(),
    );
    assert!(from.is_empty());

    let to = edges_of(
        graph
            .load_edges_to_target(SearchByEdgeType::new(b, "likes", u64::MAX))
            .unwrap(),
    );
    assert!(to.is_empty());
}

#[test]
fn test_marked_node_hides_edges_at_or_before_timestamp() {
    let (_factory, graph) = graph();
    let a = Id::generate("user");
    let b = Id::generate("post");
    let c = Id::generate("post");
    graph
        .write_edge(Edge::new(a.clone(), "likes", b, 100))
        .unwrap();
    graph
        .write_edge(Edge::new(a.clone(), "likes", c.clone(), 300))
        .unwrap();

    graph.mark_node(a.clone(), 200).unwrap();

    // version 100 <= mark 200 hidden, version 300 survives
    let visible = edges_of(
        graph
            .load_edges_from_source(SearchByEdgeType::new(a, "likes", u64::MAX))
            .unwrap(),
    );
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].target, c);
    assert_eq!(visible[0].version, 300);
}

#[test]
fn test_marked_target_node_hides_edge_from_source_reads() {
    let (_factory, graph) = graph();
    let a = Id::generate("user");
    let b = Id::generate("post");
    graph
        .write_edge(Edge::new(a.clone(), "likes", b.clone(), 100))
        .unwrap();

    graph.mark_node(b, 150).unwrap();

    let visible = edges_of(
        graph
            .load_edges_from_source(SearchByEdgeType::new(a, "likes", u64::MAX))
            .unwrap(),
    );
    assert!(visible.is_empty());
}

#[test]
fn test_delete_edge_sweeps_all_rows() {
    let backend = MemoryBackend::new();
    let factory = GraphManagerFactory::new(Arc::new(backend.clone()), GraphConfig::default());
    let graph = factory
        .for_scope(ApplicationScope::new(Id::generate("application")))
        .unwrap();
    let a = Id::generate("user");
    let edge = graph
        .write_edge(Edge::new(a.clone(), "likes", Id::generate("post"), 100))
        .unwrap();

    graph.mark_edge(edge.clone()).unwrap();
    graph.delete_edge(edge).unwrap();

    // Dropping the factory drains the maintenance queue
    drop(factory);

    let found = edges_of(
        graph
            .load_edges_from_source(SearchByEdgeType::new(a, "likes", u64::MAX))
            .unwrap(),
    );
    assert!(found.is_empty());
    // Every index row is gone, type registries included
    assert!(backend.is_empty());
}

#[test]
fn test_cursor_resumes_without_loss_or_duplication() {
    let (_factory, graph) = graph();
    let a = Id::generate("user");
    for i in 1..=5u64 {
        graph
            .write_edge(Edge::new(a.clone(), "likes", Id::generate("post"), 100 + i))
            .unwrap();
    }

    let search = SearchByEdgeType::new(a, "likes", u64::MAX);
    let first_page: Vec<Edge> = graph
        .load_edges_from_source(search.clone())
        .unwrap()
        .take(2)
        .map(|r| r.unwrap().edge)
        .collect();
    assert_eq!(first_page.len(), 2);

    let rest = edges_of(
        graph
            .load_edges_from_source(search.resume_after(first_page[1].clone()))
            .unwrap(),
    );
    assert_eq!(rest.len(), 3);

    let mut all: Vec<u64> = first_page
        .iter()
        .chain(rest.iter())
        .map(|e| e.version)
        .collect();
    all.sort_unstable();
    all.dedup();
    assert_eq!(all, vec![102, 103, 104, 105, 106]);
}

#[test]
fn test_cursor_resumes_across_equal_versions() {
    let (_factory, graph) = graph();
    let a = Id::generate("user");
    for _ in 0..3 {
        graph
            .write_edge(Edge::new(a.clone(), "likes", Id::generate("post"), 100))
            .unwrap();
    }

    let search = SearchByEdgeType::new(a, "likes", u64::MAX);
    let first: Edge = graph
        .load_edges_from_source(search.clone())
        .unwrap()
        .take(1)
        .map(|r| r.unwrap().edge)
        .next()
        .unwrap();

    let rest = edges_of(
        graph
            .load_edges_from_source(search.resume_after(first.clone()))
            .unwrap(),
    );
    assert_eq!(rest.len(), 2);
    assert!(rest.iter().all(|e| e.target != first.target));
}

#[test]
fn test_cursor_resume_skips_superseded_versions() {
    let (_factory, graph) = graph();
    let a = Id::generate("user");
    let b = Id::generate("post");
    let c = Id::generate("post");
    // b was rewritten: only its newest version may ever surface
    graph
        .write_edge(Edge::new(a.clone(), "likes", b.clone(), 60))
        .unwrap();
    graph
        .write_edge(Edge::new(a.clone(), "likes", b.clone(), 100))
        .unwrap();
    graph
        .write_edge(Edge::new(a.clone(), "likes", c.clone(), 80))
        .unwrap();

    let search = SearchByEdgeType::new(a, "likes", u64::MAX);
    let first: Edge = graph
        .load_edges_from_source(search.clone())
        .unwrap()
        .take(1)
        .map(|r| r.unwrap().edge)
        .next()
        .unwrap();
    assert_eq!((first.version, first.target.clone()), (100, b));

    // The resumed page must not re-emit b at its stale version 60
    let rest = edges_of(
        graph
            .load_edges_from_source(search.resume_after(first))
            .unwrap(),
    );
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].version, 80);
    assert_eq!(rest[0].target, c);
}

#[test]
fn test_edge_type_enumeration_with_prefix_and_cursor() {
    let (_factory, graph) = graph();
    let a = Id::generate("user");
    let b = Id::generate("post");
    for t in ["follows", "likes", "owns"] {
        graph
            .write_edge(Edge::new(a.clone(), t, b.clone(), 100))
            .unwrap();
    }

    let all: Vec<String> = graph
        .get_edge_types_from_source(SearchEdgeType::new(a.clone()))
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(all, vec!["follows", "likes", "owns"]);

    let prefixed: Vec<String> = graph
        .get_edge_types_from_source(SearchEdgeType {
            node: a.clone(),
            prefix: Some("o".into()),
            last: None,
        })
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(prefixed, vec!["owns"]);

    let resumed: Vec<String> = graph
        .get_edge_types_from_source(SearchEdgeType {
            node: a,
            prefix: None,
            last: Some("follows".into()),
        })
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(resumed, vec!["likes", "owns"]);

    // Target side sees the same types arriving
    let incoming: Vec<String> = graph
        .get_edge_types_to_target(SearchEdgeType::new(b))
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(incoming, vec!["follows", "likes", "owns"]);
}

#[test]
fn test_type_names_with_separators_do_not_alias() {
    let (_factory, graph) = graph();
    let uuid = uuid::Uuid::new_v4();
    // Same uuid, names crafted so unescaped keys would coincide
    let crafted = Id::new(uuid, "t:a");
    let plain = Id::new(uuid, "t");

    graph
        .write_edge(Edge::new(crafted.clone(), "b", Id::generate("post"), 100))
        .unwrap();

    let crossed = edges_of(
        graph
            .load_edges_from_source(SearchByEdgeType::new(plain, "a:b", u64::MAX))
            .unwrap(),
    );
    assert!(crossed.is_empty());

    let own = edges_of(
        graph
            .load_edges_from_source(SearchByEdgeType::new(crafted.clone(), "b", u64::MAX))
            .unwrap(),
    );
    assert_eq!(own.len(), 1);

    // Enumeration returns the raw names
    let types: Vec<String> = graph
        .get_edge_types_from_source(SearchEdgeType::new(crafted))
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(types, vec!["b"]);
}

#[test]
fn test_id_type_enumeration() {
    let (_factory, graph) = graph();
    let a = Id::generate("user");
    graph
        .write_edge(Edge::new(a.clone(), "likes", Id::generate("post"), 100))
        .unwrap();
    graph
        .write_edge(Edge::new(a.clone(), "likes", Id::generate("comment"), 200))
        .unwrap();

    let id_types: Vec<String> = graph
        .get_id_types_from_source(SearchIdType::new(a, "likes"))
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(id_types, vec!["comment", "post"]);
}

#[test]
fn test_scopes_are_isolated() {
    let factory = GraphManagerFactory::in_memory(GraphConfig::default());
    let one = factory
        .for_scope(ApplicationScope::new(Id::generate("application")))
        .unwrap();
    let two = factory
        .for_scope(ApplicationScope::new(Id::generate("application")))
        .unwrap();

    let a = Id::generate("user");
    one.write_edge(Edge::new(a.clone(), "likes", Id::generate("post"), 100))
        .unwrap();

    let other_view = edges_of(
        two.load_edges_from_source(SearchByEdgeType::new(a, "likes", u64::MAX))
            .unwrap(),
    );
    assert!(other_view.is_empty());
}

#[test]
fn test_read_breaker_trips_and_fuses() {
    let factory = GraphManagerFactory::in_memory(GraphConfig {
        read_timeout_ms: 0,
        ..GraphConfig::default()
    });
    let graph = factory
        .for_scope(ApplicationScope::new(Id::generate("application")))
        .unwrap();
    let a = Id::generate("user");
    graph
        .write_edge(Edge::new(a.clone(), "likes", Id::generate("post"), 100))
        .unwrap();

    let mut stream = graph
        .load_edges_from_source(SearchByEdgeType::new(a, "likes", u64::MAX))
        .unwrap();

    let err = stream.next().unwrap().unwrap_err();
    assert!(err.is_timeout());
    // The breaker yields exactly one error, then the stream is fused
    assert!(stream.next().is_none());
}
