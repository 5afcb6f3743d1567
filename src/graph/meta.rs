//! Canonical adjacency access patterns.
//!
//! [`DirectedEdgeMeta`] is a pure key-derivation type mapping (node, edge
//! type, optional peer-type filter, direction) to one of the four canonical
//! adjacency forms. The shard cache, the approximate counter and edge
//! serialization all derive keys from the same meta, which is what keeps
//! shard-allocation decisions and physical row placement in agreement.

use super::types::{escape_key_part, Edge, Id};
use serde::{Deserialize, Serialize};

/// Which end of the edge the adjacency list hangs off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeDirection {
    /// Adjacency list of a source node: edges leaving it
    FromSource,
    /// Adjacency list of a target node: edges arriving at it
    ToTarget,
}

impl EdgeDirection {
    /// One-character key fragment, also used by the type registries.
    pub(crate) fn key_part(self) -> &'static str {
        match self {
            EdgeDirection::FromSource => "s",
            EdgeDirection::ToTarget => "t",
        }
    }
}

impl std::fmt::Display for EdgeDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeDirection::FromSource => write!(f, "FromSource"),
            EdgeDirection::ToTarget => write!(f, "ToTarget"),
        }
    }
}

/// One of the four canonical adjacency access patterns.
///
/// Each distinct meta owns an independent shard series, counter series and
/// cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DirectedEdgeMeta {
    /// The node the adjacency list belongs to
    pub node: Id,
    /// Edge type of the list
    pub edge_type: String,
    /// Optional peer-type filter (forms (b) and (d))
    pub peer_type: Option<String>,
    /// Which direction the list covers
    pub direction: EdgeDirection,
}

impl DirectedEdgeMeta {
    /// Form (a): source node + edge type.
    pub fn from_source(node: Id, edge_type: impl Into<String>) -> Self {
        Self {
            node,
            edge_type: edge_type.into(),
            peer_type: None,
            direction: EdgeDirection::FromSource,
        }
    }

    /// Form (b): source node + edge type + target type.
    pub fn from_source_by_type(
        node: Id,
        edge_type: impl Into<String>,
        target_type: impl Into<String>,
    ) -> Self {
        Self {
            node,
            edge_type: edge_type.into(),
            peer_type: Some(target_type.into()),
            direction: EdgeDirection::FromSource,
        }
    }

    /// Form (c): target node + edge type.
    pub fn to_target(node: Id, edge_type: impl Into<String>) -> Self {
        Self {
            node,
            edge_type: edge_type.into(),
            peer_type: None,
            direction: EdgeDirection::ToTarget,
        }
    }

    /// Form (d): target node + edge type + source type.
    pub fn to_target_by_type(
        node: Id,
        edge_type: impl Into<String>,
        source_type: impl Into<String>,
    ) -> Self {
        Self {
            node,
            edge_type: edge_type.into(),
            peer_type: Some(source_type.into()),
            direction: EdgeDirection::ToTarget,
        }
    }

    /// All four metas a single edge write must be indexed under.
    pub fn for_edge(edge: &Edge) -> [DirectedEdgeMeta; 4] {
        [
            Self::from_source(edge.source.clone(), edge.edge_type.clone()),
            Self::from_source_by_type(
                edge.source.clone(),
                edge.edge_type.clone(),
                edge.target.node_type.clone(),
            ),
            Self::to_target(edge.target.clone(), edge.edge_type.clone()),
            Self::to_target_by_type(
                edge.target.clone(),
                edge.edge_type.clone(),
                edge.source.node_type.clone(),
            ),
        ]
    }

    /// Canonical storage-key fragment for this meta.
    ///
    /// The same fragment keys the shard directory, the counters and the edge
    /// rows; the four forms never collide because the leading tag differs,
    /// and user-supplied names are escaped so a `:` inside one cannot forge
    /// another meta's fragment.
    pub(crate) fn storage_key(&self) -> String {
        match &self.peer_type {
            None => format!(
                "{}:{}:{}",
                self.direction.key_part(),
                self.node.key_part(),
                escape_key_part(&self.edge_type)
            ),
            Some(peer) => format!(
                "{}p:{}:{}:{}",
                self.direction.key_part(),
                self.node.key_part(),
                escape_key_part(&self.edge_type),
                escape_key_part(peer)
            ),
        }
    }
}

impl std::fmt::Display for DirectedEdgeMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.peer_type {
            None => write!(f, "{}[{}:{}]", self.direction, self.node, self.edge_type),
            Some(peer) => write!(
                f,
                "{}[{}:{}:{}]",
                self.direction, self.node, self.edge_type, peer
            ),
        }
    }
}
