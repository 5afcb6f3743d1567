//! Core graph value types: ids, edges, tombstoned edges, tenant scope and
//! search descriptors.

use crate::error::{GraphError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies any graph node (an application entity).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Id {
    /// Entity UUID
    pub uuid: Uuid,
    /// Entity type name (e.g. "user", "device")
    pub node_type: String,
}

impl Id {
    /// Create an id from a UUID and a type name.
    pub fn new(uuid: Uuid, node_type: impl Into<String>) -> Self {
        Self {
            uuid,
            node_type: node_type.into(),
        }
    }

    /// Create an id with a fresh random UUID.
    pub fn generate(node_type: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4(), node_type)
    }

    /// Stable storage-key fragment for this id.
    pub(crate) fn key_part(&self) -> String {
        format!("{}:{}", self.uuid.simple(), escape_key_part(&self.node_type))
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.node_type, self.uuid)
    }
}

/// A directed edge in the graph.
///
/// Identified logically by (source, type, target); `version` totally orders
/// multiple writes to the same logical key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Source node
    pub source: Id,
    /// Edge type name
    pub edge_type: String,
    /// Target node
    pub target: Id,
    /// Write version (caller-supplied timestamp)
    pub version: u64,
}

impl Edge {
    /// Create a new edge.
    pub fn new(source: Id, edge_type: impl Into<String>, target: Id, version: u64) -> Self {
        Self {
            source,
            edge_type: edge_type.into(),
            target,
            version,
        }
    }

    /// The node on the far end of this edge relative to `direction`.
    pub(crate) fn peer(&self, direction: super::meta::EdgeDirection) -> &Id {
        match direction {
            super::meta::EdgeDirection::FromSource => &self.target,
            super::meta::EdgeDirection::ToTarget => &self.source,
        }
    }

    /// Stable key identifying this edge regardless of version, used for
    /// version-ordered deduplication on the read path.
    pub(crate) fn logical_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.source.key_part(),
            escape_key_part(&self.edge_type),
            self.target.key_part()
        )
    }

    /// Fail fast if any required field is missing or meaningless.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Validation`] naming the offending field. No I/O
    /// happens before this check passes.
    pub fn validate(&self) -> Result<()> {
        validate_id(&self.source, "source")?;
        validate_id(&self.target, "target")?;
        if self.edge_type.is_empty() {
            return Err(GraphError::validation("edge_type", "must not be empty"));
        }
        if self.version == 0 {
            return Err(GraphError::validation(
                "version",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl std::fmt::Display for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} -[{}]-> {} @{}",
            self.source, self.edge_type, self.target, self.version
        )
    }
}

pub(crate) fn validate_id(id: &Id, field: &'static str) -> Result<()> {
    if id.uuid.is_nil() {
        return Err(GraphError::validation(field, "uuid must not be nil"));
    }
    if id.node_type.is_empty() {
        return Err(GraphError::validation(field, "type must not be empty"));
    }
    Ok(())
}

/// An edge plus its soft-delete tombstone state.
///
/// This is the row representation: an edge transitions ACTIVE → MARKED
/// (tombstoned) → DELETED (rows physically removed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkedEdge {
    /// The underlying edge
    #[serde(flatten)]
    pub edge: Edge,
    /// True once the edge has been soft-deleted
    pub deleted: bool,
    /// Epoch-millis timestamp of the soft delete, if any
    pub deleted_timestamp: Option<u64>,
}

impl MarkedEdge {
    /// Wrap a live (unmarked) edge.
    pub fn active(edge: Edge) -> Self {
        Self {
            edge,
            deleted: false,
            deleted_timestamp: None,
        }
    }

    /// Tombstone an edge at the given timestamp.
    pub fn tombstone(edge: Edge, timestamp: u64) -> Self {
        Self {
            edge,
            deleted: true,
            deleted_timestamp: Some(timestamp),
        }
    }
}

/// Opaque per-tenant key threaded through every call.
///
/// All shard and edge keys are implicitly prefixed by it; callers of one
/// scope can never observe another scope's rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationScope {
    /// The owning application
    pub application: Id,
}

impl ApplicationScope {
    /// Create a scope for the given application id.
    pub fn new(application: Id) -> Self {
        Self { application }
    }

    pub(crate) fn key_part(&self) -> String {
        self.application.key_part()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        validate_id(&self.application, "application")
    }
}

/// Search descriptor for [`load_edge_versions`](crate::GraphManager::load_edge_versions):
/// all versions of one logical edge.
#[derive(Debug, Clone)]
pub struct SearchByEdge {
    /// Source node of the logical edge
    pub source: Id,
    /// Edge type of the logical edge
    pub edge_type: String,
    /// Target node of the logical edge
    pub target: Id,
    /// Upper version bound (inclusive)
    pub max_version: u64,
    /// Exclusive resume cursor: the last edge delivered by a previous page
    pub last: Option<Edge>,
}

/// Search descriptor for edge reads filtered by edge type.
#[derive(Debug, Clone)]
pub struct SearchByEdgeType {
    /// Node whose adjacency list is read
    pub node: Id,
    /// Edge type filter
    pub edge_type: String,
    /// Upper version bound (inclusive)
    pub max_version: u64,
    /// Exclusive resume cursor: the last edge delivered by a previous page
    pub last: Option<Edge>,
}

impl SearchByEdgeType {
    /// Convenience constructor for a first (cursor-less) page.
    pub fn new(node: Id, edge_type: impl Into<String>, max_version: u64) -> Self {
        Self {
            node,
            edge_type: edge_type.into(),
            max_version,
            last: None,
        }
    }

    /// Return a copy of this search resuming after `last`.
    pub fn resume_after(mut self, last: Edge) -> Self {
        self.last = Some(last);
        self
    }
}

/// Search descriptor for edge reads filtered by edge type and peer id type.
#[derive(Debug, Clone)]
pub struct SearchByIdType {
    /// Node whose adjacency list is read
    pub node: Id,
    /// Edge type filter
    pub edge_type: String,
    /// Peer id-type filter (target type when reading from source, source
    /// type when reading to target)
    pub id_type: String,
    /// Upper version bound (inclusive)
    pub max_version: u64,
    /// Exclusive resume cursor: the last edge delivered by a previous page
    pub last: Option<Edge>,
}

/// Search descriptor for distinct edge-type enumeration on a node.
#[derive(Debug, Clone)]
pub struct SearchEdgeType {
    /// Node whose edge types are enumerated
    pub node: Id,
    /// Optional name prefix filter
    pub prefix: Option<String>,
    /// Exclusive resume cursor: the last type name delivered
    pub last: Option<String>,
}

impl SearchEdgeType {
    /// Convenience constructor without prefix or cursor.
    pub fn new(node: Id) -> Self {
        Self {
            node,
            prefix: None,
            last: None,
        }
    }
}

/// Search descriptor for distinct peer id-type enumeration on a node + edge type.
#[derive(Debug, Clone)]
pub struct SearchIdType {
    /// Node whose peer id types are enumerated
    pub node: Id,
    /// Edge type whose peers are considered
    pub edge_type: String,
    /// Optional name prefix filter
    pub prefix: Option<String>,
    /// Exclusive resume cursor: the last type name delivered
    pub last: Option<String>,
}

impl SearchIdType {
    /// Convenience constructor without prefix or cursor.
    pub fn new(node: Id, edge_type: impl Into<String>) -> Self {
        Self {
            node,
            edge_type: edge_type.into(),
            prefix: None,
            last: None,
        }
    }
}

/// Percent-escape the key separators in a user-supplied name fragment.
///
/// Type names are caller-controlled free text; a literal `:` or `|` in one
/// could otherwise make two distinct (node type, edge type) pairs encode to
/// the same storage key. Escaping is prefix-preserving, so escaped names
/// still sort and prefix-filter correctly.
pub(crate) fn escape_key_part(part: &str) -> String {
    part.replace('%', "%25")
        .replace(':', "%3a")
        .replace('|', "%7c")
}

/// Current time as epoch milliseconds.
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
