//! Core graph types and the manager façade.
//!
//! This module defines the fundamental building blocks:
//! - [`Id`], [`Edge`], [`MarkedEdge`]: immutable value types
//! - [`DirectedEdgeMeta`]: the four canonical adjacency access patterns
//! - [`GraphManager`]: scoped writes, tombstones, deletes and paged reads

mod manager;
pub(crate) mod meta;
pub(crate) mod types;

pub use manager::{GraphManager, GraphManagerFactory};
pub use meta::{DirectedEdgeMeta, EdgeDirection};
pub use types::{
    ApplicationScope, Edge, Id, MarkedEdge, SearchByEdge, SearchByEdgeType, SearchByIdType,
    SearchEdgeType, SearchIdType,
};
