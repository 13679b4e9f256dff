//! **skein-core**: graph node model and connectivity tracking for the
//! skein pathfinding engine.
//!
//! This crate provides the data the search layer consumes: fixed-point
//! geometry ([`Int3`]), bit-packed node attributes ([`NodeFlags`]), the
//! node/graph arena ([`GraphSet`]) with its point, grid and triangle-mesh
//! variants, incremental connected-component ("area") tracking, and the
//! portal lookup used by the funnel algorithm in `skein-paths`.
//!
//! Graph *construction* from world geometry is out of scope: callers supply
//! populated graphs through the `GraphSet` mutation API and call
//! [`GraphSet::recompute_areas`] after bulk edits.

mod area;
mod connection;
mod flags;
mod graph;
mod int3;
mod node;
#[cfg(feature = "serde")]
mod serialize;

pub use connection::{Connection, Links};
pub use flags::{AREA_MAX, NodeFlags, TAG_COUNT};
pub use graph::{
    GRID_DIRS, Graph, GraphId, GraphKind, GraphSet, GridShape, NearestHit, NearestNode,
    NodeFilter,
};
pub use int3::{Int3, PRECISION, cross_xz};
pub use node::{Node, NodeIndex, NodeKind, PENALTY_WARN_THRESHOLD};
