//! The graph node model: [`NodeIndex`], [`Node`] and its variants.

use crate::connection::{Connection, Links};
use crate::flags::NodeFlags;
use crate::int3::Int3;

/// Dense index of a node in the arena.
///
/// Stable for the lifetime of the node; the slot (and therefore the index)
/// is reused after the node is destroyed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeIndex(pub u32);

impl NodeIndex {
    /// Sentinel for "no node", used in scratch back-pointers.
    pub const NONE: Self = Self(u32::MAX);

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Penalties above this trip a warning: they risk overflowing the `u32`
/// cost accumulator over long searches, though they are not invalid.
pub const PENALTY_WARN_THRESHOLD: u32 = 0x00FF_FFFF;

/// Variant-specific node payload.
///
/// A tagged enum rather than a trait object: the search's expansion routine
/// matches on the variant once per node, which keeps the grid arm (the hot
/// one) monomorphic and inlinable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// Free-standing node with an arbitrary connection list and no surface.
    Point { links: Links },
    /// Cell of a grid graph. Implicit neighbors are derived from the owning
    /// grid's shape and the `open_dirs` bitmask (bit *i* set = direction *i*
    /// traversable, directions ordered N, E, S, W, NE, SE, SW, NW). Custom
    /// links are still allowed on top.
    Grid {
        cell: u32,
        open_dirs: u8,
        links: Links,
    },
    /// Triangle of a navmesh. Connections to neighbors sharing an edge carry
    /// the edge id used by the funnel's portal lookup.
    Triangle { vertices: [Int3; 3], links: Links },
}

/// One graph node: position, packed attributes, traversal penalty and the
/// variant payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub position: Int3,
    pub flags: NodeFlags,
    pub penalty: u32,
    pub kind: NodeKind,
}

impl Node {
    /// The node's explicit (custom) connection list.
    ///
    /// Grid cells additionally have implicit neighbors that are *not* in
    /// this list; use `GraphSet::for_each_connection` for the full set.
    #[inline]
    pub fn links(&self) -> &[Connection] {
        match &self.kind {
            NodeKind::Point { links }
            | NodeKind::Grid { links, .. }
            | NodeKind::Triangle { links, .. } => links,
        }
    }

    #[inline]
    pub(crate) fn links_mut(&mut self) -> &mut Links {
        match &mut self.kind {
            NodeKind::Point { links }
            | NodeKind::Grid { links, .. }
            | NodeKind::Triangle { links, .. } => links,
        }
    }

    #[inline]
    pub fn walkable(&self) -> bool {
        self.flags.walkable()
    }

    /// Triangle vertices in winding order, for mesh nodes.
    #[inline]
    pub fn triangle_vertices(&self) -> Option<&[Int3; 3]> {
        match &self.kind {
            NodeKind::Triangle { vertices, .. } => Some(vertices),
            _ => None,
        }
    }
}
