//! Bit-packed node attributes: [`NodeFlags`].
//!
//! One `u32` word holds every per-node attribute that the search and the
//! connectivity tracker read on the hot path. Keeping them packed is
//! deliberate: a large graph touches millions of these words per search and
//! the packing keeps each node in as few cache lines as possible.
//!
//! Bit layout:
//!
//! | bits    | field    | range     |
//! |---------|----------|-----------|
//! | 0       | walkable | bool      |
//! | 1..=5   | tag      | 0..32     |
//! | 6..=13  | graph id | 0..256    |
//! | 14..=31 | area id  | 0..262144 |
//!
//! The area bits are transient (recomputed by the connectivity tracker) and
//! are masked out of the serialized form.

use std::fmt;

use crate::graph::GraphId;

const WALKABLE_BIT: u32 = 1;

const TAG_SHIFT: u32 = 1;
const TAG_MASK: u32 = 0x1F << TAG_SHIFT;

const GRAPH_SHIFT: u32 = 6;
const GRAPH_MASK: u32 = 0xFF << GRAPH_SHIFT;

const AREA_SHIFT: u32 = 14;
const AREA_MASK: u32 = 0x3FFFF << AREA_SHIFT;

/// Number of distinct traversal tags.
pub const TAG_COUNT: usize = 32;

/// Largest representable area (connected-component) id.
pub const AREA_MAX: u32 = 0x3FFFF;

/// The packed per-node attribute word.
#[derive(Copy, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeFlags(u32);

impl NodeFlags {
    /// Fresh flags for a node owned by `graph`: unwalkable, tag 0, area 0.
    #[inline]
    pub fn for_graph(graph: GraphId) -> Self {
        Self((graph.0 as u32) << GRAPH_SHIFT)
    }

    /// The raw word. Only useful for serialization.
    #[inline]
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Rebuild from a raw word, discarding the transient area bits.
    #[inline]
    pub fn from_persisted_bits(bits: u32) -> Self {
        Self(bits & !AREA_MASK)
    }

    /// The raw word with transient (area) bits cleared, for serialization.
    #[inline]
    pub fn persisted_bits(self) -> u32 {
        self.0 & !AREA_MASK
    }

    #[inline]
    pub fn walkable(self) -> bool {
        self.0 & WALKABLE_BIT != 0
    }

    #[inline]
    pub fn set_walkable(&mut self, walkable: bool) {
        if walkable {
            self.0 |= WALKABLE_BIT;
        } else {
            self.0 &= !WALKABLE_BIT;
        }
    }

    /// Traversal tag, `0..TAG_COUNT`.
    #[inline]
    pub fn tag(self) -> u32 {
        (self.0 & TAG_MASK) >> TAG_SHIFT
    }

    /// Set the traversal tag. Values are masked to 5 bits.
    #[inline]
    pub fn set_tag(&mut self, tag: u32) {
        debug_assert!((tag as usize) < TAG_COUNT, "tag {tag} out of range");
        self.0 = (self.0 & !TAG_MASK) | ((tag << TAG_SHIFT) & TAG_MASK);
    }

    /// Id of the owning graph.
    #[inline]
    pub fn graph(self) -> GraphId {
        GraphId(((self.0 & GRAPH_MASK) >> GRAPH_SHIFT) as u8)
    }

    #[inline]
    pub fn set_graph(&mut self, graph: GraphId) {
        self.0 = (self.0 & !GRAPH_MASK) | ((graph.0 as u32) << GRAPH_SHIFT);
    }

    /// Connected-component id, as of the last tracker recompute.
    #[inline]
    pub fn area(self) -> u32 {
        (self.0 & AREA_MASK) >> AREA_SHIFT
    }

    #[inline]
    pub fn set_area(&mut self, area: u32) {
        debug_assert!(area <= AREA_MAX, "area {area} out of range");
        self.0 = (self.0 & !AREA_MASK) | ((area << AREA_SHIFT) & AREA_MASK);
    }
}

impl fmt::Debug for NodeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeFlags")
            .field("walkable", &self.walkable())
            .field("tag", &self.tag())
            .field("graph", &self.graph().0)
            .field("area", &self.area())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walkable_field() {
        let mut f = NodeFlags::default();
        assert!(!f.walkable());
        f.set_walkable(true);
        assert!(f.walkable());
        f.set_walkable(false);
        assert!(!f.walkable());
    }

    #[test]
    fn tag_field() {
        let mut f = NodeFlags::default();
        for tag in 0..TAG_COUNT as u32 {
            f.set_tag(tag);
            assert_eq!(f.tag(), tag);
        }
        // Max tag must not bleed into neighboring fields.
        f.set_tag(31);
        assert!(!f.walkable());
        assert_eq!(f.graph(), GraphId(0));
        assert_eq!(f.area(), 0);
    }

    #[test]
    fn graph_field() {
        let mut f = NodeFlags::default();
        for g in [0u8, 1, 17, 255] {
            f.set_graph(GraphId(g));
            assert_eq!(f.graph(), GraphId(g));
        }
        f.set_graph(GraphId(255));
        assert_eq!(f.tag(), 0);
        assert_eq!(f.area(), 0);
    }

    #[test]
    fn area_field() {
        let mut f = NodeFlags::default();
        for area in [0, 1, 1000, AREA_MAX] {
            f.set_area(area);
            assert_eq!(f.area(), area);
        }
        f.set_area(AREA_MAX);
        assert!(!f.walkable());
        assert_eq!(f.tag(), 0);
        assert_eq!(f.graph(), GraphId(0));
    }

    #[test]
    fn fields_are_independent() {
        let mut f = NodeFlags::for_graph(GraphId(7));
        f.set_walkable(true);
        f.set_tag(13);
        f.set_area(0x2ABCD);
        assert!(f.walkable());
        assert_eq!(f.tag(), 13);
        assert_eq!(f.graph(), GraphId(7));
        assert_eq!(f.area(), 0x2ABCD);
    }

    #[test]
    fn persisted_bits_drop_area() {
        let mut f = NodeFlags::for_graph(GraphId(3));
        f.set_walkable(true);
        f.set_tag(5);
        f.set_area(12345);
        let restored = NodeFlags::from_persisted_bits(f.persisted_bits());
        assert!(restored.walkable());
        assert_eq!(restored.tag(), 5);
        assert_eq!(restored.graph(), GraphId(3));
        assert_eq!(restored.area(), 0);
    }
}
