//! Heuristics and per-search traversal policy.

use skein_core::{Int3, Node, TAG_COUNT};

/// Distance estimate used to order the open queue.
///
/// All variants are admissible on lattice distances, so `Euclidean` (the
/// default) keeps searches optimal; `None` degrades to uniform-cost search.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Heuristic {
    /// No estimate; expands strictly by accumulated cost.
    None,
    /// |dx| + |dy| + |dz|. Fastest on 4-neighbor grids, inadmissible with
    /// diagonal moves.
    Manhattan,
    /// max(|dx|, |dy|, |dz|).
    Chebyshev,
    #[default]
    Euclidean,
}

impl Heuristic {
    /// Estimated cost from `a` to `b` in lattice units.
    #[inline]
    pub fn estimate(self, a: Int3, b: Int3) -> u32 {
        match self {
            Heuristic::None => 0,
            Heuristic::Manhattan => Int3::manhattan(a, b),
            Heuristic::Chebyshev => Int3::chebyshev(a, b),
            Heuristic::Euclidean => Int3::distance(a, b),
        }
    }
}

/// Which nodes a search may enter and at what extra cost.
///
/// Complements the geometric `NodeFilter` used for endpoint lookup: the
/// filter picks the endpoints, the traversal policy gates every expansion
/// in between.
#[derive(Copy, Clone, Debug)]
pub struct Traversal {
    /// Bit *t* set = nodes tagged *t* may be entered.
    pub tag_mask: u32,
    /// Extra cost added when entering a node with tag *t*, on top of the
    /// node's own penalty.
    pub tag_penalties: [u32; TAG_COUNT],
}

impl Default for Traversal {
    fn default() -> Self {
        Self {
            tag_mask: u32::MAX,
            tag_penalties: [0; TAG_COUNT],
        }
    }
}

impl Traversal {
    /// Whether the search may enter `node`.
    #[inline]
    pub fn can_traverse(&self, node: &Node) -> bool {
        node.walkable() && self.tag_mask & (1 << node.flags.tag()) != 0
    }

    /// Cost surcharge for entering `node`.
    #[inline]
    pub fn entry_penalty(&self, node: &Node) -> u32 {
        node.penalty
            .saturating_add(self.tag_penalties[node.flags.tag() as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_core::{GraphSet, Int3};

    #[test]
    fn estimates() {
        let a = Int3::ZERO;
        let b = Int3::new(3000, 0, 4000);
        assert_eq!(Heuristic::None.estimate(a, b), 0);
        assert_eq!(Heuristic::Manhattan.estimate(a, b), 7000);
        assert_eq!(Heuristic::Chebyshev.estimate(a, b), 4000);
        assert_eq!(Heuristic::Euclidean.estimate(a, b), 5000);
    }

    #[test]
    fn traversal_gates_on_tag_and_walkability() {
        let mut set = GraphSet::new();
        let g = set.add_point_graph();
        let a = set.add_point_node(g, Int3::ZERO, true);
        set.set_tag(a, 5);
        set.set_penalty(a, 100);

        let mut t = Traversal::default();
        assert!(t.can_traverse(set.node(a).unwrap()));
        assert_eq!(t.entry_penalty(set.node(a).unwrap()), 100);

        t.tag_mask = !(1 << 5);
        assert!(!t.can_traverse(set.node(a).unwrap()));

        t.tag_mask = u32::MAX;
        t.tag_penalties[5] = 400;
        assert_eq!(t.entry_penalty(set.node(a).unwrap()), 500);

        let mut set2 = set;
        set2.set_walkable(a, false);
        assert!(!t.can_traverse(set2.node(a).unwrap()));
    }
}
