//! Funnel (string-pulling) post-processing.
//!
//! Converts a node sequence into the shortest point path threading the
//! portal corridor between consecutive nodes. Two stages, separable for
//! testing: [`build_portals`] collects the left/right portal endpoint lists
//! from the graph, [`run_funnel`] tightens the string through them. All side
//! tests are exact integer cross products, so degenerate geometry cannot
//! flip a comparison.

use log::warn;
use skein_core::{GraphSet, Int3, NodeIndex, cross_xz};

/// Output length cap. A well-formed corridor can never need more corners
/// than portals; blowing past this means the portal geometry is corrupt.
pub(crate) const MAX_FUNNEL_VERTICES: usize = 2000;

/// Shortest point path from `start` to `end` through the corridor of
/// `nodes`.
pub fn string_pull(set: &GraphSet, nodes: &[NodeIndex], start: Int3, end: Int3) -> Vec<Int3> {
    let (left, right) = build_portals(set, nodes, start, end);
    run_funnel(left, right)
}

/// Collect portal endpoints for travel along `nodes`, bracketed by
/// zero-width portals at the exact start and end points.
///
/// Node pairs without shared edge geometry contribute two zero-width
/// portals at the node centers, which pins the string through both centers
/// like the unprocessed path would.
pub fn build_portals(
    set: &GraphSet,
    nodes: &[NodeIndex],
    start: Int3,
    end: Int3,
) -> (Vec<Int3>, Vec<Int3>) {
    let mut left = Vec::with_capacity(nodes.len() + 2);
    let mut right = Vec::with_capacity(nodes.len() + 2);
    left.push(start);
    right.push(start);
    for pair in nodes.windows(2) {
        if !set.portal(pair[0], pair[1], &mut left, &mut right) {
            for &idx in pair {
                if let Some(node) = set.node(idx) {
                    left.push(node.position);
                    right.push(node.position);
                }
            }
        }
    }
    left.push(end);
    right.push(end);
    (left, right)
}

/// Tighten the string through the portal lists.
///
/// Orientation of the lists is detected from the first non-degenerate
/// portal and fixed up by swapping, so callers need not care which side
/// they collected as "left".
pub fn run_funnel(mut left: Vec<Int3>, mut right: Vec<Int3>) -> Vec<Int3> {
    debug_assert_eq!(left.len(), right.len());

    collapse_duplicates(&mut left, &mut right);

    // Too short to even hold distinct start and end points.
    if left.len() < 2 {
        return left;
    }

    // Start, end and at most one real portal: the straight line fits.
    if left.len() < 4 {
        let start = left[0];
        let end = *left.last().expect("portal lists are never empty");
        return vec![start, end];
    }

    // The invariant below wants the left boundary counterclockwise of the
    // right one as seen from the apex.
    for i in 1..left.len() {
        match cross_xz(left[0], right[i], left[i]) {
            0 => continue,
            c if c < 0 => {
                std::mem::swap(&mut left, &mut right);
                break;
            }
            _ => break,
        }
    }

    let mut out = vec![left[0]];
    let mut apex = left[0];
    let mut apex_index = 0usize;
    let mut funnel_left = left[1];
    let mut left_index = 1usize;
    let mut funnel_right = right[1];
    let mut right_index = 1usize;

    let mut i = 2;
    while i < left.len() {
        if out.len() >= MAX_FUNNEL_VERTICES {
            warn!(
                "funnel output capped at {MAX_FUNNEL_VERTICES} vertices; \
                 portal geometry is likely corrupt"
            );
            break;
        }
        let pl = left[i];
        let pr = right[i];

        // Right boundary: tighten if the new point narrows the funnel.
        if cross_xz(apex, funnel_right, pr) >= 0 {
            if apex == funnel_right || cross_xz(apex, funnel_left, pr) <= 0 {
                funnel_right = pr;
                right_index = i;
            } else {
                // Crossed over the left boundary: the left point becomes a
                // corner of the path and the scan restarts after it.
                out.push(funnel_left);
                apex = funnel_left;
                apex_index = left_index;
                funnel_left = apex;
                funnel_right = apex;
                right_index = apex_index;
                i = apex_index + 1;
                continue;
            }
        }

        // Left boundary, mirrored.
        if cross_xz(apex, funnel_left, pl) <= 0 {
            if apex == funnel_left || cross_xz(apex, funnel_right, pl) >= 0 {
                funnel_left = pl;
                left_index = i;
            } else {
                out.push(funnel_right);
                apex = funnel_right;
                apex_index = right_index;
                funnel_left = apex;
                funnel_right = apex;
                left_index = apex_index;
                i = apex_index + 1;
                continue;
            }
        }

        i += 1;
    }

    let end = *left.last().expect("portal lists are never empty");
    if *out.last().expect("seeded with the start point") != end {
        out.push(end);
    }
    out
}

/// Drop consecutive identical portals in place, keeping the lists paired.
fn collapse_duplicates(left: &mut Vec<Int3>, right: &mut Vec<Int3>) {
    let mut write = 1;
    for read in 1..left.len() {
        if left[read] == left[write - 1] && right[read] == right[write - 1] {
            continue;
        }
        left[write] = left[read];
        right[write] = right[read];
        write += 1;
    }
    left.truncate(write);
    right.truncate(write);
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_core::{GraphSet, GridShape, NodeIndex};

    fn path_length(points: &[Int3]) -> u64 {
        points
            .windows(2)
            .map(|w| Int3::distance(w[0], w[1]) as u64)
            .sum()
    }

    #[test]
    fn straight_corridor_collapses_to_two_points() {
        // Unit-cell corridor along X; every portal is a vertical slit the
        // straight line passes through.
        let mut left = vec![Int3::ZERO];
        let mut right = vec![Int3::ZERO];
        for x in 1..10 {
            left.push(Int3::new(x * 1000 - 500, 0, 500));
            right.push(Int3::new(x * 1000 - 500, 0, -500));
        }
        let end = Int3::new(9000, 0, 0);
        left.push(end);
        right.push(end);

        let out = run_funnel(left, right);
        assert_eq!(out, vec![Int3::ZERO, end]);
    }

    #[test]
    fn swapped_sides_self_correct() {
        let mut left = vec![Int3::ZERO];
        let mut right = vec![Int3::ZERO];
        for x in 1..10 {
            // Deliberately inverted: "left" below the travel axis.
            left.push(Int3::new(x * 1000 - 500, 0, -500));
            right.push(Int3::new(x * 1000 - 500, 0, 500));
        }
        let end = Int3::new(9000, 0, 0);
        left.push(end);
        right.push(end);

        let out = run_funnel(left, right);
        assert_eq!(out, vec![Int3::ZERO, end]);
    }

    #[test]
    fn u_turn_corridor_bends_at_the_inner_corner() {
        // Four unit quads forming a U: east, north, then west. The string
        // must wrap around the shared inner corner at (1000, 1000).
        let corner = Int3::new(1000, 0, 1000);
        let start = Int3::new(500, 0, 500);
        let end = Int3::new(500, 0, 1500);
        let left = vec![
            start,
            corner,
            corner,
            corner,
            end,
        ];
        let right = vec![
            start,
            Int3::new(1000, 0, 0),
            Int3::new(2000, 0, 1000),
            Int3::new(1000, 0, 2000),
            end,
        ];

        let out = run_funnel(left.clone(), right.clone());
        assert_eq!(out, vec![start, corner, end]);

        // Strictly shorter than visiting the quad centers.
        let centers = vec![
            start,
            Int3::new(1500, 0, 500),
            Int3::new(1500, 0, 1500),
            end,
        ];
        assert!(path_length(&out) < path_length(&centers));
    }

    #[test]
    fn zig_zag_strip_stays_inside_and_beats_centers() {
        // Four unit quads kinking left then right: east, north, then east.
        // Portals, in travel order, with start low in the first quad and
        // end high in the last.
        let start = Int3::new(500, 0, 100);
        let end = Int3::new(2500, 0, 1900);
        let left = vec![
            start,
            Int3::new(1000, 0, 1000),
            Int3::new(1000, 0, 1000),
            Int3::new(2000, 0, 2000),
            end,
        ];
        let right = vec![
            start,
            Int3::new(1000, 0, 0),
            Int3::new(2000, 0, 1000),
            Int3::new(2000, 0, 1000),
            end,
        ];

        let out = run_funnel(left, right);
        // The diagonal threads every portal, so no corner is emitted.
        assert_eq!(out, vec![start, end]);

        let centers = vec![
            start,
            Int3::new(1500, 0, 500),
            Int3::new(1500, 0, 1500),
            end,
        ];
        assert!(path_length(&out) <= path_length(&centers));
        // Within the corridor bounds.
        for p in &out {
            assert!(p.x >= 0 && p.x <= 3000);
            assert!(p.z >= 0 && p.z <= 2000);
        }
    }

    #[test]
    fn degenerate_duplicate_portals_collapse() {
        let p = Int3::new(1000, 0, 0);
        let left = vec![Int3::ZERO, p, p, p, Int3::new(2000, 0, 0)];
        let right = vec![Int3::ZERO, p, p, p, Int3::new(2000, 0, 0)];
        // After collapsing, only start / one portal / end remain.
        let out = run_funnel(left, right);
        assert_eq!(out, vec![Int3::ZERO, Int3::new(2000, 0, 0)]);
    }

    #[test]
    fn single_portal_is_a_straight_line() {
        let out = run_funnel(
            vec![Int3::ZERO, Int3::new(5000, 0, 1000)],
            vec![Int3::ZERO, Int3::new(5000, 0, 1000)],
        );
        assert_eq!(out, vec![Int3::ZERO, Int3::new(5000, 0, 1000)]);
    }

    #[test]
    fn grid_corridor_portals_thread_the_string() {
        // 3x3 grid with the center blocked: an L-shaped route around it.
        let mut set = GraphSet::new();
        set.add_grid_graph(
            GridShape {
                width: 3,
                depth: 3,
                cell_size: 1000,
                origin: Int3::ZERO,
            },
            false,
        );
        set.set_walkable(NodeIndex(4), false);
        set.recompute_areas();

        // (0,0) -> (1,0) -> (2,0) -> (2,1) -> (2,2)
        let nodes = [
            NodeIndex(0),
            NodeIndex(1),
            NodeIndex(2),
            NodeIndex(5),
            NodeIndex(8),
        ];
        let start = Int3::ZERO;
        let end = Int3::new(2000, 0, 2000);
        let out = string_pull(&set, &nodes, start, end);

        assert_eq!(out.first(), Some(&start));
        assert_eq!(out.last(), Some(&end));
        // Shorter than the center-to-center walk.
        let centers: Vec<Int3> = std::iter::once(start)
            .chain(nodes[1..4].iter().map(|&n| set.node(n).unwrap().position))
            .chain(std::iter::once(end))
            .collect();
        assert!(path_length(&out) < path_length(&centers));
        // Every output point stays inside the grid bounds.
        for p in &out {
            assert!(p.x >= -500 && p.x <= 2500, "{p} outside corridor");
            assert!(p.z >= -500 && p.z <= 2500, "{p} outside corridor");
        }
    }

    #[test]
    fn short_corridor_falls_back_to_straight_line() {
        // One real portal after collapsing: below the 4-pair minimum.
        let b = Int3::new(1000, 0, 1000);
        let out = run_funnel(
            vec![Int3::ZERO, b, Int3::new(2000, 0, 0)],
            vec![Int3::ZERO, b, Int3::new(2000, 0, 0)],
        );
        assert_eq!(out, vec![Int3::ZERO, Int3::new(2000, 0, 0)]);
    }

    #[test]
    fn undersized_portal_lists_come_back_unchanged() {
        assert_eq!(run_funnel(Vec::new(), Vec::new()), Vec::<Int3>::new());
        assert_eq!(
            run_funnel(vec![Int3::ZERO], vec![Int3::ZERO]),
            vec![Int3::ZERO]
        );
    }

    #[test]
    fn point_nodes_without_portals_pin_the_string() {
        let mut set = GraphSet::new();
        let g = set.add_point_graph();
        let a = set.add_point_node(g, Int3::ZERO, true);
        let b = set.add_point_node(g, Int3::new(1000, 0, 1000), true);
        let c = set.add_point_node(g, Int3::new(2000, 0, 1000), true);
        let d = set.add_point_node(g, Int3::new(3000, 0, 0), true);
        set.connect(a, b, 1414);
        set.connect(b, c, 1000);
        set.connect(c, d, 1414);

        let out = string_pull(&set, &[a, b, c, d], Int3::ZERO, Int3::new(3000, 0, 0));
        // Zero-width fallback portals pin the string through both centers.
        assert_eq!(
            out,
            vec![
                Int3::ZERO,
                Int3::new(1000, 0, 1000),
                Int3::new(2000, 0, 1000),
                Int3::new(3000, 0, 0),
            ]
        );
    }
}
