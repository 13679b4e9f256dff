//! The A* search pipeline.
//!
//! A search runs in three phases against a read-locked graph set:
//!
//! 1. [`prepare`] resolves the endpoint nodes and rejects impossible
//!    requests (different connectivity areas) in O(1), before any expansion.
//! 2. [`initialize`] binds a [`SearchState`] and seeds the open queue.
//! 3. [`step`] expands up to a budget of nodes, so callers can interleave
//!    cancellation checks; [`search_blocking`] just loops it.
//!
//! Costs accumulate in `u32` lattice units with saturating arithmetic. The
//! expansion counter is capped: a graph that legitimately needs more than
//! [`MAX_EXPANSIONS`] expansions is indistinguishable from a cost underflow
//! bug, and the cap turns both into a reported error instead of a hang.

use log::debug;
use skein_core::{GraphSet, Int3, NearestNode, NodeIndex, PRECISION};

use crate::funnel;
use crate::path::{Path, PathError, PathState, Phase};
use crate::state::SearchState;

/// Hard cap on node expansions per search.
pub const MAX_EXPANSIONS: u32 = 1_000_000;

/// Default expansions per [`step`] slice; cancellation latency in
/// expansions.
pub const CHECKPOINT_INTERVAL: u32 = 512;

/// Outcome of one [`step`] call.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StepResult {
    /// Budget exhausted, more expansions pending.
    InProgress,
    /// The path reached a terminal state (complete, partial or error).
    Finished,
}

/// Resolve endpoints and vet the request. Returns `false` when the path was
/// moved to a terminal state without searching.
///
/// On success the endpoint points are clamped onto their nodes, so the rest
/// of the pipeline never sees a point outside the graph.
pub fn prepare(set: &GraphSet, path: &mut Path) -> bool {
    debug_assert_eq!(path.phase, Phase::Created);

    let Some(start) = set.nearest(path.start_point, &path.filter) else {
        path.complete_err(PathError::NoStartNode);
        return false;
    };
    let Some(end) = set.nearest(path.end_point, &path.filter) else {
        path.complete_err(PathError::NoEndNode);
        return false;
    };
    path.start_node = start.node;
    path.end_node = end.node;
    path.start_point = start.position;
    path.end_point = end.position;

    let start_node = set.node(start.node).expect("nearest returns live nodes");
    let end_node = set.node(end.node).expect("nearest returns live nodes");
    if !path.traversal.can_traverse(start_node) || !path.traversal.can_traverse(end_node) {
        path.complete_err(PathError::NodeNotTraversable);
        return false;
    }

    // O(1) reachability rejection, no expansions spent. Skipped for partial
    // requests, which want the closest approach instead of an error.
    if !path.allow_partial && start_node.flags.area() != end_node.flags.area() {
        path.complete_err(PathError::NoRouteArea);
        return false;
    }

    if start.node == end.node {
        path.node_path.push(start.node);
        path.vector_path.push(path.start_point);
        path.vector_path.push(path.end_point);
        path.cost = Int3::distance(path.start_point, path.end_point);
        path.complete_ok(PathState::Complete);
        return false;
    }

    path.phase = Phase::Prepared;
    true
}

/// Heuristic estimate from `point` to the path's end, with the path's
/// fixed-point scale applied.
fn scaled_h(path: &Path, point: Int3) -> u32 {
    let h = path.heuristic.estimate(point, path.end_point) as u64;
    (h * path.heuristic_scale as u64 / PRECISION as u64).min(u32::MAX as u64) as u32
}

/// Bind the working state and seed the open queue with the start node.
pub fn initialize(set: &GraphSet, state: &mut SearchState, path: &mut Path) {
    debug_assert_eq!(path.phase, Phase::Prepared);
    state.ensure_capacity(set.capacity());
    let id = state.new_search_id();

    let start = path.start_node;
    let h = scaled_h(path, path.start_point);
    let e = state.entry_mut(start);
    e.search_id = id;
    e.g = 0;
    e.h = h;
    e.parent = NodeIndex::NONE;
    e.closed = true;
    path.best_h = h;
    path.best_h_node = start;

    open(set, state, path, start);
    path.phase = Phase::Initialized;
}

/// Expand one node: relax every outgoing connection.
fn open(set: &GraphSet, state: &mut SearchState, path: &mut Path, from: NodeIndex) {
    let from_pos = set.node(from).expect("expanding a live node").position;
    let from_g = state.entry(from).g;
    let id = state.search_id;

    set.for_each_connection(from, |n, base_cost| {
        let Some(target) = set.node(n) else {
            return;
        };
        if !path.traversal.can_traverse(target) {
            return;
        }
        if state.is_current(n) && state.entry(n).closed {
            return;
        }

        // Connections touching an endpoint are charged from the exact
        // request point, not the node center.
        let step_cost = if from == path.start_node && n == path.end_node {
            Int3::distance(path.start_point, path.end_point)
        } else if from == path.start_node {
            Int3::distance(path.start_point, target.position)
        } else if n == path.end_node {
            Int3::distance(from_pos, path.end_point)
        } else {
            base_cost
        };

        let g = from_g
            .saturating_add(step_cost)
            .saturating_add(path.traversal.entry_penalty(target));

        if state.is_current(n) {
            let e = state.entry_mut(n);
            if g < e.g {
                e.g = g;
                e.parent = from;
                let f = g.saturating_add(e.h);
                state.push_open(n, f);
            }
        } else {
            let h = scaled_h(path, target.position);
            let e = state.entry_mut(n);
            e.search_id = id;
            e.g = g;
            e.h = h;
            e.parent = from;
            e.closed = false;
            state.push_open(n, g.saturating_add(h));
            if h < path.best_h {
                path.best_h = h;
                path.best_h_node = n;
            }
        }
    });
}

/// Expand up to `budget` nodes. Checks the cancellation flag once per call,
/// so the budget doubles as the cancellation latency in expansions.
pub fn step(set: &GraphSet, state: &mut SearchState, path: &mut Path, budget: u32) -> StepResult {
    debug_assert_eq!(path.phase, Phase::Initialized);

    if path.is_cancelled() {
        path.complete_err(PathError::Cancelled);
        return StepResult::Finished;
    }

    for _ in 0..budget {
        let Some(head) = state.pop_open() else {
            finish_exhausted(set, state, path);
            return StepResult::Finished;
        };
        let n = head.node;
        // A relaxation pushes a duplicate instead of a decrease-key; the
        // closed check discards the stale copies.
        if state.entry(n).closed {
            continue;
        }

        if n == path.end_node {
            trace(set, state, path, n, true);
            path.complete_ok(PathState::Complete);
            return StepResult::Finished;
        }

        state.entry_mut(n).closed = true;
        path.expansions += 1;
        if path.expansions > MAX_EXPANSIONS {
            path.complete_err(PathError::ProbableInfiniteLoop);
            return StepResult::Finished;
        }
        open(set, state, path, n);
    }
    StepResult::InProgress
}

fn finish_exhausted(set: &GraphSet, state: &SearchState, path: &mut Path) {
    if path.allow_partial && path.best_h_node != NodeIndex::NONE {
        let best = path.best_h_node;
        trace(set, state, path, best, false);
        path.complete_ok(PathState::Partial);
        debug!(
            "path {} partial after {} expansions, best h {}",
            path.seq, path.expansions, path.best_h
        );
    } else {
        path.complete_err(PathError::SearchSpaceExhausted);
    }
}

/// Walk parent links back from `last` and build both result paths.
fn trace(set: &GraphSet, state: &SearchState, path: &mut Path, last: NodeIndex, complete: bool) {
    path.cost = state.entry(last).g;
    path.node_path.clear();
    let mut n = last;
    while n != NodeIndex::NONE {
        path.node_path.push(n);
        n = state.entry(n).parent;
    }
    path.node_path.reverse();

    let end_point = if complete {
        path.end_point
    } else {
        // Partial paths stop at the closest approach; its node center is
        // the best end point available.
        set.node(last).expect("traced node is live").position
    };

    path.vector_path.clear();
    if path.use_funnel {
        path.vector_path =
            funnel::string_pull(set, &path.node_path, path.start_point, end_point);
    } else {
        path.vector_path.push(path.start_point);
        if path.node_path.len() > 2 {
            for &idx in &path.node_path[1..path.node_path.len() - 1] {
                if let Some(node) = set.node(idx) {
                    path.vector_path.push(node.position);
                }
            }
        }
        path.vector_path.push(end_point);
    }
}

/// Run a whole search on the calling thread, checking cancellation every
/// [`CHECKPOINT_INTERVAL`] expansions. The path ends in a terminal state;
/// its callback is *not* invoked (that is the processor's job).
pub fn search_blocking(set: &GraphSet, state: &mut SearchState, path: &mut Path) {
    if !prepare(set, path) {
        return;
    }
    initialize(set, state, path);
    while step(set, state, path, CHECKPOINT_INTERVAL) == StepResult::InProgress {}
}
