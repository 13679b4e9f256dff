//! Path objects and their pooled lifecycle.
//!
//! A [`Path`] is a heap-allocated request/result bundle that travels from
//! the caller to a worker and back. Pooling via [`PathPool`] keeps the
//! steady-state allocation rate at zero; the price is that [`Path::reset`]
//! must clear *every* field, because a recycled path carrying stale state
//! from its previous use is the classic pooling bug.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use skein_core::{Int3, NodeFilter, NodeIndex, PRECISION};
use thiserror::Error;

use crate::heuristic::{Heuristic, Traversal};

/// Why a search produced no complete route.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("no node found near the start point")]
    NoStartNode,
    #[error("no node found near the end point")]
    NoEndNode,
    #[error("endpoint node is not traversable under the current policy")]
    NodeNotTraversable,
    #[error("start and end lie in different connectivity areas")]
    NoRouteArea,
    #[error("open queue exhausted before reaching the end node")]
    SearchSpaceExhausted,
    #[error("expansion limit hit; graph is larger than the engine supports or a cost underflows")]
    ProbableInfiniteLoop,
    #[error("path was cancelled")]
    Cancelled,
}

/// Externally visible lifecycle state.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum PathState {
    #[default]
    NotCalculated,
    /// The trace reached the end node.
    Complete,
    /// Search space ran out but partial results were requested; the path
    /// leads to the node with the lowest heuristic seen.
    Partial,
    Error,
}

/// Internal pipeline position, driven by the search functions.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) enum Phase {
    #[default]
    Created,
    Prepared,
    Initialized,
    Done,
}

/// Handle for cancelling an in-flight path from another thread.
///
/// Cancellation is cooperative: the search observes the flag at expansion
/// checkpoints, so the path still comes back through its callback, in the
/// error state.
#[derive(Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Completion callback, invoked on the thread that finished the path.
pub type PathCallback = Box<dyn FnOnce(&mut Path) + Send>;

/// One pathfinding request and, after processing, its result.
pub struct Path {
    /// Monotonic id assigned at claim time, for correlating logs.
    pub seq: u64,
    pub start_point: Int3,
    pub end_point: Int3,
    /// Endpoint lookup policy.
    pub filter: NodeFilter,
    /// Expansion policy.
    pub traversal: Traversal,
    pub heuristic: Heuristic,
    /// Heuristic multiplier in [`PRECISION`]-scaled fixed point
    /// (1000 = 1.0). Above 1.0 the estimate overweighs accumulated cost,
    /// trading optimality for fewer expansions.
    pub heuristic_scale: u32,
    /// Accept a best-effort path to the lowest-H node when the end is
    /// unreachable, instead of erroring.
    pub allow_partial: bool,
    /// Post-process the node sequence with the funnel algorithm; otherwise
    /// the vector path is node centers with exact endpoints.
    pub use_funnel: bool,

    pub(crate) start_node: NodeIndex,
    pub(crate) end_node: NodeIndex,
    pub(crate) phase: Phase,
    state: PathState,
    error: Option<PathError>,

    /// Traversed node sequence, start to end.
    pub(crate) node_path: Vec<NodeIndex>,
    /// Point sequence, start to end.
    pub(crate) vector_path: Vec<Int3>,
    pub(crate) cost: u32,

    /// Lowest heuristic seen and where, for partial fallback.
    pub(crate) best_h: u32,
    pub(crate) best_h_node: NodeIndex,
    pub(crate) expansions: u32,

    cancelled: Arc<AtomicBool>,
    pub(crate) callback: Option<PathCallback>,
}

impl Path {
    pub fn new(start_point: Int3, end_point: Int3) -> Self {
        Self {
            seq: 0,
            start_point,
            end_point,
            filter: NodeFilter::default(),
            traversal: Traversal::default(),
            heuristic: Heuristic::default(),
            heuristic_scale: PRECISION as u32,
            allow_partial: false,
            use_funnel: false,
            start_node: NodeIndex::NONE,
            end_node: NodeIndex::NONE,
            phase: Phase::Created,
            state: PathState::NotCalculated,
            error: None,
            node_path: Vec::new(),
            vector_path: Vec::new(),
            cost: 0,
            best_h: u32::MAX,
            best_h_node: NodeIndex::NONE,
            expansions: 0,
            cancelled: Arc::new(AtomicBool::new(false)),
            callback: None,
        }
    }

    /// Return the path to its just-constructed state, keeping allocations.
    ///
    /// Every field is touched here. When adding a field to `Path`, add its
    /// reset line too.
    pub fn reset(&mut self, start_point: Int3, end_point: Int3) {
        self.seq = 0;
        self.start_point = start_point;
        self.end_point = end_point;
        self.filter = NodeFilter::default();
        self.traversal = Traversal::default();
        self.heuristic = Heuristic::default();
        self.heuristic_scale = PRECISION as u32;
        self.allow_partial = false;
        self.use_funnel = false;
        self.start_node = NodeIndex::NONE;
        self.end_node = NodeIndex::NONE;
        self.phase = Phase::Created;
        self.state = PathState::NotCalculated;
        self.error = None;
        self.node_path.clear();
        self.vector_path.clear();
        self.cost = 0;
        self.best_h = u32::MAX;
        self.best_h_node = NodeIndex::NONE;
        self.expansions = 0;
        // A fresh flag, not a store: tokens handed out for the previous use
        // must not be able to cancel whoever claims this path next.
        self.cancelled = Arc::new(AtomicBool::new(false));
        self.callback = None;
    }

    #[inline]
    pub fn state(&self) -> PathState {
        self.state
    }

    #[inline]
    pub fn error(&self) -> Option<&PathError> {
        self.error.as_ref()
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }

    /// Traversed nodes, start to end. Empty until complete or partial.
    #[inline]
    pub fn nodes(&self) -> &[NodeIndex] {
        &self.node_path
    }

    /// Point path, start to end. Empty until complete or partial.
    #[inline]
    pub fn vector_path(&self) -> &[Int3] {
        &self.vector_path
    }

    /// Total traversal cost in lattice units.
    #[inline]
    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Expansions performed, for diagnostics.
    #[inline]
    pub fn expansions(&self) -> u32 {
        self.expansions
    }

    pub fn cancel_token(&self) -> CancelToken {
        CancelToken(Arc::clone(&self.cancelled))
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Register the completion callback. Runs exactly once, on the thread
    /// that finishes the path.
    pub fn on_complete(&mut self, f: impl FnOnce(&mut Path) + Send + 'static) {
        self.callback = Some(Box::new(f));
    }

    pub(crate) fn complete_ok(&mut self, state: PathState) {
        debug_assert!(matches!(state, PathState::Complete | PathState::Partial));
        self.state = state;
        self.error = None;
        self.phase = Phase::Done;
    }

    pub(crate) fn complete_err(&mut self, error: PathError) {
        self.state = PathState::Error;
        self.error = Some(error);
        self.phase = Phase::Done;
    }
}

// ---------------------------------------------------------------------------
// PathPool
// ---------------------------------------------------------------------------

/// Free-list of boxed paths. Claiming resets the path and stamps a fresh
/// sequence number; reclaiming just shelves the box.
#[derive(Default)]
pub struct PathPool {
    free: Mutex<Vec<Box<Path>>>,
    next_seq: AtomicU64,
}

impl PathPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&self, start_point: Int3, end_point: Int3) -> Box<Path> {
        let mut path = self
            .free
            .lock()
            .pop()
            .unwrap_or_else(|| Box::new(Path::new(start_point, end_point)));
        path.reset(start_point, end_point);
        path.seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        path
    }

    /// [`claim`](Self::claim) with the completion callback attached.
    pub fn claim_with(
        &self,
        start_point: Int3,
        end_point: Int3,
        callback: impl FnOnce(&mut Path) + Send + 'static,
    ) -> Box<Path> {
        let mut path = self.claim(start_point, end_point);
        path.on_complete(callback);
        path
    }

    pub fn reclaim(&self, path: Box<Path>) {
        self.free.lock().push(path);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.free.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pollute(p: &mut Path) {
        p.seq = 99;
        p.filter.require_walkable = false;
        p.filter.tag_mask = 0;
        p.traversal.tag_mask = 0;
        p.traversal.tag_penalties[3] = 77;
        p.heuristic = Heuristic::Manhattan;
        p.heuristic_scale = 2000;
        p.allow_partial = true;
        p.use_funnel = true;
        p.start_node = NodeIndex(4);
        p.end_node = NodeIndex(9);
        p.phase = Phase::Initialized;
        p.node_path.push(NodeIndex(1));
        p.vector_path.push(Int3::new(1, 2, 3));
        p.cost = 1234;
        p.best_h = 5;
        p.best_h_node = NodeIndex(2);
        p.expansions = 42;
        p.on_complete(|_| {});
        p.cancel_token().cancel();
        p.complete_err(PathError::Cancelled);
    }

    #[test]
    fn reset_clears_every_field() {
        let mut p = Path::new(Int3::ZERO, Int3::ZERO);
        pollute(&mut p);
        p.reset(Int3::new(10, 0, 0), Int3::new(20, 0, 0));

        assert_eq!(p.seq, 0);
        assert_eq!(p.start_point, Int3::new(10, 0, 0));
        assert_eq!(p.end_point, Int3::new(20, 0, 0));
        assert!(p.filter.require_walkable);
        assert_eq!(p.filter.tag_mask, u32::MAX);
        assert_eq!(p.traversal.tag_mask, u32::MAX);
        assert_eq!(p.traversal.tag_penalties, [0; 32]);
        assert_eq!(p.heuristic, Heuristic::Euclidean);
        assert_eq!(p.heuristic_scale, 1000);
        assert!(!p.allow_partial);
        assert!(!p.use_funnel);
        assert_eq!(p.start_node, NodeIndex::NONE);
        assert_eq!(p.end_node, NodeIndex::NONE);
        assert_eq!(p.phase, Phase::Created);
        assert_eq!(p.state(), PathState::NotCalculated);
        assert!(p.error().is_none());
        assert!(p.nodes().is_empty());
        assert!(p.vector_path().is_empty());
        assert_eq!(p.cost(), 0);
        assert_eq!(p.best_h, u32::MAX);
        assert_eq!(p.best_h_node, NodeIndex::NONE);
        assert_eq!(p.expansions(), 0);
        assert!(!p.is_cancelled());
        assert!(p.callback.is_none());
    }

    #[test]
    fn stale_cancel_token_does_not_reach_recycled_path() {
        let mut p = Path::new(Int3::ZERO, Int3::ZERO);
        let old_token = p.cancel_token();
        p.reset(Int3::ZERO, Int3::ZERO);
        old_token.cancel();
        assert!(!p.is_cancelled());
    }

    #[test]
    fn pool_recycles_and_stamps_fresh_seq() {
        let pool = PathPool::new();
        let a = pool.claim(Int3::ZERO, Int3::ZERO);
        let seq_a = a.seq;
        pool.reclaim(a);
        assert_eq!(pool.len(), 1);

        let b = pool.claim(Int3::new(1, 0, 0), Int3::ZERO);
        assert_eq!(pool.len(), 0);
        assert_ne!(b.seq, seq_a);
        assert_eq!(b.start_point, Int3::new(1, 0, 0));
        assert_eq!(b.state(), PathState::NotCalculated);
    }

    #[test]
    fn error_message_matches_variant() {
        let mut p = Path::new(Int3::ZERO, Int3::ZERO);
        assert!(p.error_message().is_none());
        p.complete_err(PathError::NoRouteArea);
        assert_eq!(p.state(), PathState::Error);
        assert!(p.error_message().unwrap().contains("areas"));
    }
}
