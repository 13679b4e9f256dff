//! Reusable per-search working state.
//!
//! A [`SearchState`] is allocated once per worker and reused for every
//! search it runs. Clearing between searches is O(1): the search id is
//! bumped and a scratch entry is only meaningful when its stamp matches the
//! current id, so stale entries from earlier searches are simply ignored.

use std::collections::BinaryHeap;

use parking_lot::Mutex;
use skein_core::NodeIndex;

/// Per-node scratch data, valid only while `search_id` matches the owning
/// state's current id.
#[derive(Clone)]
pub(crate) struct ScratchNode {
    pub(crate) search_id: u32,
    /// Accumulated cost from the start node (G).
    pub(crate) g: u32,
    /// Heuristic estimate to the target (H).
    pub(crate) h: u32,
    /// Node that produced the best known path here.
    pub(crate) parent: NodeIndex,
    pub(crate) closed: bool,
}

impl Default for ScratchNode {
    fn default() -> Self {
        Self {
            search_id: 0,
            g: 0,
            h: 0,
            parent: NodeIndex::NONE,
            closed: false,
        }
    }
}

/// Reference into the scratch table, ordered by `f` for use in `BinaryHeap`.
#[derive(Clone, Copy, Eq, PartialEq)]
pub(crate) struct HeapRef {
    pub(crate) node: NodeIndex,
    pub(crate) f: u32,
}

impl Ord for HeapRef {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reverse so BinaryHeap (max-heap) pops smallest f first; break ties
        // on node index so pop order is deterministic.
        other
            .f
            .cmp(&self.f)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for HeapRef {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Scratch data for one in-flight search: the open queue and a per-node
/// table addressed by arena index.
///
/// Never shared between threads; each worker owns exactly one.
pub struct SearchState {
    pub(crate) nodes: Vec<ScratchNode>,
    pub(crate) heap: BinaryHeap<HeapRef>,
    pub(crate) search_id: u32,
}

impl Default for SearchState {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchState {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            heap: BinaryHeap::new(),
            search_id: 0,
        }
    }

    /// Grow the scratch table to cover `capacity` arena slots.
    pub(crate) fn ensure_capacity(&mut self, capacity: usize) {
        if self.nodes.len() < capacity {
            self.nodes.resize(capacity, ScratchNode::default());
        }
    }

    /// Start a new search: bump the id (logically clearing every entry) and
    /// empty the open queue.
    pub(crate) fn new_search_id(&mut self) -> u32 {
        self.search_id = self.search_id.wrapping_add(1);
        if self.search_id == 0 {
            // Wrapped all the way around: stamps from 2^32 searches ago
            // would read as current, so physically reset once.
            for n in self.nodes.iter_mut() {
                *n = ScratchNode::default();
            }
            self.search_id = 1;
        }
        self.heap.clear();
        self.search_id
    }

    /// Whether `idx`'s scratch entry belongs to the current search.
    #[inline]
    pub(crate) fn is_current(&self, idx: NodeIndex) -> bool {
        self.nodes[idx.index()].search_id == self.search_id
    }

    #[inline]
    pub(crate) fn entry(&self, idx: NodeIndex) -> &ScratchNode {
        &self.nodes[idx.index()]
    }

    #[inline]
    pub(crate) fn entry_mut(&mut self, idx: NodeIndex) -> &mut ScratchNode {
        &mut self.nodes[idx.index()]
    }

    #[inline]
    pub(crate) fn push_open(&mut self, node: NodeIndex, f: u32) {
        self.heap.push(HeapRef { node, f });
    }

    #[inline]
    pub(crate) fn pop_open(&mut self) -> Option<HeapRef> {
        self.heap.pop()
    }
}

// ---------------------------------------------------------------------------
// StatePool
// ---------------------------------------------------------------------------

/// Thread-safe free-list of [`SearchState`] instances for callers running
/// searches outside the processor's worker threads.
#[derive(Default)]
pub struct StatePool {
    free: Mutex<Vec<SearchState>>,
}

impl StatePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a state for the duration of one search. The guard returns it
    /// on drop, on every exit path.
    pub fn claim(&self) -> StateGuard<'_> {
        let state = self.free.lock().pop().unwrap_or_default();
        StateGuard {
            pool: self,
            state: Some(state),
        }
    }
}

/// Scoped checkout of a [`SearchState`]; see [`StatePool::claim`].
pub struct StateGuard<'a> {
    pool: &'a StatePool,
    state: Option<SearchState>,
}

impl std::ops::Deref for StateGuard<'_> {
    type Target = SearchState;
    fn deref(&self) -> &SearchState {
        self.state.as_ref().expect("state present until drop")
    }
}

impl std::ops::DerefMut for StateGuard<'_> {
    fn deref_mut(&mut self) -> &mut SearchState {
        self.state.as_mut().expect("state present until drop")
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            self.pool.free.lock().push(state);
        }
    }
}
