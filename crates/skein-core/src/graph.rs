//! Graphs and the [`GraphSet`] registry.
//!
//! All nodes, regardless of which graph owns them, live in one dense arena
//! indexed by [`NodeIndex`]. A graph is a thin descriptor (id, variant shape,
//! list of member indices); the owner id packed into each node's attribute
//! word maps it back to its graph. Every structural mutation goes through
//! `GraphSet` so connectivity dirty-marking happens in exactly one place.

use log::warn;

use crate::area::AreaTracker;
use crate::connection::{self, Connection};
use crate::flags::NodeFlags;
use crate::int3::Int3;
use crate::node::{Node, NodeIndex, NodeKind, PENALTY_WARN_THRESHOLD};

/// Id of a graph in the registry. Packed into each node's attribute word.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GraphId(pub u8);

/// Grid dimensions and cell geometry, shared by every cell of a grid graph.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GridShape {
    /// Cells along the X axis.
    pub width: u32,
    /// Cells along the Z axis.
    pub depth: u32,
    /// Cell edge length in lattice units.
    pub cell_size: i32,
    /// World position of the center of cell (0, 0).
    pub origin: Int3,
}

impl GridShape {
    #[inline]
    pub fn len(&self) -> usize {
        self.width as usize * self.depth as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.depth == 0
    }

    /// Center of cell `(cx, cz)`.
    #[inline]
    pub fn cell_center(&self, cx: u32, cz: u32) -> Int3 {
        self.origin + Int3::new(cx as i32 * self.cell_size, 0, cz as i32 * self.cell_size)
    }

    /// Split a flat cell index into `(cx, cz)`.
    #[inline]
    pub fn cell_coords(&self, cell: u32) -> (u32, u32) {
        (cell % self.width, cell / self.width)
    }
}

/// Direction deltas for grid neighbors: N, E, S, W, then NE, SE, SW, NW.
/// The first four are cardinal; `open_dirs` bit *i* corresponds to entry *i*.
pub const GRID_DIRS: [(i32, i32); 8] = [
    (0, 1),
    (1, 0),
    (0, -1),
    (-1, 0),
    (1, 1),
    (1, -1),
    (-1, -1),
    (-1, 1),
];

/// The direction index pointing back along direction `d`.
#[inline]
pub(crate) fn opposite_dir(d: usize) -> usize {
    if d < 4 { (d + 2) % 4 } else { (d - 4 + 2) % 4 + 4 }
}

/// Variant-specific graph data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GraphKind {
    /// Arbitrary point nodes with explicit links only.
    PointSet,
    /// A rectangular grid; cells occupy a contiguous block of the node
    /// arena starting at `base`, so implicit neighbors are index arithmetic.
    Grid { shape: GridShape, base: NodeIndex },
    /// Triangle mesh; geometry lives on the triangle nodes themselves.
    Mesh,
}

/// One graph: an owning collection of nodes of a single variant.
#[derive(Clone, Debug)]
pub struct Graph {
    pub id: GraphId,
    pub kind: GraphKind,
    /// Member indices in creation order; a node's position in this list is
    /// its graph-local index in the serialized form.
    pub(crate) nodes: Vec<NodeIndex>,
}

impl Graph {
    /// Member node indices in graph-local order.
    #[inline]
    pub fn nodes(&self) -> &[NodeIndex] {
        &self.nodes
    }
}

/// Walkability / tag requirements for nearest-node lookup.
#[derive(Copy, Clone, Debug)]
pub struct NodeFilter {
    pub require_walkable: bool,
    /// Bit *t* set = nodes with tag *t* are acceptable.
    pub tag_mask: u32,
}

impl Default for NodeFilter {
    fn default() -> Self {
        Self {
            require_walkable: true,
            tag_mask: u32::MAX,
        }
    }
}

impl NodeFilter {
    #[inline]
    pub fn accepts(&self, node: &Node) -> bool {
        if self.require_walkable && !node.walkable() {
            return false;
        }
        self.tag_mask & (1 << node.flags.tag()) != 0
    }
}

/// Result of a nearest-node query.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NearestHit {
    pub node: NodeIndex,
    /// Query point clamped onto the node (cell bounds for grid cells, the
    /// node center otherwise).
    pub position: Int3,
}

/// Seam for the nearest-node lookup service.
///
/// The search's prepare phase is a pure consumer of this trait; `GraphSet`
/// ships a linear-scan implementation and callers with large worlds can
/// substitute a spatially indexed one.
pub trait NearestNode {
    fn nearest(&self, point: Int3, filter: &NodeFilter) -> Option<NearestHit>;
}

/// Registry owning all graphs and the shared node arena.
#[derive(Default)]
pub struct GraphSet {
    pub(crate) graphs: Vec<Option<Graph>>,
    pub(crate) arena: Vec<Option<Node>>,
    pub(crate) free: Vec<NodeIndex>,
    pub(crate) areas: AreaTracker,
}

impl GraphSet {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Graph management
    // -----------------------------------------------------------------------

    fn push_graph(&mut self, kind: GraphKind) -> GraphId {
        assert!(self.graphs.len() < 256, "graph id space exhausted");
        let id = GraphId(self.graphs.len() as u8);
        self.graphs.push(Some(Graph {
            id,
            kind,
            nodes: Vec::new(),
        }));
        id
    }

    /// Create an empty point graph.
    pub fn add_point_graph(&mut self) -> GraphId {
        self.push_graph(GraphKind::PointSet)
    }

    /// Create an empty mesh graph.
    pub fn add_mesh_graph(&mut self) -> GraphId {
        self.push_graph(GraphKind::Mesh)
    }

    /// Create a grid graph with all cells allocated up front.
    ///
    /// Cells start walkable with every in-bounds direction open; pass
    /// `diagonals = false` for 4-neighbor connectivity. The cell block is
    /// contiguous in the arena (always appended, never recycled) so that
    /// implicit neighbor lookup is pure index arithmetic.
    pub fn add_grid_graph(&mut self, shape: GridShape, diagonals: bool) -> GraphId {
        let base = NodeIndex(self.arena.len() as u32);
        let id = self.push_graph(GraphKind::Grid { shape, base });

        let mut members = Vec::with_capacity(shape.len());
        for cell in 0..shape.len() as u32 {
            let (cx, cz) = shape.cell_coords(cell);
            let mut open_dirs = 0u8;
            let dir_count = if diagonals { 8 } else { 4 };
            for (d, &(dx, dz)) in GRID_DIRS.iter().enumerate().take(dir_count) {
                let nx = cx as i32 + dx;
                let nz = cz as i32 + dz;
                if nx >= 0 && nx < shape.width as i32 && nz >= 0 && nz < shape.depth as i32 {
                    open_dirs |= 1 << d;
                }
            }
            let mut flags = NodeFlags::for_graph(id);
            flags.set_walkable(true);
            let idx = NodeIndex(self.arena.len() as u32);
            self.arena.push(Some(Node {
                position: shape.cell_center(cx, cz),
                flags,
                penalty: 0,
                kind: NodeKind::Grid {
                    cell,
                    open_dirs,
                    links: Default::default(),
                },
            }));
            self.areas.mark_dirty(idx);
            members.push(idx);
        }
        self.graph_mut(id).nodes = members;
        id
    }

    /// Destroy a graph and every node it owns.
    pub fn remove_graph(&mut self, id: GraphId) {
        let Some(graph) = self.graphs.get_mut(id.0 as usize).and_then(Option::take) else {
            return;
        };
        for idx in graph.nodes {
            self.destroy_node(idx);
        }
    }

    /// Look up a graph by its id.
    pub fn graph(&self, id: GraphId) -> Option<&Graph> {
        self.graphs.get(id.0 as usize)?.as_ref()
    }

    fn graph_mut(&mut self, id: GraphId) -> &mut Graph {
        self.graphs[id.0 as usize].as_mut().expect("graph removed")
    }

    /// All live graphs.
    pub fn graphs(&self) -> impl Iterator<Item = &Graph> {
        self.graphs.iter().filter_map(Option::as_ref)
    }

    // -----------------------------------------------------------------------
    // Node management
    // -----------------------------------------------------------------------

    /// Number of arena slots (live or free). Sizes per-search scratch tables.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.arena.len()
    }

    /// Look up a node. `None` for destroyed or out-of-range indices.
    #[inline]
    pub fn node(&self, idx: NodeIndex) -> Option<&Node> {
        self.arena.get(idx.index())?.as_ref()
    }

    #[inline]
    pub(crate) fn node_mut(&mut self, idx: NodeIndex) -> Option<&mut Node> {
        self.arena.get_mut(idx.index())?.as_mut()
    }

    /// Iterate over all live nodes.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &Node)> {
        self.arena
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|n| (NodeIndex(i as u32), n)))
    }

    fn alloc(&mut self, node: Node) -> NodeIndex {
        match self.free.pop() {
            Some(idx) => {
                self.arena[idx.index()] = Some(node);
                idx
            }
            None => {
                let idx = NodeIndex(self.arena.len() as u32);
                self.arena.push(Some(node));
                idx
            }
        }
    }

    /// Add a point node to a point graph.
    pub fn add_point_node(&mut self, graph: GraphId, position: Int3, walkable: bool) -> NodeIndex {
        let mut flags = NodeFlags::for_graph(graph);
        flags.set_walkable(walkable);
        let idx = self.alloc(Node {
            position,
            flags,
            penalty: 0,
            kind: NodeKind::Point {
                links: Default::default(),
            },
        });
        self.graph_mut(graph).nodes.push(idx);
        self.areas.mark_dirty(idx);
        idx
    }

    /// Add a triangle node to a mesh graph. The node position is the
    /// triangle centroid.
    pub fn add_triangle_node(&mut self, graph: GraphId, vertices: [Int3; 3]) -> NodeIndex {
        let centroid = Int3::new(
            ((vertices[0].x as i64 + vertices[1].x as i64 + vertices[2].x as i64) / 3) as i32,
            ((vertices[0].y as i64 + vertices[1].y as i64 + vertices[2].y as i64) / 3) as i32,
            ((vertices[0].z as i64 + vertices[1].z as i64 + vertices[2].z as i64) / 3) as i32,
        );
        let mut flags = NodeFlags::for_graph(graph);
        flags.set_walkable(true);
        let idx = self.alloc(Node {
            position: centroid,
            flags,
            penalty: 0,
            kind: NodeKind::Triangle {
                vertices,
                links: Default::default(),
            },
        });
        self.graph_mut(graph).nodes.push(idx);
        self.areas.mark_dirty(idx);
        idx
    }

    /// Destroy a node: sever all links in both directions and recycle the
    /// index. Neighbors are dirtied for the connectivity tracker.
    pub fn destroy_node(&mut self, idx: NodeIndex) {
        if self.node(idx).is_none() {
            return;
        }
        self.clear_connections(idx, true);
        let node = self.arena[idx.index()].take().expect("checked above");
        let graph = node.flags.graph();
        if let Some(Some(g)) = self.graphs.get_mut(graph.0 as usize) {
            if let Some(pos) = g.nodes.iter().position(|&n| n == idx) {
                g.nodes.remove(pos);
            }
        }
        self.areas.forget(idx);
        self.free.push(idx);
    }

    // -----------------------------------------------------------------------
    // Connections and attributes
    // -----------------------------------------------------------------------

    /// Add (or update in place) a directed connection.
    ///
    /// Idempotent on target: a second call with the same endpoints
    /// overwrites the cost instead of creating a duplicate.
    pub fn add_connection(&mut self, from: NodeIndex, to: NodeIndex, cost: u32) {
        self.add_connection_with_edge(from, to, cost, None);
    }

    /// [`add_connection`](Self::add_connection) carrying a shared-edge id
    /// for the funnel's portal lookup.
    pub fn add_connection_with_edge(
        &mut self,
        from: NodeIndex,
        to: NodeIndex,
        cost: u32,
        edge: Option<u8>,
    ) {
        let Some(node) = self.node_mut(from) else {
            return;
        };
        connection::upsert(node.links_mut(), Connection { target: to, cost, edge });
        self.areas.mark_dirty(from);
        self.areas.mark_dirty(to);
    }

    /// Remove the directed connection `from -> to`. No-op if absent.
    pub fn remove_connection(&mut self, from: NodeIndex, to: NodeIndex) {
        let Some(node) = self.node_mut(from) else {
            return;
        };
        if connection::remove(node.links_mut(), to) {
            self.areas.mark_dirty(from);
            self.areas.mark_dirty(to);
        }
    }

    /// Convenience: two directed connections with the same cost.
    pub fn connect(&mut self, a: NodeIndex, b: NodeIndex, cost: u32) {
        self.add_connection(a, b, cost);
        self.add_connection(b, a, cost);
    }

    /// Remove all outgoing connections of `idx`; with `also_reverse`, every
    /// former neighbor additionally drops its link back (the node
    /// destruction path; skipping it leaves dangling indices).
    ///
    /// For grid cells this also closes the implicit directions, in both
    /// directions when `also_reverse` is set.
    pub fn clear_connections(&mut self, idx: NodeIndex, also_reverse: bool) {
        let Some(node) = self.node_mut(idx) else {
            return;
        };
        let links = std::mem::take(node.links_mut());

        // Close implicit grid directions.
        let mut grid_dirs = None;
        if let NodeKind::Grid { open_dirs, .. } = &mut node.kind {
            let dirs = *open_dirs;
            *open_dirs = 0;
            if also_reverse && dirs != 0 {
                grid_dirs = Some((node.flags.graph(), dirs));
            }
        }
        if let Some((graph, dirs)) = grid_dirs {
            for d in 0..8 {
                if dirs & (1 << d) == 0 {
                    continue;
                }
                let Some(neighbor) = self.grid_neighbor(graph, idx, d) else {
                    continue;
                };
                if let Some(n) = self.node_mut(neighbor) {
                    if let NodeKind::Grid { open_dirs, .. } = &mut n.kind {
                        *open_dirs &= !(1 << opposite_dir(d));
                    }
                }
                self.areas.mark_dirty(neighbor);
            }
        }

        if also_reverse {
            for conn in &links {
                if let Some(n) = self.node_mut(conn.target) {
                    connection::remove(n.links_mut(), idx);
                    self.areas.mark_dirty(conn.target);
                }
            }
        }
        self.areas.mark_dirty(idx);
    }

    /// Set walkability; dirties connectivity on change.
    pub fn set_walkable(&mut self, idx: NodeIndex, walkable: bool) {
        let Some(node) = self.node_mut(idx) else {
            return;
        };
        if node.flags.walkable() != walkable {
            node.flags.set_walkable(walkable);
            self.areas.mark_dirty(idx);
        }
    }

    /// Set the traversal penalty added to every path crossing this node.
    ///
    /// Values above [`PENALTY_WARN_THRESHOLD`] are accepted but flagged:
    /// they can overflow cost accumulation on long searches.
    pub fn set_penalty(&mut self, idx: NodeIndex, penalty: u32) {
        if penalty > PENALTY_WARN_THRESHOLD {
            warn!(
                "penalty {penalty} on node {} exceeds {PENALTY_WARN_THRESHOLD}; \
                 cost accumulation may overflow",
                idx.0
            );
        }
        if let Some(node) = self.node_mut(idx) {
            node.penalty = penalty;
        }
    }

    /// Set the traversal tag (0..32).
    pub fn set_tag(&mut self, idx: NodeIndex, tag: u32) {
        if let Some(node) = self.node_mut(idx) {
            node.flags.set_tag(tag);
        }
    }

    // -----------------------------------------------------------------------
    // Connection enumeration
    // -----------------------------------------------------------------------

    /// Implicit grid neighbor of `idx` in direction `d`, if in bounds.
    fn grid_neighbor(&self, graph: GraphId, idx: NodeIndex, d: usize) -> Option<NodeIndex> {
        let g = self.graph(graph)?;
        let GraphKind::Grid { shape, base } = &g.kind else {
            return None;
        };
        let cell = idx.0.checked_sub(base.0)?;
        let (cx, cz) = shape.cell_coords(cell);
        let (dx, dz) = GRID_DIRS[d];
        let nx = cx as i32 + dx;
        let nz = cz as i32 + dz;
        if nx < 0 || nx >= shape.width as i32 || nz < 0 || nz >= shape.depth as i32 {
            return None;
        }
        Some(NodeIndex(
            base.0 + (nz as u32) * shape.width + nx as u32,
        ))
    }

    /// Visit every connection of `idx` as `(neighbor, cost)` pairs: implicit
    /// grid neighbors first (flat offset table, no list indirection), then
    /// the custom link list.
    ///
    /// Single pass, not restartable; the enumeration is only valid for the
    /// duration of the call.
    #[inline]
    pub fn for_each_connection(&self, idx: NodeIndex, mut f: impl FnMut(NodeIndex, u32)) {
        let Some(node) = self.node(idx) else {
            return;
        };
        if let NodeKind::Grid { open_dirs, .. } = node.kind {
            let graph = node.flags.graph();
            if let Some(Graph {
                kind: GraphKind::Grid { shape, base },
                ..
            }) = self.graph(graph)
            {
                let straight = shape.cell_size as u32;
                // sqrt(2) in fixed point, rounded up: a diagonal step must
                // never cost less than its point-to-point distance or the
                // Euclidean heuristic stops being a lower bound.
                let diagonal = ((shape.cell_size as u64 * 1415 + 999) / 1000) as u32;
                let cell = idx.0 - base.0;
                let (cx, cz) = shape.cell_coords(cell);
                for (d, &(dx, dz)) in GRID_DIRS.iter().enumerate() {
                    if open_dirs & (1 << d) == 0 {
                        continue;
                    }
                    let nx = cx as i32 + dx;
                    let nz = cz as i32 + dz;
                    if nx < 0 || nx >= shape.width as i32 || nz < 0 || nz >= shape.depth as i32 {
                        continue;
                    }
                    let n = NodeIndex(base.0 + (nz as u32) * shape.width + nx as u32);
                    f(n, if d < 4 { straight } else { diagonal });
                }
            }
        }
        for conn in node.links() {
            f(conn.target, conn.cost);
        }
    }

    // -----------------------------------------------------------------------
    // Portals
    // -----------------------------------------------------------------------

    /// Append the shared-edge portal between `from` and `to` to `left` and
    /// `right`, oriented for travel `from -> to`.
    ///
    /// Returns `false` when the nodes share no edge geometry (the funnel
    /// then falls back to degenerate center portals).
    pub fn portal(
        &self,
        from: NodeIndex,
        to: NodeIndex,
        left: &mut Vec<Int3>,
        right: &mut Vec<Int3>,
    ) -> bool {
        let (Some(a), Some(b)) = (self.node(from), self.node(to)) else {
            return false;
        };
        match (&a.kind, &b.kind) {
            (NodeKind::Triangle { vertices, .. }, NodeKind::Triangle { .. }) => {
                // Forward edge first, then the mirrored reverse edge.
                if let Some(e) = connection::find(a.links(), to).and_then(|c| c.edge) {
                    let e = e as usize % 3;
                    left.push(vertices[e]);
                    right.push(vertices[(e + 1) % 3]);
                    return true;
                }
                if let Some(e) = connection::find(b.links(), from).and_then(|c| c.edge) {
                    let verts = b.triangle_vertices().expect("triangle node");
                    let e = e as usize % 3;
                    left.push(verts[(e + 1) % 3]);
                    right.push(verts[e]);
                    return true;
                }
                false
            }
            (NodeKind::Grid { .. }, NodeKind::Grid { .. })
                if a.flags.graph() == b.flags.graph() =>
            {
                let Some(Graph {
                    kind: GraphKind::Grid { shape, .. },
                    ..
                }) = self.graph(a.flags.graph())
                else {
                    return false;
                };
                let half = shape.cell_size / 2;
                let dx = (b.position.x - a.position.x) / shape.cell_size;
                let dz = (b.position.z - a.position.z) / shape.cell_size;
                let mid = Int3::new(
                    (a.position.x + b.position.x) / 2,
                    (a.position.y + b.position.y) / 2,
                    (a.position.z + b.position.z) / 2,
                );
                match (dx, dz) {
                    // Cardinal step: the shared border, left of travel first.
                    (dx, dz) if dx.abs() + dz.abs() == 1 => {
                        // Rotate the travel direction 90 degrees CCW in XZ.
                        let perp = Int3::new(-dz * half, 0, dx * half);
                        left.push(mid + perp);
                        right.push(mid - perp);
                        true
                    }
                    // Diagonal step: the shared corner, as a degenerate portal.
                    (dx, dz) if dx.abs() == 1 && dz.abs() == 1 => {
                        left.push(mid);
                        right.push(mid);
                        true
                    }
                    _ => false,
                }
            }
            _ => false,
        }
    }

    // -----------------------------------------------------------------------
    // Connectivity tracker plumbing
    // -----------------------------------------------------------------------

    /// Mark a node's connectivity dirty. O(1) amortized.
    pub fn mark_dirty(&mut self, idx: NodeIndex) {
        self.areas.mark_dirty(idx);
    }

    /// Recompute connected-component ids for all dirty regions.
    ///
    /// Must not run concurrently with a search; the processor calls this at
    /// pause points. Until it runs, area ids are stale by design.
    pub fn recompute_areas(&mut self) {
        let mut tracker = std::mem::take(&mut self.areas);
        tracker.recompute(self);
        self.areas = tracker;
    }
}

impl NearestNode for GraphSet {
    /// Linear scan over the arena. Adequate for moderate graphs and tests;
    /// large worlds should layer a spatial index over this seam.
    fn nearest(&self, point: Int3, filter: &NodeFilter) -> Option<NearestHit> {
        let mut best: Option<(u64, NearestHit)> = None;
        for (idx, node) in self.nodes() {
            if !filter.accepts(node) {
                continue;
            }
            let clamped = self.clamp_to_node(node, point);
            let d = (point - clamped).magnitude_sq();
            if best.is_none_or(|(bd, _)| d < bd) {
                best = Some((
                    d,
                    NearestHit {
                        node: idx,
                        position: clamped,
                    },
                ));
            }
        }
        best.map(|(_, hit)| hit)
    }
}

impl GraphSet {
    /// Clamp a query point onto a node's surface: the cell rectangle for
    /// grid cells, the node center otherwise.
    fn clamp_to_node(&self, node: &Node, point: Int3) -> Int3 {
        match node.kind {
            NodeKind::Grid { .. } => {
                let Some(Graph {
                    kind: GraphKind::Grid { shape, .. },
                    ..
                }) = self.graph(node.flags.graph())
                else {
                    return node.position;
                };
                let half = shape.cell_size / 2;
                Int3::new(
                    point.x.clamp(node.position.x - half, node.position.x + half),
                    node.position.y,
                    point.z.clamp(node.position.z - half, node.position.z + half),
                )
            }
            _ => node.position,
        }
    }
}
