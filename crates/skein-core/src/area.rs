//! Incremental connected-component ("area") tracking.
//!
//! Answers "can A reach B at all?" in O(1) by comparing the area ids stored
//! in the nodes' attribute words, so a search against an unreachable target
//! fails before expanding a single node.
//!
//! To avoid a whole-graph flood fill on every edit, nodes are grouped into
//! clusters of bounded size. Marking a node dirty enqueues its cluster;
//! [`AreaTracker::recompute`] rebuilds only the dirty clusters (a flood fill
//! over their detached members) and then relabels areas with a traversal of
//! the much smaller cluster graph.
//!
//! Freshness is the caller's responsibility: between a dirtying edit and the
//! next `recompute`, area ids are stale by design. The processor runs the
//! recompute at pause points, never concurrently with a search.

use crate::graph::GraphSet;
use crate::node::NodeIndex;

/// Upper bound on nodes per cluster. Rebuild cost after an edit is
/// proportional to the number of dirty clusters times this.
const CLUSTER_CAP: usize = 256;

const NO_CLUSTER: u32 = u32::MAX;

#[derive(Debug)]
struct Cluster {
    members: Vec<NodeIndex>,
    /// Adjacent cluster ids, deduplicated. Kept symmetric.
    neighbors: Vec<u32>,
    /// Area label from the last relabel pass.
    area: u32,
    dirty: bool,
}

/// Tracks the node → cluster assignment and the dirty queue.
#[derive(Debug, Default)]
pub(crate) struct AreaTracker {
    /// Cluster id per node index; `NO_CLUSTER` for unassigned (new,
    /// unwalkable or detached) nodes.
    node_cluster: Vec<u32>,
    clusters: Vec<Option<Cluster>>,
    free_clusters: Vec<u32>,
    dirty_clusters: Vec<u32>,
    /// Nodes dirtied while not belonging to any cluster.
    dirty_nodes: Vec<NodeIndex>,
}

impl AreaTracker {
    fn ensure(&mut self, idx: NodeIndex) {
        if idx.index() >= self.node_cluster.len() {
            self.node_cluster.resize(idx.index() + 1, NO_CLUSTER);
        }
    }

    /// O(1) amortized: queue the node (via its cluster, if any) for the next
    /// recompute pass.
    pub(crate) fn mark_dirty(&mut self, idx: NodeIndex) {
        self.ensure(idx);
        let c = self.node_cluster[idx.index()];
        if c == NO_CLUSTER {
            self.dirty_nodes.push(idx);
            return;
        }
        let cluster = self.clusters[c as usize].as_mut().expect("live cluster");
        if !cluster.dirty {
            cluster.dirty = true;
            self.dirty_clusters.push(c);
        }
    }

    /// Drop a destroyed node from its cluster bookkeeping.
    pub(crate) fn forget(&mut self, idx: NodeIndex) {
        self.ensure(idx);
        self.mark_dirty(idx);
        self.node_cluster[idx.index()] = NO_CLUSTER;
    }

    /// Whether any recompute work is pending.
    pub(crate) fn is_dirty(&self) -> bool {
        !self.dirty_clusters.is_empty() || !self.dirty_nodes.is_empty()
    }

    fn free_cluster(&mut self, id: u32) {
        let cluster = self.clusters[id as usize].take().expect("live cluster");
        for &n in &cluster.neighbors {
            if let Some(other) = self.clusters[n as usize].as_mut() {
                other.neighbors.retain(|&c| c != id);
            }
        }
        self.free_clusters.push(id);
    }

    fn alloc_cluster(&mut self, cluster: Cluster) -> u32 {
        match self.free_clusters.pop() {
            Some(id) => {
                self.clusters[id as usize] = Some(cluster);
                id
            }
            None => {
                self.clusters.push(Some(cluster));
                (self.clusters.len() - 1) as u32
            }
        }
    }

    /// Rebuild dirty clusters and relabel areas. Runs synchronously; cost is
    /// proportional to the detached region plus the cluster graph.
    pub(crate) fn recompute(&mut self, set: &mut GraphSet) {
        if !self.is_dirty() {
            return;
        }

        // Detach: dissolve every dirty cluster, returning its members to the
        // unassigned pool. They all become flood-fill seeds.
        let mut seeds = std::mem::take(&mut self.dirty_nodes);
        for c in std::mem::take(&mut self.dirty_clusters) {
            let members = self.clusters[c as usize]
                .as_ref()
                .expect("live cluster")
                .members
                .clone();
            for &m in &members {
                if self.node_cluster[m.index()] == c {
                    self.node_cluster[m.index()] = NO_CLUSTER;
                }
            }
            seeds.extend(members);
            self.free_cluster(c);
        }

        // Rebuild: flood fill from each still-unassigned seed, capping each
        // new cluster at CLUSTER_CAP members and recording adjacency to
        // already-assigned clusters symmetrically.
        let mut frontier: Vec<NodeIndex> = Vec::new();
        let mut adjacent: Vec<NodeIndex> = Vec::new();
        for &seed in &seeds {
            let Some(node) = set.node(seed) else {
                continue;
            };
            if !node.walkable() {
                // Unwalkable nodes belong to no component.
                if let Some(n) = set.node_mut(seed) {
                    n.flags.set_area(0);
                }
                continue;
            }
            self.ensure(seed);
            if self.node_cluster[seed.index()] != NO_CLUSTER {
                continue;
            }

            let id = self.alloc_cluster(Cluster {
                members: Vec::new(),
                neighbors: Vec::new(),
                area: 0,
                dirty: false,
            });
            self.node_cluster[seed.index()] = id;
            frontier.clear();
            frontier.push(seed);
            let mut members = vec![seed];
            let mut neighbors: Vec<u32> = Vec::new();

            while let Some(cur) = frontier.pop() {
                adjacent.clear();
                set.for_each_connection(cur, |n, _| adjacent.push(n));
                for i in 0..adjacent.len() {
                    let n = adjacent[i];
                    let Some(node) = set.node(n) else {
                        continue;
                    };
                    if !node.walkable() {
                        continue;
                    }
                    self.ensure(n);
                    let assigned = self.node_cluster[n.index()];
                    if assigned == NO_CLUSTER {
                        if members.len() < CLUSTER_CAP {
                            self.node_cluster[n.index()] = id;
                            members.push(n);
                            frontier.push(n);
                        }
                        // Past the cap the node stays unassigned; it is in
                        // the seed list and will start its own cluster.
                    } else if assigned != id && !neighbors.contains(&assigned) {
                        neighbors.push(assigned);
                    }
                }
            }

            for &n in &neighbors {
                let other = self.clusters[n as usize].as_mut().expect("live cluster");
                if !other.neighbors.contains(&id) {
                    other.neighbors.push(id);
                }
            }
            let cluster = self.clusters[id as usize].as_mut().expect("just allocated");
            cluster.members = members;
            cluster.neighbors = neighbors;
        }

        self.relabel(set);
    }

    /// Assign a fresh area id per connected component of the cluster graph
    /// and write it into the flags of every member of a changed cluster.
    fn relabel(&mut self, set: &mut GraphSet) {
        let mut next_area: u32 = 0;
        let mut stack: Vec<u32> = Vec::new();
        let mut labels: Vec<(u32, u32)> = Vec::new(); // (cluster, new area)
        let mut visited = vec![false; self.clusters.len()];

        for start in 0..self.clusters.len() {
            if visited[start] || self.clusters[start].is_none() {
                continue;
            }
            next_area += 1;
            stack.push(start as u32);
            visited[start] = true;
            while let Some(c) = stack.pop() {
                labels.push((c, next_area));
                let cluster = self.clusters[c as usize].as_ref().expect("live cluster");
                for &n in &cluster.neighbors {
                    if !visited[n as usize] && self.clusters[n as usize].is_some() {
                        visited[n as usize] = true;
                        stack.push(n);
                    }
                }
            }
        }

        for (c, area) in labels {
            let cluster = self.clusters[c as usize].as_mut().expect("live cluster");
            if cluster.area == area {
                continue;
            }
            cluster.area = area;
            for i in 0..cluster.members.len() {
                let m = cluster.members[i];
                if let Some(node) = set.node_mut(m) {
                    node.flags.set_area(area);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::graph::{GraphSet, GridShape, NodeFilter, NearestNode};
    use crate::int3::Int3;
    use crate::node::NodeIndex;

    fn grid(width: u32, depth: u32) -> (GraphSet, crate::graph::GraphId) {
        let mut set = GraphSet::new();
        let id = set.add_grid_graph(
            GridShape {
                width,
                depth,
                cell_size: 1000,
                origin: Int3::ZERO,
            },
            false,
        );
        set.recompute_areas();
        (set, id)
    }

    fn area_of(set: &GraphSet, idx: u32) -> u32 {
        set.node(NodeIndex(idx)).unwrap().flags.area()
    }

    #[test]
    fn fresh_grid_is_one_area() {
        let (set, _) = grid(5, 5);
        let a = area_of(&set, 0);
        assert_ne!(a, 0);
        for i in 0..25 {
            assert_eq!(area_of(&set, i), a);
        }
    }

    #[test]
    fn multi_cluster_grid_is_still_one_area() {
        // 400 nodes forces more than one cluster; labels must agree anyway.
        let (set, _) = grid(20, 20);
        let a = area_of(&set, 0);
        for i in 0..400 {
            assert_eq!(area_of(&set, i), a);
        }
    }

    #[test]
    fn unwalkable_column_splits_grid() {
        let (mut set, _) = grid(5, 5);
        for cz in 0..5 {
            set.set_walkable(NodeIndex(cz * 5 + 2), false);
        }
        set.recompute_areas();
        let west = area_of(&set, 0);
        let east = area_of(&set, 4);
        assert_ne!(west, east);
        assert_ne!(west, 0);
        assert_ne!(east, 0);
        // The blocked cells belong to no component.
        assert_eq!(area_of(&set, 2), 0);
        // Whole halves agree with their side.
        for cz in 0..5 {
            assert_eq!(area_of(&set, cz * 5), west);
            assert_eq!(area_of(&set, cz * 5 + 1), west);
            assert_eq!(area_of(&set, cz * 5 + 3), east);
            assert_eq!(area_of(&set, cz * 5 + 4), east);
        }
    }

    #[test]
    fn areas_are_stale_until_recompute() {
        let (mut set, _) = grid(5, 5);
        let before = area_of(&set, 0);
        for cz in 0..5 {
            set.set_walkable(NodeIndex(cz * 5 + 2), false);
        }
        // No recompute yet: both sides still report the old label.
        assert_eq!(area_of(&set, 0), before);
        assert_eq!(area_of(&set, 4), before);
        set.recompute_areas();
        assert_ne!(area_of(&set, 0), area_of(&set, 4));
    }

    #[test]
    fn reopening_merges_areas_back() {
        let (mut set, _) = grid(5, 5);
        for cz in 0..5 {
            set.set_walkable(NodeIndex(cz * 5 + 2), false);
        }
        set.recompute_areas();
        assert_ne!(area_of(&set, 0), area_of(&set, 4));

        for cz in 0..5 {
            set.set_walkable(NodeIndex(cz * 5 + 2), true);
        }
        set.recompute_areas();
        assert_eq!(area_of(&set, 0), area_of(&set, 4));
        assert_ne!(area_of(&set, 0), 0);
    }

    #[test]
    fn point_graph_components() {
        let mut set = GraphSet::new();
        let g = set.add_point_graph();
        let a = set.add_point_node(g, Int3::ZERO, true);
        let b = set.add_point_node(g, Int3::new(1000, 0, 0), true);
        let c = set.add_point_node(g, Int3::new(9000, 0, 0), true);
        let d = set.add_point_node(g, Int3::new(10000, 0, 0), true);
        set.connect(a, b, 1000);
        set.connect(c, d, 1000);
        set.recompute_areas();

        let ab = set.node(a).unwrap().flags.area();
        let cd = set.node(c).unwrap().flags.area();
        assert_eq!(ab, set.node(b).unwrap().flags.area());
        assert_eq!(cd, set.node(d).unwrap().flags.area());
        assert_ne!(ab, cd);

        // Bridge the two pairs; one area after recompute.
        set.connect(b, c, 8000);
        set.recompute_areas();
        assert_eq!(
            set.node(a).unwrap().flags.area(),
            set.node(d).unwrap().flags.area()
        );
    }

    #[test]
    fn destroyed_node_leaves_consistent_areas() {
        let mut set = GraphSet::new();
        let g = set.add_point_graph();
        let a = set.add_point_node(g, Int3::ZERO, true);
        let b = set.add_point_node(g, Int3::new(1000, 0, 0), true);
        let c = set.add_point_node(g, Int3::new(2000, 0, 0), true);
        set.connect(a, b, 1000);
        set.connect(b, c, 1000);
        set.recompute_areas();
        assert_eq!(
            set.node(a).unwrap().flags.area(),
            set.node(c).unwrap().flags.area()
        );

        // Removing the middle node splits the chain.
        set.destroy_node(b);
        set.recompute_areas();
        assert_ne!(
            set.node(a).unwrap().flags.area(),
            set.node(c).unwrap().flags.area()
        );
    }

    #[test]
    fn nearest_and_areas_compose() {
        // Sanity check used by the search's cheap rejection: different
        // halves report different areas through the nearest-node seam.
        let (mut set, _) = grid(5, 5);
        for cz in 0..5 {
            set.set_walkable(NodeIndex(cz * 5 + 2), false);
        }
        set.recompute_areas();
        let west = set.nearest(Int3::ZERO, &NodeFilter::default()).unwrap();
        let east = set
            .nearest(Int3::new(4000, 0, 4000), &NodeFilter::default())
            .unwrap();
        let wa = set.node(west.node).unwrap().flags.area();
        let ea = set.node(east.node).unwrap().flags.area();
        assert_ne!(wa, ea);
    }
}
