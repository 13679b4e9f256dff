//! Graph persistence (behind the `serde` feature).
//!
//! A node stores its penalty, its attribute word with the transient area
//! bits masked out, its variant-specific fields and its connection list.
//! Connection targets are written as (graph id, graph-local index) pairs and
//! resolved back to arena indices in a second pass once every node exists,
//! because links may be cyclic. Area ids are derived data: they come back as
//! zero and the first `recompute_areas` call rebuilds them.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::connection::Connection;
use crate::flags::NodeFlags;
use crate::graph::{Graph, GraphId, GraphKind, GraphSet, GridShape};
use crate::int3::Int3;
use crate::node::{Node, NodeIndex, NodeKind};

#[derive(Serialize, Deserialize)]
struct WireConnection {
    graph: u8,
    index: u32,
    cost: u32,
    edge: Option<u8>,
}

#[derive(Serialize, Deserialize)]
enum WireKind {
    Point,
    Grid { cell: u32, open_dirs: u8 },
    Triangle { vertices: [Int3; 3] },
}

#[derive(Serialize, Deserialize)]
struct WireNode {
    penalty: u32,
    flags: u32,
    position: Int3,
    kind: WireKind,
    links: Vec<WireConnection>,
}

#[derive(Serialize, Deserialize)]
enum WireGraphKind {
    PointSet,
    Grid { shape: GridShape },
    Mesh,
}

#[derive(Serialize, Deserialize)]
struct WireGraph {
    id: u8,
    kind: WireGraphKind,
    nodes: Vec<WireNode>,
}

#[derive(Serialize, Deserialize)]
struct WireGraphSet {
    graphs: Vec<WireGraph>,
}

impl GraphSet {
    fn to_wire(&self) -> WireGraphSet {
        // Arena index -> (owner graph, graph-local index).
        let mut local: Vec<(u8, u32)> = vec![(0, 0); self.capacity()];
        for graph in self.graphs() {
            for (i, &n) in graph.nodes().iter().enumerate() {
                local[n.index()] = (graph.id.0, i as u32);
            }
        }

        let graphs = self
            .graphs()
            .map(|graph| WireGraph {
                id: graph.id.0,
                kind: match &graph.kind {
                    GraphKind::PointSet => WireGraphKind::PointSet,
                    GraphKind::Grid { shape, .. } => WireGraphKind::Grid { shape: *shape },
                    GraphKind::Mesh => WireGraphKind::Mesh,
                },
                nodes: graph
                    .nodes()
                    .iter()
                    .map(|&idx| {
                        let node = self.node(idx).expect("member node is live");
                        WireNode {
                            penalty: node.penalty,
                            flags: node.flags.persisted_bits(),
                            position: node.position,
                            kind: match &node.kind {
                                NodeKind::Point { .. } => WireKind::Point,
                                NodeKind::Grid {
                                    cell, open_dirs, ..
                                } => WireKind::Grid {
                                    cell: *cell,
                                    open_dirs: *open_dirs,
                                },
                                NodeKind::Triangle { vertices, .. } => WireKind::Triangle {
                                    vertices: *vertices,
                                },
                            },
                            links: node
                                .links()
                                .iter()
                                .map(|c| {
                                    let (graph, index) = local[c.target.index()];
                                    WireConnection {
                                        graph,
                                        index,
                                        cost: c.cost,
                                        edge: c.edge,
                                    }
                                })
                                .collect(),
                        }
                    })
                    .collect(),
            })
            .collect();
        WireGraphSet { graphs }
    }

    fn from_wire(wire: WireGraphSet) -> Result<Self, String> {
        let mut set = GraphSet::new();

        // First pass: materialize every node with an empty link list.
        for wg in &wire.graphs {
            let id = GraphId(wg.id);
            if set.graphs.len() <= wg.id as usize {
                set.graphs.resize_with(wg.id as usize + 1, || None);
            }
            if set.graphs[wg.id as usize].is_some() {
                return Err(format!("duplicate graph id {}", wg.id));
            }

            let base = NodeIndex(set.arena.len() as u32);
            let kind = match &wg.kind {
                WireGraphKind::PointSet => GraphKind::PointSet,
                WireGraphKind::Grid { shape } => {
                    if wg.nodes.len() != shape.len() {
                        return Err(format!(
                            "grid graph {} has {} nodes, shape wants {}",
                            wg.id,
                            wg.nodes.len(),
                            shape.len()
                        ));
                    }
                    GraphKind::Grid { shape: *shape, base }
                }
                WireGraphKind::Mesh => GraphKind::Mesh,
            };

            let mut members = Vec::with_capacity(wg.nodes.len());
            for wn in &wg.nodes {
                let kind = match &wn.kind {
                    WireKind::Point => NodeKind::Point {
                        links: Default::default(),
                    },
                    WireKind::Grid { cell, open_dirs } => NodeKind::Grid {
                        cell: *cell,
                        open_dirs: *open_dirs,
                        links: Default::default(),
                    },
                    WireKind::Triangle { vertices } => NodeKind::Triangle {
                        vertices: *vertices,
                        links: Default::default(),
                    },
                };
                let idx = NodeIndex(set.arena.len() as u32);
                set.arena.push(Some(Node {
                    position: wn.position,
                    flags: NodeFlags::from_persisted_bits(wn.flags),
                    penalty: wn.penalty,
                    kind,
                }));
                set.areas.mark_dirty(idx);
                members.push(idx);
            }
            set.graphs[wg.id as usize] = Some(Graph {
                id,
                kind,
                nodes: members,
            });
        }

        // Second pass: resolve connection targets now that all nodes exist.
        for wg in &wire.graphs {
            for (i, wn) in wg.nodes.iter().enumerate() {
                let from = set
                    .graph(GraphId(wg.id))
                    .expect("graph placed in first pass")
                    .nodes()[i];
                for wc in &wn.links {
                    let target = set
                        .graph(GraphId(wc.graph))
                        .and_then(|g| g.nodes().get(wc.index as usize).copied())
                        .ok_or_else(|| {
                            format!(
                                "connection target ({}, {}) does not exist",
                                wc.graph, wc.index
                            )
                        })?;
                    let node = set.node_mut(from).expect("node placed in first pass");
                    crate::connection::upsert(
                        node.links_mut(),
                        Connection {
                            target,
                            cost: wc.cost,
                            edge: wc.edge,
                        },
                    );
                }
            }
        }
        Ok(set)
    }
}

impl Serialize for GraphSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for GraphSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireGraphSet::deserialize(deserializer)?;
        GraphSet::from_wire(wire).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use crate::graph::{GraphSet, GridShape, NodeFilter, NearestNode};
    use crate::int3::Int3;
    use crate::node::NodeIndex;

    #[test]
    fn graph_set_round_trip() {
        let mut set = GraphSet::new();
        let grid = set.add_grid_graph(
            GridShape {
                width: 3,
                depth: 3,
                cell_size: 1000,
                origin: Int3::ZERO,
            },
            false,
        );
        let points = set.add_point_graph();
        let p = set.add_point_node(points, Int3::new(5000, 0, 0), true);
        set.set_penalty(p, 250);
        set.set_tag(p, 9);
        // Cross-graph link into the grid, cyclic back-link.
        set.add_connection(p, NodeIndex(8), 4000);
        set.add_connection(NodeIndex(8), p, 4000);
        set.set_walkable(NodeIndex(4), false);
        set.recompute_areas();

        let json = serde_json::to_string(&set).unwrap();
        let back: GraphSet = serde_json::from_str(&json).unwrap();

        assert_eq!(back.graph(grid).unwrap().nodes().len(), 9);
        assert_eq!(back.graph(points).unwrap().nodes().len(), 1);

        let rp = back.graph(points).unwrap().nodes()[0];
        let node = back.node(rp).unwrap();
        assert_eq!(node.penalty, 250);
        assert_eq!(node.flags.tag(), 9);
        assert_eq!(node.position, Int3::new(5000, 0, 0));
        assert!(node.walkable());
        assert_eq!(node.links().len(), 1);
        assert_eq!(node.links()[0].cost, 4000);

        assert!(!back.node(NodeIndex(4)).unwrap().walkable());

        // Area ids are transient: zero until recomputed.
        assert_eq!(back.node(rp).unwrap().flags.area(), 0);
        let mut back = back;
        back.recompute_areas();
        // The cross-graph link makes the point node reachable from the grid.
        assert_eq!(
            back.node(rp).unwrap().flags.area(),
            back.node(NodeIndex(8)).unwrap().flags.area()
        );
    }

    #[test]
    fn round_trip_preserves_grid_behavior() {
        let mut set = GraphSet::new();
        set.add_grid_graph(
            GridShape {
                width: 4,
                depth: 4,
                cell_size: 1000,
                origin: Int3::ZERO,
            },
            true,
        );
        set.clear_connections(NodeIndex(5), true);

        let json = serde_json::to_string(&set).unwrap();
        let back: GraphSet = serde_json::from_str(&json).unwrap();

        // The cleared cell's closed directions survive the trip.
        let mut count = 0;
        back.for_each_connection(NodeIndex(5), |_, _| count += 1);
        assert_eq!(count, 0);
        let mut neighbors = Vec::new();
        back.for_each_connection(NodeIndex(6), |n, _| neighbors.push(n));
        assert!(!neighbors.contains(&NodeIndex(5)));

        // Nearest lookup still works against restored geometry.
        let hit = back.nearest(Int3::ZERO, &NodeFilter::default()).unwrap();
        assert_eq!(hit.node, NodeIndex(0));
    }

    #[test]
    fn bad_connection_target_is_an_error() {
        let json = r#"{"graphs":[{"id":0,"kind":"PointSet","nodes":[
            {"penalty":0,"flags":1,"position":{"x":0,"y":0,"z":0},
             "kind":"Point","links":[{"graph":0,"index":7,"cost":1,"edge":null}]}
        ]}]}"#;
        let result: Result<GraphSet, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
