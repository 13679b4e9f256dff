//! Directed node connections.

use smallvec::SmallVec;

use crate::node::NodeIndex;

/// A directed edge to another node.
///
/// Bidirectional links are two independent `Connection` entries, one per
/// endpoint. `edge` identifies the shared triangle edge (0..3) crossed by
/// this connection on mesh graphs; the funnel algorithm uses it to recover
/// portal geometry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Connection {
    pub target: NodeIndex,
    pub cost: u32,
    pub edge: Option<u8>,
}

/// Outgoing connection list of one node.
///
/// Most nodes have a handful of links; four fit inline without a heap
/// allocation.
pub type Links = SmallVec<[Connection; 4]>;

/// Insert or update a connection, keeping targets unique.
///
/// If `links` already holds a connection to `conn.target`, its cost and edge
/// are overwritten in place and no duplicate is created. Returns `true` when
/// a new entry was appended.
pub fn upsert(links: &mut Links, conn: Connection) -> bool {
    for existing in links.iter_mut() {
        if existing.target == conn.target {
            existing.cost = conn.cost;
            existing.edge = conn.edge;
            return false;
        }
    }
    links.push(conn);
    true
}

/// Remove the connection to `target`. No-op if absent; returns whether an
/// entry was removed.
pub fn remove(links: &mut Links, target: NodeIndex) -> bool {
    match links.iter().position(|c| c.target == target) {
        Some(i) => {
            links.remove(i);
            true
        }
        None => false,
    }
}

/// Find the connection to `target`, if any.
pub fn find(links: &[Connection], target: NodeIndex) -> Option<&Connection> {
    links.iter().find(|c| c.target == target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(target: u32, cost: u32) -> Connection {
        Connection {
            target: NodeIndex(target),
            cost,
            edge: None,
        }
    }

    #[test]
    fn upsert_overwrites_existing_target() {
        let mut links = Links::new();
        assert!(upsert(&mut links, conn(3, 5)));
        assert!(!upsert(&mut links, conn(3, 7)));
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].cost, 7);
    }

    #[test]
    fn upsert_preserves_other_targets() {
        let mut links = Links::new();
        upsert(&mut links, conn(1, 10));
        upsert(&mut links, conn(2, 20));
        upsert(&mut links, conn(1, 11));
        assert_eq!(links.len(), 2);
        assert_eq!(find(&links, NodeIndex(1)).unwrap().cost, 11);
        assert_eq!(find(&links, NodeIndex(2)).unwrap().cost, 20);
    }

    #[test]
    fn remove_missing_is_noop() {
        let mut links = Links::new();
        upsert(&mut links, conn(1, 10));
        assert!(!remove(&mut links, NodeIndex(9)));
        assert_eq!(links.len(), 1);
        assert!(remove(&mut links, NodeIndex(1)));
        assert!(links.is_empty());
    }

    #[test]
    fn upsert_updates_edge_id() {
        let mut links = Links::new();
        upsert(
            &mut links,
            Connection {
                target: NodeIndex(4),
                cost: 1,
                edge: Some(0),
            },
        );
        upsert(
            &mut links,
            Connection {
                target: NodeIndex(4),
                cost: 1,
                edge: Some(2),
            },
        );
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].edge, Some(2));
    }
}
