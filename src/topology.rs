//! Live view of which edges are usable right now.
//!
//! Maintained incrementally from contact start/end events rather than by
//! stabbing the plan with interval queries. Overlapping contacts on the same
//! pair are all tracked; the edge stays up while any of them is open.

use hashbrown::HashMap;

use crate::bundle::NodeId;
use crate::plan::{Contact, ContactId};

/// Canonical unordered-pair key (lower node id first).
pub(crate) fn ordered_pair(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Set of currently active edges, derived from the contact plan.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    active: HashMap<(NodeId, NodeId), Vec<ContactId>>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a contact's window as open.
    pub fn activate(&mut self, contact: &Contact) {
        let ids = self
            .active
            .entry(ordered_pair(contact.a, contact.b))
            .or_default();
        ids.push(contact.id);
        ids.sort_unstable();
    }

    /// Mark a contact's window as closed.
    pub fn deactivate(&mut self, contact: &Contact) {
        let key = ordered_pair(contact.a, contact.b);
        if let Some(ids) = self.active.get_mut(&key) {
            ids.retain(|&id| id != contact.id);
            if ids.is_empty() {
                self.active.remove(&key);
            }
        }
    }

    /// Whether any contact between `a` and `b` is currently open.
    pub fn is_active(&self, a: NodeId, b: NodeId) -> bool {
        self.active.contains_key(&ordered_pair(a, b))
    }

    /// The contact a transfer between `a` and `b` would ride right now.
    /// With overlapping windows the lowest contact id wins, for determinism.
    pub fn active_contact(&self, a: NodeId, b: NodeId) -> Option<ContactId> {
        self.active
            .get(&ordered_pair(a, b))
            .and_then(|ids| ids.first().copied())
    }

    /// Nodes currently reachable from `node`, sorted by id.
    pub fn neighbors(&self, node: NodeId) -> Vec<NodeId> {
        let mut result: Vec<NodeId> = self
            .active
            .keys()
            .filter_map(|&(a, b)| {
                if a == node {
                    Some(b)
                } else if b == node {
                    Some(a)
                } else {
                    None
                }
            })
            .collect();
        result.sort_unstable();
        result
    }

    /// Number of distinct active edges.
    pub fn edge_count(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{Duration, Timestamp};

    fn contact(id: ContactId, a: NodeId, b: NodeId) -> Contact {
        Contact {
            id,
            a,
            b,
            start: Timestamp::ZERO,
            end: Timestamp::from_secs(100),
            bandwidth_bps: 8192,
            error_rate: 0.0,
            propagation: Duration::ZERO,
        }
    }

    #[test]
    fn test_activate_deactivate() {
        let mut topo = Topology::new();
        let c = contact(0, 1, 2);

        assert!(!topo.is_active(1, 2));
        topo.activate(&c);
        assert!(topo.is_active(1, 2));
        assert!(topo.is_active(2, 1));
        topo.deactivate(&c);
        assert!(!topo.is_active(1, 2));
        assert_eq!(topo.edge_count(), 0);
    }

    #[test]
    fn test_overlapping_contacts_keep_edge_up() {
        let mut topo = Topology::new();
        let c1 = contact(0, 1, 2);
        let c2 = contact(1, 1, 2);

        topo.activate(&c1);
        topo.activate(&c2);
        assert_eq!(topo.active_contact(1, 2), Some(0));

        topo.deactivate(&c1);
        assert!(topo.is_active(1, 2));
        assert_eq!(topo.active_contact(1, 2), Some(1));

        topo.deactivate(&c2);
        assert!(!topo.is_active(1, 2));
    }

    #[test]
    fn test_neighbors_sorted() {
        let mut topo = Topology::new();
        topo.activate(&contact(0, 1, 5));
        topo.activate(&contact(1, 1, 3));
        topo.activate(&contact(2, 4, 1));

        assert_eq!(topo.neighbors(1), vec![3, 4, 5]);
        assert_eq!(topo.neighbors(3), vec![1]);
        assert!(topo.neighbors(9).is_empty());
    }
}
