//! Next-hop selection policies.
//!
//! All three policies share one entry point, `select_next_hop`, and return
//! `None` when no progress is possible at the current instant; the bundle
//! then stays in its store. The session-opening path instead asks whether a
//! specific active peer is acceptable (`permits_hop`): the replicating
//! policies accept any eligible peer, the predictive policy only its unique
//! best hop.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use hashbrown::HashMap;

use crate::bundle::{Bundle, NodeId};
use crate::config::RouterKind;
use crate::ltp::transmit_time;
use crate::plan::ContactPlan;
use crate::time::Timestamp;
use crate::topology::Topology;

/// What a policy gets to look at: the live edge set plus the full schedule
/// (the predictive policy routes over future contacts).
#[derive(Clone, Copy)]
pub struct NetView<'a> {
    pub topology: &'a Topology,
    pub plan: &'a ContactPlan,
}

/// Routing policy. Stateless: replication state (spray tokens, visited sets)
/// lives on the bundle copies themselves.
#[derive(Debug, Clone, Copy)]
pub enum Router {
    Epidemic,
    SprayAndWait,
    Predictive,
}

impl Router {
    pub fn from_kind(kind: RouterKind) -> Self {
        match kind {
            RouterKind::Epidemic => Router::Epidemic,
            RouterKind::SprayAndWait => Router::SprayAndWait,
            RouterKind::Predictive => Router::Predictive,
        }
    }

    /// Pick a next hop for `bundle` held at `node`, or `None` if the bundle
    /// should wait. The destination is always preferred when reachable.
    pub fn select_next_hop(
        &self,
        bundle: &Bundle,
        node: NodeId,
        view: &NetView<'_>,
        now: Timestamp,
    ) -> Option<NodeId> {
        let neighbors = view.topology.neighbors(node);
        if neighbors.contains(&bundle.destination) {
            return Some(bundle.destination);
        }
        match self {
            Router::Epidemic => neighbors
                .into_iter()
                .find(|p| !bundle.visited.contains(p)),
            Router::SprayAndWait => {
                if bundle.tokens > 1 {
                    neighbors
                        .into_iter()
                        .find(|p| !bundle.visited.contains(p))
                } else {
                    None
                }
            }
            Router::Predictive => {
                let hop = predictive_next_hop(bundle, node, view, now)?;
                neighbors.contains(&hop).then_some(hop)
            }
        }
    }

    /// Whether handing the bundle to this specific (currently reachable)
    /// peer is consistent with the policy.
    pub fn permits_hop(
        &self,
        bundle: &Bundle,
        node: NodeId,
        peer: NodeId,
        view: &NetView<'_>,
        now: Timestamp,
    ) -> bool {
        if !view.topology.is_active(node, peer) {
            return false;
        }
        if peer == bundle.destination {
            return true;
        }
        if bundle.visited.contains(&peer) {
            return false;
        }
        match self {
            Router::Epidemic => true,
            Router::SprayAndWait => bundle.tokens > 1,
            Router::Predictive => predictive_next_hop(bundle, node, view, now) == Some(peer),
        }
    }
}

/// Earliest-arrival search over the contact plan.
///
/// Relaxes contacts in a Dijkstra over (arrival time, hop count, node id):
/// a contact is usable if the bundle can wait for its start and the whole
/// transfer fits before its end. Ties break toward fewer hops, then lower
/// node ids, which makes the result independent of map iteration order.
fn predictive_next_hop(
    bundle: &Bundle,
    node: NodeId,
    view: &NetView<'_>,
    now: Timestamp,
) -> Option<NodeId> {
    let dest = bundle.destination;
    if node == dest {
        return None;
    }

    let mut best: HashMap<NodeId, (Timestamp, u32)> = HashMap::new();
    best.insert(node, (now, 0));
    // (arrival, hops, node, first hop taken from the origin)
    let mut heap: BinaryHeap<Reverse<(Timestamp, u32, NodeId, NodeId)>> = BinaryHeap::new();
    heap.push(Reverse((now, 0, node, node)));

    while let Some(Reverse((at, hops, u, first))) = heap.pop() {
        if let Some(&(bt, bh)) = best.get(&u) {
            if (at, hops) > (bt, bh) {
                continue;
            }
        }
        if u == dest {
            return Some(first);
        }
        for &cid in view.plan.contacts_of(u) {
            let contact = view.plan.get(cid);
            let Some(v) = contact.peer_of(u) else { continue };
            if contact.end <= at {
                continue;
            }
            let depart = if contact.start > at { contact.start } else { at };
            let finish = depart + transmit_time(bundle.size, contact.bandwidth_bps);
            if finish > contact.end {
                continue;
            }
            let arrival = finish + contact.propagation;
            if arrival > bundle.deadline {
                continue;
            }
            let candidate = (arrival, hops + 1);
            let better = match best.get(&v) {
                Some(&(bt, bh)) => candidate < (bt, bh),
                None => true,
            };
            if better {
                best.insert(v, candidate);
                let first_hop = if u == node { v } else { first };
                heap.push(Reverse((arrival, hops + 1, v, first_hop)));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::Priority;
    use crate::plan::Contact;
    use crate::time::Duration;

    fn contact(a: NodeId, b: NodeId, start: u64, end: u64) -> Contact {
        Contact {
            id: 0,
            a,
            b,
            start: Timestamp::from_secs(start),
            end: Timestamp::from_secs(end),
            bandwidth_bps: 8192,
            error_rate: 0.0,
            propagation: Duration::ZERO,
        }
    }

    fn bundle_to(dest: NodeId) -> Bundle {
        Bundle::new(
            1,
            0,
            dest,
            2048,
            Priority::Normal,
            Timestamp::ZERO,
            Timestamp::from_secs(500),
            4,
        )
    }

    /// Chain 0-1-2 with the first leg live.
    fn chain_view(plan: &ContactPlan, topo: &mut Topology) {
        topo.activate(plan.get(0));
    }

    #[test]
    fn test_epidemic_prefers_destination() {
        let plan = ContactPlan::new(vec![contact(0, 1, 0, 50), contact(0, 2, 0, 50)]);
        let mut topo = Topology::new();
        topo.activate(plan.get(0));
        topo.activate(plan.get(1));
        let view = NetView {
            topology: &topo,
            plan: &plan,
        };

        let b = bundle_to(2);
        let hop = Router::Epidemic.select_next_hop(&b, 0, &view, Timestamp::ZERO);
        assert_eq!(hop, Some(2));
    }

    #[test]
    fn test_epidemic_skips_visited() {
        let plan = ContactPlan::new(vec![contact(0, 1, 0, 50)]);
        let mut topo = Topology::new();
        topo.activate(plan.get(0));
        let view = NetView {
            topology: &topo,
            plan: &plan,
        };

        let mut b = bundle_to(5);
        assert_eq!(
            Router::Epidemic.select_next_hop(&b, 0, &view, Timestamp::ZERO),
            Some(1)
        );
        b.visited.insert(1);
        assert_eq!(
            Router::Epidemic.select_next_hop(&b, 0, &view, Timestamp::ZERO),
            None
        );
    }

    #[test]
    fn test_spray_wait_phase_only_accepts_destination() {
        let plan = ContactPlan::new(vec![contact(0, 1, 0, 50), contact(0, 2, 0, 50)]);
        let mut topo = Topology::new();
        topo.activate(plan.get(0));
        topo.activate(plan.get(1));
        let view = NetView {
            topology: &topo,
            plan: &plan,
        };

        let mut b = bundle_to(2);
        b.tokens = 1;
        // Relay 1 is refused, destination 2 still accepted.
        assert!(!Router::SprayAndWait.permits_hop(&b, 0, 1, &view, Timestamp::ZERO));
        assert!(Router::SprayAndWait.permits_hop(&b, 0, 2, &view, Timestamp::ZERO));

        b.tokens = 2;
        assert!(Router::SprayAndWait.permits_hop(&b, 0, 1, &view, Timestamp::ZERO));
    }

    #[test]
    fn test_predictive_routes_through_chain() {
        let plan = ContactPlan::new(vec![contact(0, 1, 0, 50), contact(1, 2, 60, 110)]);
        let mut topo = Topology::new();
        chain_view(&plan, &mut topo);
        let view = NetView {
            topology: &topo,
            plan: &plan,
        };

        let b = bundle_to(2);
        assert_eq!(
            Router::Predictive.select_next_hop(&b, 0, &view, Timestamp::ZERO),
            Some(1)
        );
        assert!(Router::Predictive.permits_hop(&b, 0, 1, &view, Timestamp::ZERO));
    }

    #[test]
    fn test_predictive_none_without_future_path() {
        // No contact on the plan ever reaches node 2.
        let plan = ContactPlan::new(vec![contact(0, 1, 0, 50)]);
        let mut topo = Topology::new();
        topo.activate(plan.get(0));
        let view = NetView {
            topology: &topo,
            plan: &plan,
        };

        let b = bundle_to(2);
        assert_eq!(
            Router::Predictive.select_next_hop(&b, 0, &view, Timestamp::ZERO),
            None
        );
    }

    #[test]
    fn test_predictive_respects_deadline() {
        let plan = ContactPlan::new(vec![contact(0, 1, 0, 50), contact(1, 2, 60, 110)]);
        let mut topo = Topology::new();
        chain_view(&plan, &mut topo);
        let view = NetView {
            topology: &topo,
            plan: &plan,
        };

        let mut b = bundle_to(2);
        // Delivery would complete around t=62; a deadline of 40 forbids it.
        b.deadline = Timestamp::from_secs(40);
        assert_eq!(
            Router::Predictive.select_next_hop(&b, 0, &view, Timestamp::ZERO),
            None
        );
    }

    #[test]
    fn test_predictive_tie_breaks_to_lower_node_id() {
        // Two relays reach the destination at the same instant.
        let plan = ContactPlan::new(vec![
            contact(0, 1, 0, 50),
            contact(0, 2, 0, 50),
            contact(1, 3, 60, 110),
            contact(2, 3, 60, 110),
        ]);
        let mut topo = Topology::new();
        topo.activate(plan.get(0));
        topo.activate(plan.get(1));
        let view = NetView {
            topology: &topo,
            plan: &plan,
        };

        let b = bundle_to(3);
        assert_eq!(
            Router::Predictive.select_next_hop(&b, 0, &view, Timestamp::ZERO),
            Some(1)
        );
    }
}
