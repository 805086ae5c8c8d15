//! Per-node simulation state.

use hashbrown::HashSet;

use crate::bundle::{Bundle, BundleId, NodeId};
use crate::routing::{NetView, Router};
use crate::store::BundleStore;
use crate::time::Timestamp;

/// Local counters reported per node at the end of a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeStats {
    /// Bundles this node's traffic source created.
    pub generated: u64,
    /// First-copy deliveries with this node as destination.
    pub delivered: u64,
    /// Transfers completed with this node as sender.
    pub transmitted: u64,
    /// Transfers completed with this node as receiver.
    pub received: u64,
    /// Local copies displaced or refused by admission.
    pub dropped_eviction: u64,
    /// Local copies removed on deadline expiry.
    pub dropped_expiry: u64,
}

/// A node: bundle custody plus duplicate suppression and counters. The
/// routing policy is shared across nodes and passed in where needed.
#[derive(Debug, Clone)]
pub struct SimNode {
    pub id: NodeId,
    pub store: BundleStore,
    /// Bundle ids this node has already generated, accepted or refused.
    /// Replicating routers use this to silently drop duplicate copies.
    pub seen: HashSet<BundleId>,
    pub stats: NodeStats,
}

impl SimNode {
    pub fn new(id: NodeId, capacity: usize) -> Self {
        Self {
            id,
            store: BundleStore::new(capacity),
            seen: HashSet::new(),
            stats: NodeStats::default(),
        }
    }

    /// The most important bundle the router would hand to `peer` right now.
    pub fn peek_for_peer(
        &self,
        peer: NodeId,
        router: &Router,
        view: &NetView<'_>,
        now: Timestamp,
    ) -> Option<&Bundle> {
        self.store.peek_for_peer(self.id, peer, router, view, now)
    }
}
