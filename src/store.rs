//! Per-node bounded bundle buffer with priority-aware eviction.
//!
//! Not a FIFO: bundles are totally ordered by (priority, deadline, id), and
//! insertion order never influences selection or eviction.

use std::collections::BTreeMap;

use hashbrown::HashMap;

use crate::bundle::{Bundle, BundleId, NodeId, Priority};
use crate::routing::{NetView, Router};
use crate::time::Timestamp;

type StoreKey = (Priority, Timestamp, BundleId);

fn key_of(bundle: &Bundle) -> StoreKey {
    (bundle.priority, bundle.deadline, bundle.id)
}

/// Outcome of an admission attempt.
#[derive(Debug)]
pub enum Admission {
    /// The bundle was inserted.
    Stored,
    /// Someone was turned away: either a resident displaced to make room, or
    /// the incoming bundle itself when it cannot out-rank the least
    /// important resident.
    Evicted(Bundle),
}

/// Bounded priority buffer holding a node's custody of bundles.
#[derive(Debug, Clone)]
pub struct BundleStore {
    capacity: usize,
    bundles: BTreeMap<StoreKey, Bundle>,
    index: HashMap<BundleId, StoreKey>,
}

impl BundleStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            bundles: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, id: BundleId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn get(&self, id: BundleId) -> Option<&Bundle> {
        self.bundles.get(self.index.get(&id)?)
    }

    /// Mutable access for attributes that do not participate in ordering
    /// (hop count, visited set, spray tokens).
    pub fn get_mut(&mut self, id: BundleId) -> Option<&mut Bundle> {
        self.bundles.get_mut(self.index.get(&id)?)
    }

    /// Admit a bundle, evicting the least important resident if the store is
    /// full and the incoming bundle strictly out-ranks it. Among candidates
    /// of equal priority the victim is the one whose deadline is furthest in
    /// the future (then the highest id).
    pub fn admit(&mut self, bundle: Bundle) -> Admission {
        debug_assert!(
            !self.index.contains_key(&bundle.id),
            "bundle {} admitted twice",
            bundle.id
        );
        if self.bundles.len() < self.capacity {
            self.insert(bundle);
            return Admission::Stored;
        }

        let victim_key = match self.bundles.keys().next_back().copied() {
            Some(key) => key,
            None => return Admission::Evicted(bundle),
        };
        if victim_key.0 <= bundle.priority {
            return Admission::Evicted(bundle);
        }
        let victim = match self.bundles.remove(&victim_key) {
            Some(b) => b,
            None => return Admission::Evicted(bundle),
        };
        self.index.remove(&victim.id);
        self.insert(bundle);
        Admission::Evicted(victim)
    }

    /// Remove and return a bundle by id.
    pub fn remove(&mut self, id: BundleId) -> Option<Bundle> {
        let key = self.index.remove(&id)?;
        self.bundles.remove(&key)
    }

    /// Remove and return every bundle whose deadline has passed at `t`.
    pub fn expire(&mut self, t: Timestamp) -> Vec<Bundle> {
        let expired: Vec<StoreKey> = self
            .bundles
            .iter()
            .filter(|(_, b)| b.deadline <= t)
            .map(|(key, _)| *key)
            .collect();
        expired
            .into_iter()
            .filter_map(|key| {
                let bundle = self.bundles.remove(&key)?;
                self.index.remove(&bundle.id);
                Some(bundle)
            })
            .collect()
    }

    /// The most important live bundle the router would hand to `peer`.
    /// Skips expired bundles and bundles that already visited `peer`.
    pub fn peek_for_peer(
        &self,
        owner: NodeId,
        peer: NodeId,
        router: &Router,
        view: &NetView<'_>,
        now: Timestamp,
    ) -> Option<&Bundle> {
        self.bundles.values().find(|b| {
            !b.is_expired(now)
                && !b.visited.contains(&peer)
                && router.permits_hop(b, owner, peer, view, now)
        })
    }

    /// Bundles in selection order (most important first).
    pub fn iter(&self) -> impl Iterator<Item = &Bundle> {
        self.bundles.values()
    }

    fn insert(&mut self, bundle: Bundle) {
        let key = key_of(&bundle);
        self.index.insert(bundle.id, key);
        self.bundles.insert(key, bundle);
    }
}
