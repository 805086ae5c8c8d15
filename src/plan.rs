//! Contact plan: the a-priori schedule of communication windows.
//!
//! The plan is generated (or handed in) once, sorted, and never mutated
//! afterwards. Contact start/end events are materialized into the scheduler
//! when the plan is installed; the live active-edge view derived from those
//! events lives in [`crate::topology::Topology`].

use hashbrown::HashMap;
use rand::Rng;

use crate::bundle::NodeId;
use crate::config::SimConfig;
use crate::time::{Duration, Timestamp};
use crate::topology::ordered_pair;

/// Index of a contact within its plan.
pub type ContactId = usize;

/// One bounded communication window between two nodes.
///
/// Bidirectional for routing purposes; each direction draws segment losses
/// independently and prices transmissions against the full bandwidth.
#[derive(Debug, Clone)]
pub struct Contact {
    pub id: ContactId,
    pub a: NodeId,
    pub b: NodeId,
    pub start: Timestamp,
    pub end: Timestamp,
    pub bandwidth_bps: u64,
    /// Per-segment loss probability on this contact.
    pub error_rate: f64,
    /// One-way propagation delay.
    pub propagation: Duration,
}

impl Contact {
    pub fn involves(&self, node: NodeId) -> bool {
        self.a == node || self.b == node
    }

    pub fn peer_of(&self, node: NodeId) -> Option<NodeId> {
        if self.a == node {
            Some(self.b)
        } else if self.b == node {
            Some(self.a)
        } else {
            None
        }
    }

    pub fn straddles(&self, t: Timestamp) -> bool {
        self.start <= t && t < self.end
    }
}

/// Immutable, sorted schedule of contacts with per-pair and per-node indexes.
#[derive(Debug, Clone, Default)]
pub struct ContactPlan {
    contacts: Vec<Contact>,
    by_pair: HashMap<(NodeId, NodeId), Vec<ContactId>>,
    by_node: HashMap<NodeId, Vec<ContactId>>,
}

impl ContactPlan {
    /// Build a plan from raw contacts. Contacts are sorted by start time and
    /// re-numbered; the ids found in `contacts` are ignored.
    pub fn new(mut contacts: Vec<Contact>) -> Self {
        contacts.sort_by_key(|c| (c.start, c.end, c.a, c.b));
        let mut by_pair: HashMap<(NodeId, NodeId), Vec<ContactId>> = HashMap::new();
        let mut by_node: HashMap<NodeId, Vec<ContactId>> = HashMap::new();
        for (id, contact) in contacts.iter_mut().enumerate() {
            contact.id = id;
            by_pair
                .entry(ordered_pair(contact.a, contact.b))
                .or_default()
                .push(id);
            by_node.entry(contact.a).or_default().push(id);
            by_node.entry(contact.b).or_default().push(id);
        }
        Self {
            contacts,
            by_pair,
            by_node,
        }
    }

    /// Generate a plan from the configured density parameters.
    ///
    /// Each unordered node pair is selected with `contact_probability` and
    /// then receives 2..=5 windows with jittered bandwidth and error rate.
    /// Overlap between windows on the same pair is allowed.
    pub fn generate(config: &SimConfig, rng: &mut impl Rng) -> Self {
        let horizon = config.horizon();
        let (bw_lo, bw_hi) = config.bandwidth_range;
        let propagation = config.propagation();

        let mut contacts = Vec::new();
        for a in 0..config.num_nodes as NodeId {
            for b in (a + 1)..config.num_nodes as NodeId {
                if rng.gen::<f64>() >= config.contact_probability {
                    continue;
                }
                let windows = rng.gen_range(2..=5);
                for _ in 0..windows {
                    let duration = Duration::from_secs_f64(
                        rng.gen_range(config.min_contact_duration..=config.max_contact_duration),
                    );
                    // Round the start to milliseconds and lay the duration on
                    // top, so windows keep their drawn length exactly.
                    let (start, end) = if duration.as_millis() >= horizon.as_millis() {
                        (Timestamp::ZERO, horizon)
                    } else {
                        let span = (horizon.as_millis() - duration.as_millis()) as f64;
                        let start =
                            Timestamp::from_millis((rng.gen::<f64>() * span).round() as u64);
                        (start, start + duration)
                    };
                    let bandwidth_bps = rng.gen_range(bw_lo..=bw_hi);
                    let error_rate =
                        (config.base_error_rate * rng.gen_range(0.5..=3.0)).clamp(0.0, 1.0);
                    contacts.push(Contact {
                        id: 0,
                        a,
                        b,
                        start,
                        end,
                        bandwidth_bps,
                        error_rate,
                        propagation,
                    });
                }
            }
        }
        Self::new(contacts)
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn get(&self, id: ContactId) -> &Contact {
        &self.contacts[id]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Contact> {
        self.contacts.iter()
    }

    /// Contact ids incident on `node`, ordered by start time.
    pub fn contacts_of(&self, node: NodeId) -> &[ContactId] {
        self.by_node.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Unordered node pairs with a contact straddling `t`, sorted.
    pub fn active_edges(&self, t: Timestamp) -> Vec<(NodeId, NodeId)> {
        let mut edges: Vec<(NodeId, NodeId)> = self
            .contacts
            .iter()
            .filter(|c| c.straddles(t))
            .map(|c| ordered_pair(c.a, c.b))
            .collect();
        edges.sort_unstable();
        edges.dedup();
        edges
    }

    /// Earliest contact on the pair `(u, v)` starting at or after `t`.
    pub fn next_contact(&self, u: NodeId, v: NodeId, t: Timestamp) -> Option<&Contact> {
        let ids = self.by_pair.get(&ordered_pair(u, v))?;
        let from = ids.partition_point(|&id| self.contacts[id].start < t);
        ids.get(from).map(|&id| &self.contacts[id])
    }

    /// Earliest contact incident on `u` starting at or after `t`.
    pub fn next_contact_from(&self, u: NodeId, t: Timestamp) -> Option<&Contact> {
        let ids = self.by_node.get(&u)?;
        let from = ids.partition_point(|&id| self.contacts[id].start < t);
        ids.get(from).map(|&id| &self.contacts[id])
    }
}
