//! The simulation driver.
//!
//! Owns the event queue, the contact plan and its live topology view, the
//! node table, the session table and the metrics. Everything advances by
//! popping the earliest event and running its handler to completion;
//! handlers schedule future events but never dispatch synchronously.

use std::collections::BinaryHeap;

use hashbrown::HashMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, trace, warn};

use crate::bundle::{Bundle, BundleId, NodeId, Priority};
use crate::config::{ConfigError, SimConfig};
use crate::event::{Event, ScheduledEvent, SequenceNumber};
use crate::ltp::{rto, transmit_time, Session, SessionId, SessionState};
use crate::metrics::{Metrics, NodeRecord, SimulationReport, Snapshot, Summary};
use crate::node::SimNode;
use crate::plan::{ContactId, ContactPlan};
use crate::routing::{NetView, Router};
use crate::store::Admission;
use crate::time::{Duration, Timestamp};
use crate::topology::Topology;
use crate::traffic::TrafficSource;

// Offsets deriving one RNG stream per subsystem from the master seed, so
// reordering draws in one subsystem cannot perturb the others.
const PLAN_STREAM: u64 = 1;
const TRAFFIC_STREAM: u64 = 2;
const LOSS_STREAM: u64 = 3;

/// Discrete-event simulator for a delay-tolerant network.
pub struct Simulator {
    config: SimConfig,
    plan: ContactPlan,
    topology: Topology,
    nodes: Vec<SimNode>,
    router: Router,
    queue: BinaryHeap<ScheduledEvent>,
    next_seq: u64,
    now: Timestamp,
    horizon: Timestamp,
    sessions: HashMap<SessionId, Session>,
    /// At most one outbound session per (sender, receiver) at any instant.
    outbound: HashMap<(NodeId, NodeId), SessionId>,
    next_session_id: SessionId,
    next_bundle_id: BundleId,
    traffic: TrafficSource,
    loss_rng: ChaCha8Rng,
    metrics: Metrics,
}

impl Simulator {
    /// Build a simulator with a generated contact plan.
    pub fn new(config: SimConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut plan_rng =
            ChaCha8Rng::seed_from_u64(config.random_seed.wrapping_add(PLAN_STREAM));
        let plan = ContactPlan::generate(&config, &mut plan_rng);
        Self::with_plan(config, plan)
    }

    /// Build a simulator around an explicit contact plan.
    pub fn with_plan(config: SimConfig, plan: ContactPlan) -> Result<Self, ConfigError> {
        config.validate()?;
        if plan.is_empty() {
            warn!("contact plan is empty; nothing can be delivered");
        }
        let horizon = config.horizon();
        let nodes = (0..config.num_nodes)
            .map(|i| SimNode::new(i as NodeId, config.max_buffer_size))
            .collect();
        let traffic = TrafficSource::new(
            &config,
            ChaCha8Rng::seed_from_u64(config.random_seed.wrapping_add(TRAFFIC_STREAM)),
        );
        let loss_rng = ChaCha8Rng::seed_from_u64(config.random_seed.wrapping_add(LOSS_STREAM));
        let router = Router::from_kind(config.router_kind);

        let mut sim = Self {
            config,
            plan,
            topology: Topology::new(),
            nodes,
            router,
            queue: BinaryHeap::new(),
            next_seq: 0,
            now: Timestamp::ZERO,
            horizon,
            sessions: HashMap::new(),
            outbound: HashMap::new(),
            next_session_id: 0,
            next_bundle_id: 0,
            traffic,
            loss_rng,
            metrics: Metrics::new(),
        };
        sim.install_contacts();
        sim.install_traffic();
        let interval = sim.config.snapshot_interval();
        sim.schedule(interval, Event::MetricsSnapshot);
        Ok(sim)
    }

    /// Current simulated time.
    pub fn now(&self) -> Timestamp {
        self.now
    }

    pub fn horizon(&self) -> Timestamp {
        self.horizon
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn plan(&self) -> &ContactPlan {
        &self.plan
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn node(&self, id: NodeId) -> Option<&SimNode> {
        self.nodes.get(id as usize)
    }

    /// Schedule an event `delay` from now. Events landing strictly past the
    /// horizon are discarded.
    pub fn schedule(&mut self, delay: Duration, event: Event) {
        self.schedule_at(self.now + delay, event);
    }

    /// Schedule an event at an absolute time.
    pub fn schedule_at(&mut self, time: Timestamp, event: Event) {
        if time > self.horizon {
            return;
        }
        let seq = SequenceNumber::new(self.next_seq);
        self.next_seq += 1;
        self.queue.push(ScheduledEvent::new(time, seq, event));
    }

    /// Inject a bundle at `source` right now, as an application would.
    pub fn submit_bundle(
        &mut self,
        source: NodeId,
        destination: NodeId,
        size: u64,
        priority: Priority,
    ) -> BundleId {
        let id = self.next_bundle_id;
        self.next_bundle_id += 1;
        let bundle = Bundle::new(
            id,
            source,
            destination,
            size,
            priority,
            self.now,
            self.now + self.config.ttl(),
            self.config.spray_token_budget,
        );
        let deadline = bundle.deadline;
        self.metrics.record_generated(id);
        self.nodes[source as usize].stats.generated += 1;
        self.nodes[source as usize].seen.insert(id);
        self.admit_at(source, bundle);
        self.schedule_at(deadline, Event::BundleExpiry(id));
        self.retry_outbound(source);
        id
    }

    /// Run to the horizon and produce the report.
    pub fn run(&mut self) -> SimulationReport {
        let horizon = self.horizon;
        self.run_until(horizon);
        let end = self.now.as_secs_f64();
        if self.metrics.snapshots.last().map(|s| s.time) != Some(end) {
            self.take_snapshot();
        }
        self.report()
    }

    /// Dispatch events up to and including `end` (capped at the horizon),
    /// then advance the clock to `end`. An empty queue is normal termination.
    pub fn run_until(&mut self, end: Timestamp) {
        let end = if end > self.horizon { self.horizon } else { end };
        while self.queue.peek().is_some_and(|ev| ev.time <= end) {
            let Some(ev) = self.queue.pop() else { break };
            debug_assert!(ev.time >= self.now, "dispatch time went backwards");
            self.now = ev.time;
            self.dispatch(ev.event);
        }
        if end > self.now {
            self.now = end;
        }
    }

    /// Build the report from the current state.
    pub fn report(&self) -> SimulationReport {
        let m = &self.metrics;
        let avg_buffer_utilization = if m.snapshots.is_empty() {
            0.0
        } else {
            m.snapshots
                .iter()
                .map(|s| s.avg_buffer_utilization)
                .sum::<f64>()
                / m.snapshots.len() as f64
        };
        let summary = Summary {
            end_time: self.now.as_secs_f64(),
            bundles_generated: m.bundles_generated,
            bundles_delivered: m.bundles_delivered,
            bundles_dropped_eviction: m.bundles_dropped_eviction,
            bundles_dropped_expiry: m.bundles_dropped_expiry,
            bundles_in_store: m.pending_count(),
            segments_sent: m.segments_sent,
            segments_lost: m.segments_lost,
            retransmissions: m.retransmissions,
            sessions_failed: m.sessions_failed,
            sessions_suspended: m.sessions_suspended,
            delivery_ratio: m.delivery_ratio(),
            avg_latency: m.avg_latency(),
            avg_buffer_utilization,
        };
        let nodes = self
            .nodes
            .iter()
            .map(|n| NodeRecord {
                id: n.id,
                generated: n.stats.generated,
                delivered: n.stats.delivered,
                transmitted: n.stats.transmitted,
                received: n.stats.received,
                dropped_eviction: n.stats.dropped_eviction,
                dropped_expiry: n.stats.dropped_expiry,
                final_buffer_occupancy: n.store.len(),
            })
            .collect();
        SimulationReport {
            summary,
            timeline: m.snapshots.clone(),
            nodes,
        }
    }

    fn install_contacts(&mut self) {
        for id in 0..self.plan.len() {
            let (start, end) = {
                let c = self.plan.get(id);
                (c.start, c.end)
            };
            self.schedule_at(start, Event::ContactStart(id));
            self.schedule_at(end, Event::ContactEnd(id));
        }
    }

    fn install_traffic(&mut self) {
        if !self.traffic.enabled() {
            return;
        }
        for node in 0..self.nodes.len() as NodeId {
            let gap = self.traffic.next_interarrival();
            self.schedule(gap, Event::BundleGeneration(node));
        }
    }

    fn dispatch(&mut self, event: Event) {
        match event {
            Event::ContactStart(cid) => self.on_contact_start(cid),
            Event::ContactEnd(cid) => self.on_contact_end(cid),
            Event::BundleGeneration(node) => self.on_bundle_generation(node),
            Event::SegmentArrival { session, index } => self.on_segment_arrival(session, index),
            Event::ReportArrival { session, missing } => {
                self.on_report_arrival(session, missing)
            }
            Event::AckArrival { session } => self.on_ack_arrival(session),
            Event::CheckpointTimeout { session, round } => {
                self.on_checkpoint_timeout(session, round)
            }
            Event::BundleExpiry(id) => self.on_bundle_expiry(id),
            Event::MetricsSnapshot => self.on_metrics_snapshot(),
        }
    }

    fn on_contact_start(&mut self, cid: ContactId) {
        let contact = self.plan.get(cid).clone();
        trace!(contact = cid, a = contact.a, b = contact.b, "contact start");
        self.topology.activate(&contact);
        self.try_open(contact.a, contact.b);
        self.try_open(contact.b, contact.a);
    }

    fn on_contact_end(&mut self, cid: ContactId) {
        let contact = self.plan.get(cid).clone();
        trace!(contact = cid, a = contact.a, b = contact.b, "contact end");
        self.topology.deactivate(&contact);

        // Drop every session that rode this contact. Open transfers are
        // interrupted: their in-flight arrivals find no session and die, and
        // the bundle stays at the sender for reselection.
        let mut ended: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|s| s.contact == cid)
            .map(|s| s.id)
            .collect();
        ended.sort_unstable();
        for sid in ended {
            let Some(session) = self.sessions.remove(&sid) else {
                continue;
            };
            if session.is_closed() {
                continue;
            }
            self.outbound.remove(&(session.sender, session.receiver));
            let retryable = self
                .plan
                .next_contact(session.sender, session.receiver, self.now)
                .is_some_and(|next| next.start < session.bundle.deadline);
            if retryable {
                self.metrics.sessions_suspended += 1;
                debug!(
                    session = sid,
                    bundle = session.bundle.id,
                    "session suspended at contact end"
                );
            } else {
                self.metrics.sessions_failed += 1;
                debug!(
                    session = sid,
                    bundle = session.bundle.id,
                    "session failed: no further contact before deadline"
                );
            }
        }

        // An overlapping window on the same pair may still be open.
        if self.topology.is_active(contact.a, contact.b) {
            self.try_open(contact.a, contact.b);
            self.try_open(contact.b, contact.a);
        }
    }

    fn on_bundle_generation(&mut self, node: NodeId) {
        if !self.traffic.enabled() {
            return;
        }
        let id = self.next_bundle_id;
        self.next_bundle_id += 1;
        let bundle = self
            .traffic
            .draw_bundle(id, node, self.now, self.config.spray_token_budget);
        let deadline = bundle.deadline;
        trace!(
            node,
            bundle = id,
            destination = bundle.destination,
            size = bundle.size,
            priority = bundle.priority.as_str(),
            "bundle generated"
        );
        self.metrics.record_generated(id);
        self.nodes[node as usize].stats.generated += 1;
        self.nodes[node as usize].seen.insert(id);
        self.admit_at(node, bundle);
        self.schedule_at(deadline, Event::BundleExpiry(id));
        self.retry_outbound(node);

        let gap = self.traffic.next_interarrival();
        self.schedule(gap, Event::BundleGeneration(node));
    }

    fn on_segment_arrival(&mut self, sid: SessionId, index: u32) {
        let mut ack = false;
        let mut report: Option<Vec<u32>> = None;
        let contact;
        {
            let now = self.now;
            let Some(session) = self.sessions.get_mut(&sid) else {
                return;
            };
            if session.is_closed() {
                return;
            }
            contact = session.contact;
            session.mark_received(index, now);
            if session.complete() && !session.ack_sent {
                session.ack_sent = true;
                ack = true;
            } else if index + 1 == session.total_segments
                && !session.reported
                && !session.complete()
            {
                // The last segment doubles as the checkpoint signal.
                session.reported = true;
                report = Some(session.missing());
            }
        }
        let prop = self.plan.get(contact).propagation;
        let t = self.now + prop;
        if ack {
            self.schedule_at(t, Event::AckArrival { session: sid });
        } else if let Some(missing) = report {
            trace!(session = sid, missing = missing.len(), "report emitted");
            self.schedule_at(
                t,
                Event::ReportArrival {
                    session: sid,
                    missing,
                },
            );
        }
    }

    fn on_checkpoint_timeout(&mut self, sid: SessionId, round: u32) {
        let (missing, contact) = {
            let Some(session) = self.sessions.get_mut(&sid) else {
                return;
            };
            if session.round != round
                || session.is_closed()
                || session.ack_sent
                || session.reported
                || session.complete()
            {
                return;
            }
            session.reported = true;
            (session.missing(), session.contact)
        };
        trace!(session = sid, missing = missing.len(), "checkpoint timeout");
        let prop = self.plan.get(contact).propagation;
        self.schedule_at(
            self.now + prop,
            Event::ReportArrival {
                session: sid,
                missing,
            },
        );
    }

    fn on_report_arrival(&mut self, sid: SessionId, missing: Vec<u32>) {
        let next = {
            let now = self.now;
            let max_retries = self.config.max_ltp_retries;
            let Some(session) = self.sessions.get_mut(&sid) else {
                return;
            };
            if session.is_closed()
                || session.state != SessionState::Checkpointed
                || missing.is_empty()
            {
                return;
            }
            if session.register_retries(&missing, max_retries) {
                session.state = SessionState::Open;
                session.begin_round(now);
                Some((session.round, session.contact))
            } else {
                None
            }
        };
        match next {
            None => self.close_failed(sid),
            Some((round, contact)) => {
                self.metrics.retransmissions += missing.len() as u64;
                let busy = self.emit_segments(sid, &missing);
                if let Some(session) = self.sessions.get_mut(&sid) {
                    session.state = SessionState::Checkpointed;
                }
                let prop = self.plan.get(contact).propagation;
                let t = self.now + busy + rto(prop);
                self.schedule_at(t, Event::CheckpointTimeout { session: sid, round });
            }
        }
    }

    fn on_ack_arrival(&mut self, sid: SessionId) {
        let live = self
            .sessions
            .get(&sid)
            .is_some_and(|session| !session.is_closed());
        if live {
            self.close_delivered(sid);
        }
    }

    fn on_bundle_expiry(&mut self, id: BundleId) {
        trace!(bundle = id, "deadline passed");
        let now = self.now;
        self.metrics.record_expired(id);
        for i in 0..self.nodes.len() {
            let expired = self.nodes[i].store.expire(now);
            for bundle in expired {
                self.nodes[i].stats.dropped_expiry += 1;
                self.metrics.record_expired(bundle.id);
                self.metrics.record_copy_removed(bundle.id);
            }
        }
    }

    fn on_metrics_snapshot(&mut self) {
        self.take_snapshot();
        let interval = self.config.snapshot_interval();
        self.schedule(interval, Event::MetricsSnapshot);
    }

    /// Open a session from `sender` to `receiver` if a contact is up, the
    /// direction is idle, and the router has a bundle for that peer.
    fn try_open(&mut self, sender: NodeId, receiver: NodeId) {
        if self.outbound.contains_key(&(sender, receiver)) {
            return;
        }
        let Some(cid) = self.topology.active_contact(sender, receiver) else {
            return;
        };
        let bundle_id = {
            let view = NetView {
                topology: &self.topology,
                plan: &self.plan,
            };
            self.nodes[sender as usize]
                .peek_for_peer(receiver, &self.router, &view, self.now)
                .map(|b| b.id)
        };
        if let Some(id) = bundle_id {
            self.open_session(sender, receiver, cid, id);
        }
    }

    /// Re-evaluate every active contact of `node` for new work.
    fn retry_outbound(&mut self, node: NodeId) {
        for peer in self.topology.neighbors(node) {
            self.try_open(node, peer);
        }
    }

    fn open_session(
        &mut self,
        sender: NodeId,
        receiver: NodeId,
        contact: ContactId,
        bundle_id: BundleId,
    ) {
        let Some(bundle) = self.nodes[sender as usize].store.get(bundle_id).cloned() else {
            return;
        };
        let sid = self.next_session_id;
        self.next_session_id += 1;
        let session = Session::open(
            sid,
            contact,
            sender,
            receiver,
            bundle,
            self.config.ltp_segment_size,
            self.now,
        );
        let total = session.total_segments;
        debug!(
            session = sid,
            sender,
            receiver,
            bundle = bundle_id,
            segments = total,
            "session opened"
        );
        self.sessions.insert(sid, session);
        self.outbound.insert((sender, receiver), sid);

        let indices: Vec<u32> = (0..total).collect();
        let busy = self.emit_segments(sid, &indices);
        if let Some(session) = self.sessions.get_mut(&sid) {
            session.state = SessionState::Checkpointed;
        }
        let prop = self.plan.get(contact).propagation;
        self.schedule_at(
            self.now + busy + rto(prop),
            Event::CheckpointTimeout {
                session: sid,
                round: 0,
            },
        );
    }

    /// Emit the given segments back to back. Lost segments still consume
    /// channel time but produce no arrival. Returns the total channel time.
    fn emit_segments(&mut self, sid: SessionId, indices: &[u32]) -> Duration {
        let (bandwidth, error_rate, prop, lens) = {
            let Some(session) = self.sessions.get(&sid) else {
                return Duration::ZERO;
            };
            let contact = self.plan.get(session.contact);
            let lens: Vec<u64> = indices.iter().map(|&i| session.segment_len(i)).collect();
            (
                contact.bandwidth_bps,
                contact.error_rate,
                contact.propagation,
                lens,
            )
        };
        let mut busy = Duration::ZERO;
        for (&index, &len) in indices.iter().zip(lens.iter()) {
            busy += transmit_time(len, bandwidth);
            self.metrics.segments_sent += 1;
            if self.loss_rng.gen::<f64>() < error_rate {
                self.metrics.segments_lost += 1;
                trace!(session = sid, index, "segment lost");
                continue;
            }
            self.schedule_at(
                self.now + busy + prop,
                Event::SegmentArrival {
                    session: sid,
                    index,
                },
            );
        }
        busy
    }

    /// The sender saw the final ack: hand the bundle over and close. The
    /// closed session stays in the table (so late duplicate arrivals find a
    /// closed session, not a dangling id) until its contact ends.
    fn close_delivered(&mut self, sid: SessionId) {
        let (sender, receiver, snapshot) = {
            let Some(session) = self.sessions.get_mut(&sid) else {
                return;
            };
            session.state = SessionState::ClosedDelivered;
            (session.sender, session.receiver, session.bundle.clone())
        };
        self.outbound.remove(&(sender, receiver));

        let id = snapshot.id;
        let now = self.now;
        let spray = matches!(self.router, Router::SprayAndWait);

        let mut copy = snapshot.clone();
        copy.hop_count += 1;
        copy.visited.insert(receiver);
        let to_destination = receiver == copy.destination;
        if spray && !to_destination {
            // The moving copy takes the larger half of the live token count.
            let tokens = self.nodes[sender as usize]
                .store
                .get(id)
                .map(|b| b.tokens)
                .unwrap_or(snapshot.tokens);
            copy.tokens = tokens - tokens / 2;
        }
        debug!(
            session = sid,
            sender,
            receiver,
            bundle = id,
            to_destination,
            "session delivered"
        );

        self.nodes[sender as usize].stats.transmitted += 1;

        let mut receiver_stored = false;
        if to_destination {
            self.nodes[receiver as usize].seen.insert(id);
            self.nodes[receiver as usize].stats.received += 1;
            if !copy.is_expired(now) && self.metrics.record_delivery(id, now - copy.created_at) {
                self.nodes[receiver as usize].stats.delivered += 1;
            }
        } else if self.nodes[receiver as usize].seen.contains(&id) {
            trace!(receiver, bundle = id, "duplicate copy suppressed");
        } else if copy.is_expired(now) {
            trace!(receiver, bundle = id, "stale transfer discarded");
        } else {
            self.nodes[receiver as usize].seen.insert(id);
            self.nodes[receiver as usize].stats.received += 1;
            receiver_stored = self.admit_at(receiver, copy);
        }

        // Custody at the sender: flooding policies keep their copy for other
        // peers, the single-copy policy hands custody over (unless the
        // receiver could not store it).
        let keep = match self.router {
            Router::Epidemic | Router::SprayAndWait => !to_destination,
            Router::Predictive => !to_destination && !receiver_stored,
        };
        if keep {
            if let Some(stored) = self.nodes[sender as usize].store.get_mut(id) {
                stored.visited.insert(receiver);
                if spray && receiver_stored && stored.tokens > 1 {
                    stored.tokens /= 2;
                }
            }
        } else if self.nodes[sender as usize].store.remove(id).is_some() {
            self.metrics.record_copy_removed(id);
        }

        self.retry_outbound(sender);
        self.retry_outbound(receiver);
    }

    /// A segment ran out of retries: close the session, keep the bundle.
    fn close_failed(&mut self, sid: SessionId) {
        let (sender, receiver, bundle) = {
            let Some(session) = self.sessions.get_mut(&sid) else {
                return;
            };
            session.state = SessionState::ClosedFailed;
            (session.sender, session.receiver, session.bundle.id)
        };
        self.outbound.remove(&(sender, receiver));
        self.metrics.sessions_failed += 1;
        debug!(
            session = sid,
            sender,
            receiver,
            bundle,
            "session failed: retry budget exhausted"
        );
        self.retry_outbound(sender);
    }

    /// Admit a bundle at a node, with the drop bookkeeping on both the node
    /// and the global counters. Returns whether the bundle was stored.
    fn admit_at(&mut self, node: NodeId, bundle: Bundle) -> bool {
        let id = bundle.id;
        match self.nodes[node as usize].store.admit(bundle) {
            Admission::Stored => {
                self.metrics.record_copy_stored(id);
                true
            }
            Admission::Evicted(victim) if victim.id == id => {
                debug!(node, bundle = id, "admission refused by full store");
                self.nodes[node as usize].stats.dropped_eviction += 1;
                self.metrics.record_rejected(id);
                false
            }
            Admission::Evicted(victim) => {
                debug!(node, bundle = id, victim = victim.id, "admission displaced a resident");
                self.nodes[node as usize].stats.dropped_eviction += 1;
                self.metrics.record_eviction(victim.id);
                self.metrics.record_copy_stored(id);
                true
            }
        }
    }

    fn take_snapshot(&mut self) {
        let utilization = if self.nodes.is_empty() {
            0.0
        } else {
            self.nodes
                .iter()
                .map(|n| n.store.len() as f64 / n.store.capacity() as f64)
                .sum::<f64>()
                / self.nodes.len() as f64
        };
        let snapshot = Snapshot {
            time: self.now.as_secs_f64(),
            generated: self.metrics.bundles_generated,
            delivered: self.metrics.bundles_delivered,
            avg_latency: self.metrics.avg_latency(),
            avg_buffer_utilization: utilization,
        };
        self.metrics.snapshots.push(snapshot);
    }
}
