//! Event types and the ordering used by the scheduler's priority queue.

use std::cmp::Ordering;

use crate::bundle::{BundleId, NodeId};
use crate::ltp::SessionId;
use crate::plan::ContactId;
use crate::time::Timestamp;

/// Insertion counter giving deterministic order among same-time events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Everything that can happen in the simulation.
///
/// Nothing is ever removed from the queue. Cancellation is by invalidation:
/// session ids are never reused, so an event whose session has been closed
/// or suspended (or whose checkpoint round has passed) finds nothing to act
/// on and is dropped by its handler.
#[derive(Debug, Clone)]
pub enum Event {
    /// A contact window opens.
    ContactStart(ContactId),
    /// A contact window closes.
    ContactEnd(ContactId),
    /// The traffic source at a node produces its next bundle.
    BundleGeneration(NodeId),
    /// A data segment reaches the receiver.
    SegmentArrival { session: SessionId, index: u32 },
    /// The receiver's report of missing segments reaches the sender.
    ReportArrival {
        session: SessionId,
        missing: Vec<u32>,
    },
    /// The receiver's final acknowledgement reaches the sender.
    AckArrival { session: SessionId },
    /// The checkpoint timer for one report round fires at the receiver.
    CheckpointTimeout { session: SessionId, round: u32 },
    /// A bundle's deadline passes.
    BundleExpiry(BundleId),
    /// Periodic metrics sampling.
    MetricsSnapshot,
}

impl Event {
    /// Dispatch class at equal timestamps. Contact teardown sorts after
    /// everything else carrying the same timestamp, so a segment arriving
    /// exactly at `t_end` is still delivered over the contact.
    fn class(&self) -> u8 {
        match self {
            Event::ContactEnd(_) => 1,
            _ => 0,
        }
    }
}

/// An event with its dispatch time and tie-breaking keys.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    pub time: Timestamp,
    class: u8,
    pub seq: SequenceNumber,
    pub event: Event,
}

impl ScheduledEvent {
    pub fn new(time: Timestamp, seq: SequenceNumber, event: Event) -> Self {
        let class = event.class();
        Self {
            time,
            class,
            seq,
            event,
        }
    }
}

// BinaryHeap is a max-heap; reverse the comparison to pop the earliest
// (time, class, seq) first.
impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.class == other.class && self.seq == other.seq
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.class.cmp(&self.class))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(time: Timestamp, seq: u64, event: Event) -> ScheduledEvent {
        ScheduledEvent::new(time, SequenceNumber::new(seq), event)
    }

    #[test]
    fn test_earlier_time_pops_first() {
        let e1 = at(Timestamp::from_secs(10), 1, Event::MetricsSnapshot);
        let e2 = at(Timestamp::from_secs(5), 2, Event::MetricsSnapshot);

        // Min-heap semantics: the earlier event is "greater".
        assert!(e2 > e1);
    }

    #[test]
    fn test_same_time_fifo_by_insertion() {
        let e1 = at(Timestamp::from_secs(10), 1, Event::BundleGeneration(0));
        let e2 = at(Timestamp::from_secs(10), 2, Event::BundleGeneration(1));

        assert!(e1 > e2);
    }

    #[test]
    fn test_contact_end_yields_to_same_time_arrivals() {
        // The teardown was scheduled long before the arrival, so it holds the
        // smaller sequence number; the arrival must still win the tie.
        let teardown = at(Timestamp::from_secs(60), 0, Event::ContactEnd(3));
        let arrival = at(
            Timestamp::from_secs(60),
            99,
            Event::SegmentArrival {
                session: 1,
                index: 0,
            },
        );

        assert!(arrival > teardown);
    }

    #[test]
    fn test_heap_integration() {
        use std::collections::BinaryHeap;

        let mut heap = BinaryHeap::new();
        heap.push(at(Timestamp::from_secs(60), 0, Event::ContactEnd(0)));
        heap.push(at(Timestamp::from_secs(30), 1, Event::MetricsSnapshot));
        heap.push(at(Timestamp::from_secs(60), 2, Event::BundleGeneration(0)));

        let order: Vec<u64> = std::iter::from_fn(|| heap.pop().map(|e| e.seq.value())).collect();
        assert_eq!(order, vec![1, 2, 0]);
    }
}
