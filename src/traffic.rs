//! Application traffic source.
//!
//! One seeded generator drives every node's arrivals; inter-arrival gaps are
//! exponential (Poisson process per node), destinations are uniform over the
//! other nodes, sizes uniform over the configured range, priorities uniform
//! over the four classes.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::bundle::{Bundle, BundleId, NodeId, Priority};
use crate::config::SimConfig;
use crate::time::{Duration, Timestamp};

#[derive(Debug, Clone)]
pub struct TrafficSource {
    rng: ChaCha8Rng,
    rate_per_ms: f64,
    num_nodes: usize,
    size_range: (u64, u64),
    ttl: Duration,
}

impl TrafficSource {
    pub fn new(config: &SimConfig, rng: ChaCha8Rng) -> Self {
        Self {
            rng,
            rate_per_ms: config.bundle_generation_rate / 1000.0,
            num_nodes: config.num_nodes,
            size_range: config.bundle_size_range,
            ttl: config.ttl(),
        }
    }

    /// Whether this source produces any traffic at all.
    pub fn enabled(&self) -> bool {
        self.rate_per_ms > 0.0
    }

    /// Gap until a node's next bundle, exponentially distributed.
    pub fn next_interarrival(&mut self) -> Duration {
        let u: f64 = self.rng.gen::<f64>().clamp(f64::MIN_POSITIVE, 1.0);
        let delta_ms = -u.ln() / self.rate_per_ms;
        Duration::from_millis((delta_ms.round() as u64).max(1))
    }

    /// Draw a fresh bundle originating at `source`.
    pub fn draw_bundle(
        &mut self,
        id: BundleId,
        source: NodeId,
        now: Timestamp,
        tokens: u32,
    ) -> Bundle {
        let destination = self.draw_destination(source);
        let (lo, hi) = self.size_range;
        let size = self.rng.gen_range(lo..=hi);
        let priority = Priority::from_index(self.rng.gen_range(0..4u8));
        Bundle::new(
            id,
            source,
            destination,
            size,
            priority,
            now,
            now + self.ttl,
            tokens,
        )
    }

    /// Uniform over all nodes except `source`.
    fn draw_destination(&mut self, source: NodeId) -> NodeId {
        let n = self.num_nodes as NodeId;
        let mut dest = self.rng.gen_range(0..n - 1);
        if dest >= source {
            dest += 1;
        }
        dest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn source(seed: u64) -> TrafficSource {
        let config = SimConfig {
            num_nodes: 5,
            bundle_generation_rate: 2.0,
            ..SimConfig::default()
        };
        TrafficSource::new(&config, ChaCha8Rng::seed_from_u64(seed))
    }

    #[test]
    fn test_deterministic_sequence() {
        let mut a = source(7);
        let mut b = source(7);
        for i in 0..20 {
            assert_eq!(a.next_interarrival(), b.next_interarrival());
            let ba = a.draw_bundle(i, 2, Timestamp::ZERO, 4);
            let bb = b.draw_bundle(i, 2, Timestamp::ZERO, 4);
            assert_eq!(ba.destination, bb.destination);
            assert_eq!(ba.size, bb.size);
            assert_eq!(ba.priority, bb.priority);
        }
    }

    #[test]
    fn test_destination_never_source() {
        let mut s = source(11);
        for i in 0..200 {
            let b = s.draw_bundle(i, 3, Timestamp::ZERO, 4);
            assert_ne!(b.destination, 3);
            assert!(b.destination < 5);
        }
    }

    #[test]
    fn test_sizes_within_range() {
        let mut s = source(13);
        for i in 0..100 {
            let b = s.draw_bundle(i, 0, Timestamp::ZERO, 4);
            assert!((512..=4096).contains(&b.size));
        }
    }

    #[test]
    fn test_interarrival_positive() {
        let mut s = source(17);
        for _ in 0..100 {
            assert!(s.next_interarrival() >= Duration::from_millis(1));
        }
    }
}
