//! Bundle-layer data types.

use hashbrown::HashSet;

use crate::time::Timestamp;

/// Node identifier. Nodes are created densely, so this doubles as an index
/// into the simulator's node table.
pub type NodeId = u32;

/// Monotonically assigned bundle identifier. Copies of a bundle made by
/// replicating routers share the id of the original.
pub type BundleId = u64;

/// QoS class of a bundle. Lower variants are more important; the derived
/// ordering (`Critical < High < Normal < Low`) is what the store sorts by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Critical,
    High,
    Normal,
    Low,
}

impl Priority {
    /// All classes, most important first.
    pub const ALL: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    /// Map a numeric QoS level to a class. Levels beyond the last class
    /// saturate to `Low`.
    pub fn from_index(index: u8) -> Self {
        match index {
            0 => Priority::Critical,
            1 => Priority::High,
            2 => Priority::Normal,
            _ => Priority::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

/// The unit of application data routed end to end.
///
/// Immutable after creation except for `hop_count`, `visited` and `tokens`,
/// which only ever grow (or, for tokens, split between copies).
#[derive(Debug, Clone)]
pub struct Bundle {
    pub id: BundleId,
    pub source: NodeId,
    pub destination: NodeId,
    /// Payload size in bytes. Only the length is simulated.
    pub size: u64,
    pub priority: Priority,
    pub created_at: Timestamp,
    /// Absolute deadline: `created_at` plus the configured TTL.
    pub deadline: Timestamp,
    pub hop_count: u32,
    /// Spray-and-wait replication allowance carried by this copy.
    pub tokens: u32,
    /// Nodes this copy (or an ancestor of it) has passed through.
    pub visited: HashSet<NodeId>,
}

impl Bundle {
    pub fn new(
        id: BundleId,
        source: NodeId,
        destination: NodeId,
        size: u64,
        priority: Priority,
        created_at: Timestamp,
        deadline: Timestamp,
        tokens: u32,
    ) -> Self {
        let mut visited = HashSet::new();
        visited.insert(source);
        Self {
            id,
            source,
            destination,
            size,
            priority,
            created_at,
            deadline,
            hop_count: 0,
            tokens,
            visited,
        }
    }

    /// Whether the deadline has passed at `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.deadline <= now
    }
}
