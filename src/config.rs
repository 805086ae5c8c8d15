//! Simulation configuration and validation.

use core::fmt;
use core::str::FromStr;

use thiserror::Error;

use crate::time::{Duration, Timestamp};

/// Routing policy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterKind {
    /// Flood every bundle to every eligible neighbor, keeping local copies.
    Epidemic,
    /// Bounded replication with a per-copy token budget.
    SprayAndWait,
    /// Contact-graph search for the earliest-arrival path.
    Predictive,
}

impl FromStr for RouterKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "epidemic" => Ok(RouterKind::Epidemic),
            "spray_and_wait" => Ok(RouterKind::SprayAndWait),
            "predictive" => Ok(RouterKind::Predictive),
            other => Err(ConfigError::UnknownRouter(other.to_string())),
        }
    }
}

impl fmt::Display for RouterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RouterKind::Epidemic => "epidemic",
            RouterKind::SprayAndWait => "spray_and_wait",
            RouterKind::Predictive => "predictive",
        };
        f.write_str(name)
    }
}

/// Invalid configuration. The only error that aborts a run; everything the
/// network does wrong at runtime is an outcome, not an error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("num_nodes must be at least 2 (got {0})")]
    NodeCount(usize),
    #[error("{name} must be positive and finite (got {value})")]
    NonPositive { name: &'static str, value: f64 },
    #[error("{name} must not be negative (got {value})")]
    Negative { name: &'static str, value: f64 },
    #[error("{name} must be within [0, 1] (got {value})")]
    OutOfUnitRange { name: &'static str, value: f64 },
    #[error("{name} range ({lo}, {hi}) is empty or starts at zero")]
    BadRange {
        name: &'static str,
        lo: u64,
        hi: u64,
    },
    #[error("min_contact_duration {min} exceeds max_contact_duration {max}")]
    ContactDurations { min: f64, max: f64 },
    #[error("max_buffer_size must be at least 1 bundle")]
    BufferSize,
    #[error("ltp_segment_size must be at least 1 byte")]
    SegmentSize,
    #[error("qos_priority_levels is fixed at 4 (got {0})")]
    PriorityLevels(u32),
    #[error("spray_token_budget must be at least 1")]
    SprayBudget,
    #[error("unknown router kind: {0}")]
    UnknownRouter(String),
}

/// All tunables of a simulation run. Times are in seconds, sizes in bytes,
/// bandwidths in bits per second.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub num_nodes: usize,
    pub simulation_time: f64,
    /// Bundle store capacity per node, in bundles.
    pub max_buffer_size: usize,
    pub ltp_segment_size: u32,
    /// Number of QoS classes. The CRITICAL/HIGH/NORMAL/LOW mapping is fixed,
    /// so only 4 is accepted.
    pub qos_priority_levels: u32,
    /// Mean bundles per second generated at each node. Zero disables traffic.
    pub bundle_generation_rate: f64,
    pub bundle_size_range: (u64, u64),
    pub bundle_ttl: f64,
    pub contact_probability: f64,
    pub min_contact_duration: f64,
    pub max_contact_duration: f64,
    pub base_error_rate: f64,
    pub bandwidth_range: (u64, u64),
    pub router_kind: RouterKind,
    pub spray_token_budget: u32,
    pub max_ltp_retries: u32,
    pub metrics_snapshot_interval: f64,
    /// Constant one-way propagation delay per link.
    pub propagation_delay: f64,
    pub random_seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            num_nodes: 8,
            simulation_time: 500.0,
            max_buffer_size: 50,
            ltp_segment_size: 1024,
            qos_priority_levels: 4,
            bundle_generation_rate: 0.1,
            bundle_size_range: (512, 4096),
            bundle_ttl: 300.0,
            contact_probability: 0.6,
            min_contact_duration: 10.0,
            max_contact_duration: 60.0,
            base_error_rate: 0.01,
            bandwidth_range: (65_536, 1_048_576),
            router_kind: RouterKind::Epidemic,
            spray_token_budget: 4,
            max_ltp_retries: 5,
            metrics_snapshot_interval: 100.0,
            propagation_delay: 0.0,
            random_seed: 45,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_nodes < 2 {
            return Err(ConfigError::NodeCount(self.num_nodes));
        }
        Self::positive("simulation_time", self.simulation_time)?;
        if self.max_buffer_size == 0 {
            return Err(ConfigError::BufferSize);
        }
        if self.ltp_segment_size == 0 {
            return Err(ConfigError::SegmentSize);
        }
        if self.qos_priority_levels != 4 {
            return Err(ConfigError::PriorityLevels(self.qos_priority_levels));
        }
        Self::non_negative("bundle_generation_rate", self.bundle_generation_rate)?;
        let (size_lo, size_hi) = self.bundle_size_range;
        if size_lo == 0 || size_lo > size_hi {
            return Err(ConfigError::BadRange {
                name: "bundle_size_range",
                lo: size_lo,
                hi: size_hi,
            });
        }
        Self::positive("bundle_ttl", self.bundle_ttl)?;
        Self::unit_range("contact_probability", self.contact_probability)?;
        Self::positive("min_contact_duration", self.min_contact_duration)?;
        Self::positive("max_contact_duration", self.max_contact_duration)?;
        if self.min_contact_duration > self.max_contact_duration {
            return Err(ConfigError::ContactDurations {
                min: self.min_contact_duration,
                max: self.max_contact_duration,
            });
        }
        Self::unit_range("base_error_rate", self.base_error_rate)?;
        let (bw_lo, bw_hi) = self.bandwidth_range;
        if bw_lo == 0 || bw_lo > bw_hi {
            return Err(ConfigError::BadRange {
                name: "bandwidth_range",
                lo: bw_lo,
                hi: bw_hi,
            });
        }
        if self.spray_token_budget == 0 {
            return Err(ConfigError::SprayBudget);
        }
        Self::positive("metrics_snapshot_interval", self.metrics_snapshot_interval)?;
        Self::non_negative("propagation_delay", self.propagation_delay)?;
        Ok(())
    }

    /// End of simulated time.
    pub fn horizon(&self) -> Timestamp {
        Timestamp::from_secs_f64(self.simulation_time)
    }

    /// Bundle lifetime as a duration.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs_f64(self.bundle_ttl)
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs_f64(self.metrics_snapshot_interval)
    }

    /// One-way propagation delay per link.
    pub fn propagation(&self) -> Duration {
        Duration::from_secs_f64(self.propagation_delay)
    }

    fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
        if !value.is_finite() || value <= 0.0 {
            return Err(ConfigError::NonPositive { name, value });
        }
        Ok(())
    }

    fn non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
        if !value.is_finite() || value < 0.0 {
            return Err(ConfigError::Negative { name, value });
        }
        Ok(())
    }

    fn unit_range(name: &'static str, value: f64) -> Result<(), ConfigError> {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::OutOfUnitRange { name, value });
        }
        Ok(())
    }
}
