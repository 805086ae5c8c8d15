//! Scenario builder for tests and scripted experiments.
//!
//! A fresh builder is fully scripted: no generated contact plan and no
//! background traffic. Add hand-built contact windows and bundles, or turn
//! the generators back on with the `with_*` setters.

use crate::bundle::{NodeId, Priority};
use crate::config::{ConfigError, RouterKind, SimConfig};
use crate::metrics::SimulationReport;
use crate::plan::{Contact, ContactPlan};
use crate::sim::Simulator;
use crate::time::Timestamp;

/// Builder for simulation runs.
pub struct ScenarioBuilder {
    config: SimConfig,
    contacts: Vec<(NodeId, NodeId, f64, f64, u64, f64)>,
    bundles: Vec<(NodeId, NodeId, u64, Priority)>,
}

impl ScenarioBuilder {
    /// Create a scripted scenario with the given number of nodes.
    pub fn new(num_nodes: usize) -> Self {
        let config = SimConfig {
            num_nodes,
            contact_probability: 0.0,
            bundle_generation_rate: 0.0,
            ..SimConfig::default()
        };
        Self {
            config,
            contacts: Vec::new(),
            bundles: Vec::new(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.random_seed = seed;
        self
    }

    pub fn with_router(mut self, kind: RouterKind) -> Self {
        self.config.router_kind = kind;
        self
    }

    /// Simulated time horizon, seconds.
    pub fn with_horizon(mut self, seconds: f64) -> Self {
        self.config.simulation_time = seconds;
        self
    }

    pub fn with_buffer_capacity(mut self, bundles: usize) -> Self {
        self.config.max_buffer_size = bundles;
        self
    }

    pub fn with_segment_size(mut self, bytes: u32) -> Self {
        self.config.ltp_segment_size = bytes;
        self
    }

    /// Bundle time-to-live, seconds.
    pub fn with_ttl(mut self, seconds: f64) -> Self {
        self.config.bundle_ttl = seconds;
        self
    }

    /// Re-enable background traffic at the given mean rate per node.
    pub fn with_generation_rate(mut self, bundles_per_second: f64) -> Self {
        self.config.bundle_generation_rate = bundles_per_second;
        self
    }

    /// Re-enable plan generation with the given pair probability.
    pub fn with_contact_probability(mut self, probability: f64) -> Self {
        self.config.contact_probability = probability;
        self
    }

    pub fn with_snapshot_interval(mut self, seconds: f64) -> Self {
        self.config.metrics_snapshot_interval = seconds;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.config.max_ltp_retries = retries;
        self
    }

    pub fn with_spray_budget(mut self, tokens: u32) -> Self {
        self.config.spray_token_budget = tokens;
        self
    }

    /// One-way propagation delay per link, seconds.
    pub fn with_propagation_delay(mut self, seconds: f64) -> Self {
        self.config.propagation_delay = seconds;
        self
    }

    /// Add a contact window (times in seconds, bandwidth in bits/s).
    pub fn contact(
        mut self,
        a: NodeId,
        b: NodeId,
        start: f64,
        end: f64,
        bandwidth_bps: u64,
        error_rate: f64,
    ) -> Self {
        self.contacts
            .push((a, b, start, end, bandwidth_bps, error_rate));
        self
    }

    /// Inject a bundle at simulation start.
    pub fn bundle(mut self, source: NodeId, destination: NodeId, size: u64, priority: Priority) -> Self {
        self.bundles.push((source, destination, size, priority));
        self
    }

    /// Build the simulator. Explicit contacts override plan generation.
    pub fn build(self) -> Result<Simulator, ConfigError> {
        let Self {
            config,
            contacts,
            bundles,
        } = self;
        let mut sim = if contacts.is_empty() {
            Simulator::new(config)?
        } else {
            let propagation = config.propagation();
            let plan = ContactPlan::new(
                contacts
                    .into_iter()
                    .map(|(a, b, start, end, bandwidth_bps, error_rate)| Contact {
                        id: 0,
                        a,
                        b,
                        start: Timestamp::from_secs_f64(start),
                        end: Timestamp::from_secs_f64(end),
                        bandwidth_bps,
                        error_rate,
                        propagation,
                    })
                    .collect(),
            );
            Simulator::with_plan(config, plan)?
        };
        for (source, destination, size, priority) in bundles {
            sim.submit_bundle(source, destination, size, priority);
        }
        Ok(sim)
    }

    /// Build and run to the horizon.
    pub fn run(self) -> Result<SimulationReport, ConfigError> {
        let mut sim = self.build()?;
        Ok(sim.run())
    }
}
