//! Allocator configuration
//!
//! Every knob is validated up front by [`AllocatorConfig::validate`], so an
//! allocator that was built successfully can never divide by a zero
//! bandwidth or produce a non-finite event time.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimulationError};

/// Which selection strategy the allocator runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Directly linked worker with the lowest latency
    #[default]
    DirectLatency,

    /// `chain_length` least-loaded workers anywhere in the network
    Chain,
}

/// Ordering among chain candidates with the same queue length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Higher capacity first, then node id
    #[default]
    CapacityFirst,

    /// Node id only
    QueueLengthOnly,
}

/// How a chain divides a task's complexity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PortionSplit {
    /// Same share for every worker
    #[default]
    Equal,

    /// Share proportional to each worker's capacity
    CapacityWeighted,
}

/// Source of per-hop bandwidth (Mbps) for chain transmissions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum BandwidthModel {
    /// Same bandwidth on every hop
    Fixed { mbps: f64 },

    /// Drawn uniformly from `[min, max]` for every hop
    Uniform { min: f64, max: f64 },

    /// Topology link when the hop endpoints are linked, otherwise uniform
    LinkOrUniform { min: f64, max: f64 },
}

impl Default for BandwidthModel {
    fn default() -> Self {
        BandwidthModel::Uniform {
            min: 10.0,
            max: 100.0,
        }
    }
}

impl BandwidthModel {
    pub fn validate(&self) -> Result<()> {
        match *self {
            BandwidthModel::Fixed { mbps } => check_positive("fixed bandwidth model", mbps),
            BandwidthModel::Uniform { min, max } | BandwidthModel::LinkOrUniform { min, max } => {
                check_positive("bandwidth model minimum", min)?;
                check_positive("bandwidth model maximum", max)?;
                if max < min {
                    return Err(SimulationError::config(format!(
                        "bandwidth range is empty: min {} > max {}",
                        min, max
                    )));
                }
                Ok(())
            }
        }
    }
}

fn check_positive(context: &str, bandwidth: f64) -> Result<()> {
    if !bandwidth.is_finite() || bandwidth <= 0.0 {
        return Err(SimulationError::bandwidth(context, bandwidth));
    }
    Ok(())
}

/// Allocator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    pub policy: PolicyKind,

    /// Workers per chain (`d`)
    pub chain_length: usize,

    pub tie_break: TieBreak,

    pub portion_split: PortionSplit,

    pub bandwidth: BandwidthModel,

    /// Seconds a direct candidate may take for the whole task.
    /// With the default of 1 s a worker qualifies when
    /// `capacity_tflops * 1e12 >= complexity`.
    pub time_budget_secs: f64,

    /// Simulated time at which allocation happens
    pub start_time: f64,

    /// Seed for bandwidth sampling and task shuffling
    pub seed: u64,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        AllocatorConfig {
            policy: PolicyKind::default(),
            chain_length: 3,
            tie_break: TieBreak::default(),
            portion_split: PortionSplit::default(),
            bandwidth: BandwidthModel::default(),
            time_budget_secs: 1.0,
            start_time: 0.0,
            seed: 42,
        }
    }
}

impl AllocatorConfig {
    /// Direct nearest-latency allocation
    pub fn direct() -> Self {
        AllocatorConfig {
            policy: PolicyKind::DirectLatency,
            ..Default::default()
        }
    }

    /// Chain allocation over `chain_length` workers
    pub fn chain(chain_length: usize) -> Self {
        AllocatorConfig {
            policy: PolicyKind::Chain,
            chain_length,
            ..Default::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_bandwidth(mut self, bandwidth: BandwidthModel) -> Self {
        self.bandwidth = bandwidth;
        self
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    pub fn with_portion_split(mut self, portion_split: PortionSplit) -> Self {
        self.portion_split = portion_split;
        self
    }

    pub fn with_start_time(mut self, start_time: f64) -> Self {
        self.start_time = start_time;
        self
    }

    /// Parse and validate a JSON configuration; missing fields take defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: AllocatorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chain_length == 0 {
            return Err(SimulationError::InvalidChainLength(self.chain_length));
        }
        if !self.time_budget_secs.is_finite() || self.time_budget_secs <= 0.0 {
            return Err(SimulationError::config(format!(
                "time budget must be positive, got {}",
                self.time_budget_secs
            )));
        }
        if !self.start_time.is_finite() || self.start_time < 0.0 {
            return Err(SimulationError::config(format!(
                "start time must be non-negative, got {}",
                self.start_time
            )));
        }
        self.bandwidth.validate()
    }
}
