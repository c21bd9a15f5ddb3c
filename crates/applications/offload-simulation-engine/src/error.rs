//! Error types for the offload simulation engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{NodeId, TaskId};

/// Simulation result type
pub type Result<T> = std::result::Result<T, SimulationError>;

/// Configuration and scheduling errors.
///
/// Everything here is fatal for the call that produced it and is raised
/// before any allocation runs. A task that cannot be placed is not an error,
/// see [`UnassignableReason`].
#[derive(Error, Debug)]
pub enum SimulationError {
    /// Worker configured with zero, negative or non-finite compute capacity
    #[error("Invalid capacity for node {node}: {capacity} TFLOPS")]
    InvalidCapacity { node: NodeId, capacity: f64 },

    /// Link or bandwidth model with zero, negative or non-finite bandwidth
    #[error("Invalid bandwidth {bandwidth} Mbps: {context}")]
    InvalidBandwidth { context: String, bandwidth: f64 },

    /// Chain policy configured with fewer than one worker per chain
    #[error("Invalid chain length: {0}")]
    InvalidChainLength(usize),

    /// Task request with a negative or non-finite size
    #[error("Invalid task from {requester}: {reason}")]
    InvalidTask { requester: NodeId, reason: String },

    /// Event scheduled at a negative or non-finite time
    #[error("Invalid event time: {0}")]
    InvalidTime(f64),

    /// Node id referenced but not present in the topology
    #[error("Node {0} not found")]
    UnknownNode(NodeId),

    /// Node id registered twice
    #[error("Node {0} is already registered")]
    DuplicateNode(NodeId),

    /// Pending task whose id was already dispatched by this allocator
    #[error("Task {0} was already dispatched")]
    DuplicateTask(TaskId),

    /// Any other rejected configuration value
    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SimulationError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a bandwidth error
    pub fn bandwidth(context: impl Into<String>, bandwidth: f64) -> Self {
        Self::InvalidBandwidth {
            context: context.into(),
            bandwidth,
        }
    }
}

/// Why a task was skipped by the allocator.
///
/// Recovered locally: the task stays pending, the reason is recorded in the
/// allocation report and the run continues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnassignableReason {
    /// No directly linked worker can finish the task within the time budget
    NoDirectCandidate,

    /// Fewer workers exist than the configured chain length
    InsufficientDevices { required: usize, available: usize },

    /// Planned timings left the finite range (e.g. huge data over a slow link)
    TimingOverflow { time: f64 },
}

impl std::fmt::Display for UnassignableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnassignableReason::NoDirectCandidate => write!(f, "no suitable directly linked worker"),
            UnassignableReason::InsufficientDevices { required, available } => write!(
                f,
                "insufficient devices: chain needs {} workers, {} available",
                required, available
            ),
            UnassignableReason::TimingOverflow { time } => {
                write!(f, "timing overflow: planned event time {}", time)
            }
        }
    }
}
