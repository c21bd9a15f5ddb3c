//! Core types for the simulation engine

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimulationError};
use crate::topology::TopologyProvider;

/// FLOPS in one TFLOPS; worker capacities are configured in TFLOPS.
pub const FLOPS_PER_TFLOP: f64 = 1e12;

/// Identifier of a worker or requester node (e.g. `"user_1"`, `"enterprise_0"`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        NodeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        NodeId(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        NodeId(id)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sequential task identifier, unique within one run
pub type TaskId = u64;

/// A directed link between two nodes
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
}

impl Edge {
    pub fn new(from: NodeId, to: NodeId) -> Self {
        Edge { from, to }
    }
}

impl std::fmt::Display for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// Link parameters supplied by the topology provider
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub bandwidth: f64, // Mbps, used as MB/s for transmission time
    pub latency: f64,   // ms, only used to rank direct candidates
}

/// Work submitted by a requester, before it becomes a [`Task`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub requester: NodeId,
    pub complexity: f64, // FLOPS
    pub data_size: f64,  // MB
}

impl TaskRequest {
    pub fn new(requester: impl Into<NodeId>, complexity: f64, data_size: f64) -> Self {
        TaskRequest {
            requester: requester.into(),
            complexity,
            data_size,
        }
    }
}

/// Dispatch state of a task.
///
/// `Dispatched` means every event for the task has been placed on the
/// timeline. When the work actually finishes in simulated time is tracked by
/// the simulator, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Dispatched,
}

/// Timings derived when the task is dispatched
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaskTimings {
    pub dispatched_at: f64,
    pub transmission_time: f64, // Sum over every hop
    pub compute_time: f64,      // Sum over every portion
    pub expected_finish: f64,
}

impl TaskTimings {
    pub fn total_time(&self) -> f64 {
        self.transmission_time + self.compute_time
    }
}

/// A task to be offloaded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub requester: NodeId,
    pub complexity: f64,
    pub data_size: f64,
    pub status: TaskStatus,
    pub timings: Option<TaskTimings>,
}

impl Task {
    /// Build a task from a request, rejecting negative or non-finite sizes
    pub fn new(id: TaskId, request: TaskRequest) -> Result<Self> {
        let TaskRequest {
            requester,
            complexity,
            data_size,
        } = request;

        if !complexity.is_finite() || complexity < 0.0 {
            return Err(SimulationError::InvalidTask {
                requester,
                reason: format!("complexity must be a non-negative number, got {}", complexity),
            });
        }
        if !data_size.is_finite() || data_size < 0.0 {
            return Err(SimulationError::InvalidTask {
                requester,
                reason: format!("data size must be a non-negative number, got {}", data_size),
            });
        }

        Ok(Task {
            id,
            requester,
            complexity,
            data_size,
            status: TaskStatus::Pending,
            timings: None,
        })
    }

    /// Turn a batch of requests into tasks with sequential ids from 0.
    ///
    /// Every requester must be a requester node of `topology`.
    pub fn from_requests<I>(requests: I, topology: &dyn TopologyProvider) -> Result<Vec<Task>>
    where
        I: IntoIterator<Item = TaskRequest>,
    {
        Task::from_requests_starting_at(0, requests, topology)
    }

    /// Like [`Task::from_requests`], numbering from `first_id`.
    ///
    /// Later batches of the same run start after the last id handed out, so
    /// ids stay unique across `allocate` calls.
    pub fn from_requests_starting_at<I>(
        first_id: TaskId,
        requests: I,
        topology: &dyn TopologyProvider,
    ) -> Result<Vec<Task>>
    where
        I: IntoIterator<Item = TaskRequest>,
    {
        requests
            .into_iter()
            .zip(first_id..)
            .map(|(request, id)| {
                if !topology.is_requester(&request.requester) {
                    return Err(SimulationError::UnknownNode(request.requester));
                }
                Task::new(id, request)
            })
            .collect()
    }

    pub fn is_pending(&self) -> bool {
        self.status == TaskStatus::Pending
    }

    pub fn is_dispatched(&self) -> bool {
        self.status == TaskStatus::Dispatched
    }

    pub(crate) fn mark_dispatched(&mut self, timings: TaskTimings) {
        self.status = TaskStatus::Dispatched;
        self.timings = Some(timings);
    }
}
