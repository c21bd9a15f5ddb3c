//! Per-worker compute state
//!
//! The allocator appends portions to a worker's queue and reads its priority;
//! the simulator pops portions as simulated time advances.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimulationError};
use crate::topology::{self, TopologyProvider};
use crate::types::{FLOPS_PER_TFLOP, NodeId, TaskId};

/// Work waiting in a worker's queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedPortion {
    pub task: TaskId,
    pub portion: f64,    // FLOPS
    pub start_time: f64, // Scheduled start in simulated seconds
}

/// Portion currently being computed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivePortion {
    pub task: TaskId,
    pub portion: f64,
    pub started_at: f64,
    pub completes_at: f64,
}

/// Mutable state of one worker
#[derive(Debug, Clone)]
pub struct NodeResource {
    id: NodeId,
    capacity_flops: f64,
    queue: VecDeque<QueuedPortion>,
    active: Option<ActivePortion>,
    available_at: f64,
}

impl NodeResource {
    /// Create a worker; capacity must be a positive number of TFLOPS
    pub fn new(id: NodeId, capacity_tflops: f64) -> Result<Self> {
        if !capacity_tflops.is_finite() || capacity_tflops <= 0.0 {
            return Err(SimulationError::InvalidCapacity {
                node: id,
                capacity: capacity_tflops,
            });
        }

        Ok(NodeResource {
            id,
            capacity_flops: capacity_tflops * FLOPS_PER_TFLOP,
            queue: VecDeque::new(),
            active: None,
            available_at: 0.0,
        })
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Compute capacity in FLOPS/s
    pub fn capacity_flops(&self) -> f64 {
        self.capacity_flops
    }

    /// Seconds needed to compute `portion` FLOPS on this worker
    pub fn compute_time(&self, portion: f64) -> f64 {
        portion / self.capacity_flops
    }

    /// When all queued work is expected to be finished
    pub fn available_at(&self) -> f64 {
        self.available_at
    }

    /// Earliest instant work arriving at `arrival` can start
    pub fn earliest_start(&self, arrival: f64) -> f64 {
        arrival.max(self.available_at)
    }

    /// Append a portion to the FIFO queue.
    ///
    /// Returns the expected completion time. The worker is considered busy
    /// until then for later allocations.
    pub fn add_to_queue(&mut self, task: TaskId, portion: f64, start_time: f64) -> f64 {
        let start_time = self.earliest_start(start_time);
        let completion = start_time + self.compute_time(portion);
        self.queue.push_back(QueuedPortion {
            task,
            portion,
            start_time,
        });
        self.available_at = completion;
        completion
    }

    /// Queue length, plus one while a portion is active. Lower is less loaded.
    pub fn priority(&self) -> usize {
        self.queue.len() + usize::from(self.active.is_some())
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active(&self) -> Option<&ActivePortion> {
        self.active.as_ref()
    }

    /// Start the next queued portion if the worker is idle.
    ///
    /// Returns the portion and its completion time, or `None` when the worker
    /// is busy or the queue is empty.
    pub fn pop_next(&mut self, current_time: f64) -> Option<(QueuedPortion, f64)> {
        if self.active.is_some() {
            return None;
        }

        let next = self.queue.pop_front()?;
        let started_at = current_time.max(next.start_time);
        let completes_at = started_at + self.compute_time(next.portion);
        self.active = Some(ActivePortion {
            task: next.task,
            portion: next.portion,
            started_at,
            completes_at,
        });
        Some((next, completes_at))
    }

    /// Finish the active portion, leaving the worker idle
    pub fn complete_active(&mut self) -> Option<ActivePortion> {
        self.active.take()
    }
}

/// Resource state of every worker, keyed by id
#[derive(Debug, Clone, Default)]
pub struct ResourcePool {
    nodes: BTreeMap<NodeId, NodeResource>,
}

impl ResourcePool {
    /// Build the pool from a topology, rejecting invalid capacities and links
    pub fn from_topology(topology: &dyn TopologyProvider) -> Result<Self> {
        topology::validate(topology)?;

        let nodes = topology
            .workers()
            .into_iter()
            .map(|worker| {
                NodeResource::new(worker.id.clone(), worker.capacity_tflops)
                    .map(|resource| (worker.id.clone(), resource))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(ResourcePool { nodes })
    }

    pub fn get(&self, id: &NodeId) -> Option<&NodeResource> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &NodeId) -> Option<&mut NodeResource> {
        self.nodes.get_mut(id)
    }

    /// Workers in id order
    pub fn iter(&self) -> impl Iterator<Item = &NodeResource> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Total portions still queued or active across all workers
    pub fn outstanding(&self) -> usize {
        self.nodes.values().map(NodeResource::priority).sum()
    }
}
