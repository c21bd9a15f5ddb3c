//! Worker selection policies
//!
//! Implements the two strategies the allocator can run:
//! - Direct: lowest-latency directly linked worker that is fast enough
//! - Chain: the `d` least-loaded workers anywhere, processed in sequence
//!
//! A policy only decides *who* works on a task. Timing and event emission
//! are shared by every policy and live in the allocator.

use std::cmp::Ordering;

use rand::RngCore;
use rand::seq::SliceRandom;

use crate::config::{AllocatorConfig, PolicyKind, TieBreak};
use crate::error::UnassignableReason;
use crate::resource::{NodeResource, ResourcePool};
use crate::topology::TopologyProvider;
use crate::types::{Link, NodeId, Task};

/// Workers chosen for one task
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// One worker reached over its link to the requester
    Direct { worker: NodeId, link: Link },

    /// Workers in hop order: requester -> workers[0] -> ... -> requester
    Chain { workers: Vec<NodeId> },
}

/// Read-only state a policy ranks workers against
pub struct SelectionContext<'a> {
    pub topology: &'a dyn TopologyProvider,
    pub resources: &'a ResourcePool,
}

/// Allocation policy trait
pub trait AllocationPolicy {
    /// Reorder the pending task indices before allocation.
    /// The default keeps submission order.
    fn order(&mut self, _pending: &mut [usize], _rng: &mut dyn RngCore) {}

    /// Choose workers for a task, or say why none fit
    fn select(
        &mut self,
        task: &Task,
        ctx: &SelectionContext<'_>,
    ) -> Result<Selection, UnassignableReason>;

    /// Get policy name
    fn name(&self) -> &str;
}

/// Build the policy named by the configuration
pub fn from_config(config: &AllocatorConfig) -> Box<dyn AllocationPolicy> {
    match config.policy {
        PolicyKind::DirectLatency => Box::new(DirectLatencyPolicy::new(config.time_budget_secs)),
        PolicyKind::Chain => Box::new(ChainPolicy::new(config.chain_length, config.tie_break)),
    }
}

/// Direct policy: among workers linked to the requester that can compute the
/// whole task within the time budget, pick the lowest link latency.
pub struct DirectLatencyPolicy {
    time_budget_secs: f64,
}

impl DirectLatencyPolicy {
    pub fn new(time_budget_secs: f64) -> Self {
        DirectLatencyPolicy { time_budget_secs }
    }

    fn qualifies(&self, worker: &NodeResource, complexity: f64) -> bool {
        worker.capacity_flops() * self.time_budget_secs >= complexity
    }
}

impl AllocationPolicy for DirectLatencyPolicy {
    fn select(
        &mut self,
        task: &Task,
        ctx: &SelectionContext<'_>,
    ) -> Result<Selection, UnassignableReason> {
        // Workers come in id order, and min_by keeps the first of equal
        // latencies, so ties go to the smaller id.
        ctx.topology
            .workers()
            .into_iter()
            .filter_map(|spec| {
                let worker = ctx.resources.get(&spec.id)?;
                let link = ctx.topology.link_between(&spec.id, &task.requester)?;
                self.qualifies(worker, task.complexity)
                    .then(|| (spec.id.clone(), link))
            })
            .min_by(|a, b| a.1.latency.total_cmp(&b.1.latency))
            .map(|(worker, link)| Selection::Direct { worker, link })
            .ok_or(UnassignableReason::NoDirectCandidate)
    }

    fn name(&self) -> &str {
        "DirectLatency"
    }
}

/// Chain policy: the `chain_length` lowest-priority workers, regardless of
/// connectivity. Pending tasks from every requester are shuffled first so no
/// requester is always served last.
pub struct ChainPolicy {
    chain_length: usize,
    tie_break: TieBreak,
}

impl ChainPolicy {
    pub fn new(chain_length: usize, tie_break: TieBreak) -> Self {
        ChainPolicy {
            chain_length,
            tie_break,
        }
    }

    fn rank(&self, a: &NodeResource, b: &NodeResource) -> Ordering {
        let by_priority = a.priority().cmp(&b.priority());
        let by_capacity = match self.tie_break {
            TieBreak::CapacityFirst => b.capacity_flops().total_cmp(&a.capacity_flops()),
            TieBreak::QueueLengthOnly => Ordering::Equal,
        };
        by_priority
            .then(by_capacity)
            .then_with(|| a.id().cmp(b.id()))
    }
}

impl AllocationPolicy for ChainPolicy {
    fn order(&mut self, pending: &mut [usize], rng: &mut dyn RngCore) {
        pending.shuffle(rng);
    }

    fn select(
        &mut self,
        _task: &Task,
        ctx: &SelectionContext<'_>,
    ) -> Result<Selection, UnassignableReason> {
        let available = ctx.resources.len();
        if available < self.chain_length {
            return Err(UnassignableReason::InsufficientDevices {
                required: self.chain_length,
                available,
            });
        }

        let mut ranked: Vec<&NodeResource> = ctx.resources.iter().collect();
        ranked.sort_by(|a, b| self.rank(a, b));

        let workers = ranked
            .into_iter()
            .take(self.chain_length)
            .map(|worker| worker.id().clone())
            .collect();
        Ok(Selection::Chain { workers })
    }

    fn name(&self) -> &str {
        "Chain"
    }
}
