//! Run summary
//!
//! Aggregates the task list, the allocation report and the simulator's
//! counters into one serializable summary.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::allocator::{AllocationReport, UnassignableTask};
use crate::error::Result;
use crate::simulator::RunStats;
use crate::types::{NodeId, Task};

/// Completed and pending task counts of one requester
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequesterTally {
    pub completed: usize,
    pub pending: usize,
}

/// Summary of one allocation + simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub policy: String,
    pub total_tasks: usize,
    /// Tasks with every event on the timeline
    pub completed_tasks: usize,
    /// Tasks whose final event the simulator has applied
    pub finished_tasks: usize,
    pub unassignable_tasks: usize,
    /// Unassignable count per reason, keyed by the reason text
    pub unassignable_reasons: BTreeMap<String, usize>,
    pub per_requester: BTreeMap<NodeId, RequesterTally>,
    pub total_compute_time: f64,
    pub total_transmission_time: f64,
    pub total_time: f64,
    /// Completed / total, 0 when there are no tasks
    pub completion_rate: f64,
    /// Simulated time of the last finished task
    pub makespan: f64,
    pub events_applied: u64,
    pub data_transferred_mb: f64,
}

impl RunSummary {
    pub fn new(tasks: &[Task], allocation: &AllocationReport, stats: &RunStats) -> Self {
        let dispatched: Vec<&Task> = tasks.iter().filter(|t| t.is_dispatched()).collect();
        let total_compute_time = dispatched
            .iter()
            .filter_map(|t| t.timings)
            .map(|t| t.compute_time)
            .sum();
        let total_transmission_time = dispatched
            .iter()
            .filter_map(|t| t.timings)
            .map(|t| t.transmission_time)
            .sum();

        let completion_rate = if tasks.is_empty() {
            0.0
        } else {
            dispatched.len() as f64 / tasks.len() as f64
        };

        let makespan = stats
            .finished_at
            .values()
            .copied()
            .fold(0.0_f64, f64::max);

        RunSummary {
            policy: allocation.policy.clone(),
            total_tasks: tasks.len(),
            completed_tasks: dispatched.len(),
            finished_tasks: stats.finished_at.len(),
            unassignable_tasks: allocation.unassignable.len(),
            unassignable_reasons: count_reasons(&allocation.unassignable),
            per_requester: tally_requesters(tasks),
            total_compute_time,
            total_transmission_time,
            total_time: total_compute_time + total_transmission_time,
            completion_rate,
            makespan,
            events_applied: stats.events_applied,
            data_transferred_mb: stats.data_transferred_mb,
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn tally_requesters(tasks: &[Task]) -> BTreeMap<NodeId, RequesterTally> {
    let mut tallies: BTreeMap<NodeId, RequesterTally> = BTreeMap::new();
    for task in tasks {
        let tally = tallies.entry(task.requester.clone()).or_default();
        if task.is_dispatched() {
            tally.completed += 1;
        } else {
            tally.pending += 1;
        }
    }
    tallies
}

fn count_reasons(unassignable: &[UnassignableTask]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for task in unassignable {
        *counts.entry(task.reason.to_string()).or_insert(0) += 1;
    }
    counts
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Policy: {}", self.policy)?;
        writeln!(f, "Total Tasks: {}", self.total_tasks)?;
        writeln!(f, "Completed Tasks: {}", self.completed_tasks)?;
        writeln!(f, "Finished Tasks: {}", self.finished_tasks)?;
        writeln!(f, "Unassignable Tasks: {}", self.unassignable_tasks)?;
        for (reason, count) in &self.unassignable_reasons {
            writeln!(f, "  {}: {}", reason, count)?;
        }
        if !self.per_requester.is_empty() {
            writeln!(f, "Per Requester:")?;
        }
        for (requester, tally) in &self.per_requester {
            writeln!(
                f,
                "  {}: {} completed, {} pending",
                requester, tally.completed, tally.pending
            )?;
        }
        writeln!(f, "Total Compute Time: {:.2} seconds", self.total_compute_time)?;
        writeln!(f, "Total Transmission Time: {:.2} seconds", self.total_transmission_time)?;
        writeln!(f, "Total Time: {:.2} seconds", self.total_time)?;
        writeln!(f, "Completion Rate: {:.1}%", self.completion_rate * 100.0)?;
        writeln!(f, "Makespan: {:.2} seconds", self.makespan)?;
        writeln!(f, "Events Applied: {}", self.events_applied)?;
        write!(f, "Data Transferred: {:.1} MB", self.data_transferred_mb)
    }
}
