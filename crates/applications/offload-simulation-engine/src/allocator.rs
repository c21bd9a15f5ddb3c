//! Task allocation
//!
//! The allocator asks its policy which workers take each pending task, then
//! turns the selection into timed events on the timeline and portions on the
//! workers' queues.
//!
//! ## Timing
//!
//! Direct: `requester -> worker` transmission, then the whole task on the
//! worker.
//!
//! ```text
//! now ──tx──▶ DataTransmission ──(wait for worker)──▶ StartCalculation ──compute──▶ EndCalculation
//! ```
//!
//! Chain: the full data set travels every hop, each worker computes its
//! portion, and the result returns to the requester.
//!
//! ```text
//! requester ─tx─▶ w1 ─compute─▶ ─tx─▶ w2 ─compute─▶ ... ─tx─▶ requester (EndCalculation)
//! ```
//!
//! A worker never computes two portions at once: compute starts at
//! `max(arrival, worker.available_at)`.

use std::collections::BTreeSet;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{AllocatorConfig, BandwidthModel, PortionSplit};
use crate::error::{Result, SimulationError, UnassignableReason};
use crate::event::{Completion, Computation, Event, Transmission};
use crate::policies::{self, AllocationPolicy, Selection, SelectionContext};
use crate::resource::ResourcePool;
use crate::timeline::Timeline;
use crate::topology::TopologyProvider;
use crate::types::{Edge, NodeId, Task, TaskId, TaskTimings};

/// A task the allocator had to skip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnassignableTask {
    pub task: TaskId,
    pub requester: NodeId,
    #[serde(flatten)]
    pub reason: UnassignableReason,
}

/// Outcome of one `allocate` call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationReport {
    pub policy: String,
    pub dispatched: Vec<TaskId>,
    pub unassignable: Vec<UnassignableTask>,
    pub events_emitted: usize,
}

impl AllocationReport {
    /// Merge a later report into this one
    pub fn absorb(&mut self, other: AllocationReport) {
        if self.policy.is_empty() {
            self.policy = other.policy;
        }
        self.dispatched.extend(other.dispatched);
        self.unassignable.extend(other.unassignable);
        self.events_emitted += other.events_emitted;
    }
}

/// Everything a dispatched task writes, computed before anything is written
struct Dispatch {
    events: Vec<Event>,
    portions: Vec<(NodeId, f64, f64)>, // (worker, portion, start)
    timings: TaskTimings,
}

impl Dispatch {
    /// First planned time that is non-finite or negative, if any
    fn overflow(&self) -> Option<f64> {
        let t = &self.timings;
        self.events
            .iter()
            .map(|e| e.time)
            .chain(self.portions.iter().map(|(_, _, start)| *start))
            .chain([t.transmission_time, t.compute_time, t.expected_finish])
            .find(|time| !time.is_finite() || *time < 0.0)
    }
}

/// Assigns pending tasks to workers and schedules the resulting events
pub struct Allocator {
    config: AllocatorConfig,
    policy: Box<dyn AllocationPolicy>,
    rng: ChaCha8Rng,
    bandwidth: Option<Uniform<f64>>,
    dispatched: BTreeSet<TaskId>,
}

impl Allocator {
    /// Create an allocator seeded from `config.seed`
    pub fn new(config: AllocatorConfig) -> Result<Self> {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self::with_rng(config, rng)
    }

    /// Create an allocator with an injected random source
    pub fn with_rng(config: AllocatorConfig, rng: ChaCha8Rng) -> Result<Self> {
        config.validate()?;

        let bandwidth = match config.bandwidth {
            BandwidthModel::Fixed { .. } => None,
            BandwidthModel::Uniform { min, max } | BandwidthModel::LinkOrUniform { min, max } => {
                Some(Uniform::new_inclusive(min, max))
            }
        };

        Ok(Allocator {
            policy: policies::from_config(&config),
            config,
            rng,
            bandwidth,
            dispatched: BTreeSet::new(),
        })
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    pub fn policy_name(&self) -> &str {
        self.policy.name()
    }

    /// Allocate every pending task in `tasks`.
    ///
    /// Dispatched tasks get their events on `timeline`, their portions on
    /// the workers in `resources`, and are marked dispatched. Tasks no policy
    /// can place, or whose planned times overflow, stay pending and are
    /// listed in the report; they never abort the call.
    ///
    /// Task ids must be unique across every call on one allocator: a pending
    /// task reusing a dispatched id fails the call before anything is written.
    pub fn allocate(
        &mut self,
        tasks: &mut [Task],
        topology: &dyn TopologyProvider,
        resources: &mut ResourcePool,
        timeline: &mut Timeline,
    ) -> Result<AllocationReport> {
        let mut report = AllocationReport {
            policy: self.policy.name().to_string(),
            ..Default::default()
        };

        let mut pending: Vec<usize> = tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| task.is_pending())
            .map(|(i, _)| i)
            .collect();
        let mut seen = BTreeSet::new();
        for &index in &pending {
            let id = tasks[index].id;
            if self.dispatched.contains(&id) || !seen.insert(id) {
                return Err(SimulationError::DuplicateTask(id));
            }
            let requester = &tasks[index].requester;
            if !topology.is_requester(requester) {
                return Err(SimulationError::UnknownNode(requester.clone()));
            }
        }
        self.policy.order(&mut pending, &mut self.rng);

        for index in pending {
            let task = &mut tasks[index];

            let ctx = SelectionContext {
                topology,
                resources: &*resources,
            };
            let selection = match self.policy.select(task, &ctx) {
                Ok(selection) => selection,
                Err(reason) => {
                    warn!(
                        task = task.id,
                        requester = %task.requester,
                        complexity = task.complexity,
                        "Task unassignable: {}",
                        reason
                    );
                    report.unassignable.push(UnassignableTask {
                        task: task.id,
                        requester: task.requester.clone(),
                        reason,
                    });
                    continue;
                }
            };

            let dispatch = match &selection {
                Selection::Direct { worker, link } => {
                    self.plan_direct(task, worker, link.bandwidth, resources)?
                }
                Selection::Chain { workers } => self.plan_chain(task, workers, topology, resources)?,
            };

            if let Some(time) = dispatch.overflow() {
                let reason = UnassignableReason::TimingOverflow { time };
                warn!(task = task.id, requester = %task.requester, "Task unassignable: {}", reason);
                report.unassignable.push(UnassignableTask {
                    task: task.id,
                    requester: task.requester.clone(),
                    reason,
                });
                continue;
            }

            debug!(
                task = task.id,
                requester = %task.requester,
                workers = ?dispatch.portions.iter().map(|(w, _, _)| w.as_str()).collect::<Vec<_>>(),
                transmission_time = dispatch.timings.transmission_time,
                compute_time = dispatch.timings.compute_time,
                "Task dispatched"
            );

            for event in dispatch.events {
                timeline.schedule(event)?;
                report.events_emitted += 1;
            }
            for (worker, portion, start) in dispatch.portions {
                if let Some(resource) = resources.get_mut(&worker) {
                    resource.add_to_queue(task.id, portion, start);
                }
            }
            task.mark_dispatched(dispatch.timings);
            self.dispatched.insert(task.id);
            report.dispatched.push(task.id);
        }

        info!(
            policy = %report.policy,
            dispatched = report.dispatched.len(),
            unassignable = report.unassignable.len(),
            events = report.events_emitted,
            "Allocation complete"
        );

        Ok(report)
    }

    fn plan_direct(
        &self,
        task: &Task,
        worker: &NodeId,
        bandwidth: f64,
        resources: &ResourcePool,
    ) -> Result<Dispatch> {
        let resource = resources
            .get(worker)
            .ok_or_else(|| SimulationError::UnknownNode(worker.clone()))?;

        let now = self.config.start_time;
        let transmission_time = task.data_size / bandwidth;
        let arrival = now + transmission_time;
        let start = resource.earliest_start(arrival);
        let compute_time = resource.compute_time(task.complexity);
        let finish = start + compute_time;
        let edge = Edge::new(task.requester.clone(), worker.clone());

        let events = vec![
            Event::data_transmission(
                arrival,
                Transmission {
                    task: task.id,
                    from: task.requester.clone(),
                    to: worker.clone(),
                    size_mb: task.data_size,
                    bandwidth,
                },
            ),
            Event::start_calculation(
                start,
                Computation {
                    task: task.id,
                    node: worker.clone(),
                    portion: task.complexity,
                },
            ),
            Event::end_calculation(
                finish,
                Completion {
                    task: task.id,
                    node: worker.clone(),
                },
                edge,
            ),
        ];

        Ok(Dispatch {
            events,
            portions: vec![(worker.clone(), task.complexity, start)],
            timings: TaskTimings {
                dispatched_at: now,
                transmission_time,
                compute_time,
                expected_finish: finish,
            },
        })
    }

    fn plan_chain(
        &mut self,
        task: &Task,
        workers: &[NodeId],
        topology: &dyn TopologyProvider,
        resources: &ResourcePool,
    ) -> Result<Dispatch> {
        let chain = workers
            .iter()
            .map(|id| {
                resources
                    .get(id)
                    .ok_or_else(|| SimulationError::UnknownNode(id.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        let capacities: Vec<f64> = chain.iter().map(|w| w.capacity_flops()).collect();
        let portions = split_complexity(task.complexity, &capacities, self.config.portion_split);

        let now = self.config.start_time;
        let mut current_time = now;
        let mut previous = task.requester.clone();
        let mut events = Vec::with_capacity(2 * chain.len() + 2);
        let mut planned = Vec::with_capacity(chain.len());
        let mut transmission_total = 0.0;
        let mut compute_total = 0.0;

        for (worker, portion) in chain.iter().zip(portions) {
            let bandwidth = self.hop_bandwidth(topology, &previous, worker.id());
            let transmission_time = task.data_size / bandwidth;
            let arrival = current_time + transmission_time;
            let start = worker.earliest_start(arrival);
            let compute_time = worker.compute_time(portion);
            let done = start + compute_time;

            events.push(Event::data_transmission(
                arrival,
                Transmission {
                    task: task.id,
                    from: previous.clone(),
                    to: worker.id().clone(),
                    size_mb: task.data_size,
                    bandwidth,
                },
            ));
            events.push(Event::calculation(
                done,
                Computation {
                    task: task.id,
                    node: worker.id().clone(),
                    portion,
                },
                Edge::new(previous.clone(), worker.id().clone()),
            ));
            planned.push((worker.id().clone(), portion, start));

            transmission_total += transmission_time;
            compute_total += compute_time;
            current_time = done;
            previous = worker.id().clone();
        }

        // Return the result to the requester over the closing link
        let bandwidth = self.hop_bandwidth(topology, &previous, &task.requester);
        let transmission_time = task.data_size / bandwidth;
        current_time += transmission_time;
        transmission_total += transmission_time;

        events.push(Event::data_transmission(
            current_time,
            Transmission {
                task: task.id,
                from: previous.clone(),
                to: task.requester.clone(),
                size_mb: task.data_size,
                bandwidth,
            },
        ));
        events.push(Event::end_calculation(
            current_time,
            Completion {
                task: task.id,
                node: previous.clone(),
            },
            Edge::new(previous, task.requester.clone()),
        ));

        Ok(Dispatch {
            events,
            portions: planned,
            timings: TaskTimings {
                dispatched_at: now,
                transmission_time: transmission_total,
                compute_time: compute_total,
                expected_finish: current_time,
            },
        })
    }

    /// Bandwidth for one chain hop, validated positive at construction
    fn hop_bandwidth(&mut self, topology: &dyn TopologyProvider, from: &NodeId, to: &NodeId) -> f64 {
        match self.config.bandwidth {
            BandwidthModel::Fixed { mbps } => mbps,
            BandwidthModel::Uniform { min, .. } => self.sample_bandwidth(min),
            BandwidthModel::LinkOrUniform { min, .. } => match topology.link_between(from, to) {
                Some(link) => link.bandwidth,
                None => self.sample_bandwidth(min),
            },
        }
    }

    fn sample_bandwidth(&mut self, fallback: f64) -> f64 {
        match &self.bandwidth {
            Some(distribution) => distribution.sample(&mut self.rng),
            None => fallback,
        }
    }
}

/// Split `complexity` into one portion per worker.
///
/// The last portion takes whatever the others leave, so the portions always
/// add up to `complexity`.
pub fn split_complexity(complexity: f64, capacities: &[f64], split: PortionSplit) -> Vec<f64> {
    let count = capacities.len();
    if count == 0 {
        return Vec::new();
    }

    let total_capacity: f64 = capacities.iter().sum();
    let mut portions: Vec<f64> = match split {
        PortionSplit::Equal => vec![complexity / count as f64; count],
        PortionSplit::CapacityWeighted => capacities
            .iter()
            .map(|capacity| complexity * capacity / total_capacity)
            .collect(),
    };

    let assigned: f64 = portions[..count - 1].iter().sum();
    portions[count - 1] = (complexity - assigned).max(0.0);
    portions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::topology::Topology;
    use crate::types::TaskRequest;

    fn two_worker_topology() -> Topology {
        let mut topology = Topology::new();
        topology.add_worker("user_1", 5.0).unwrap();
        topology.add_worker("user_2", 2.0).unwrap();
        topology.add_requester("enterprise_1").unwrap();
        topology.add_link("user_1", "enterprise_1", 100.0, 10.0).unwrap();
        topology.add_link("user_2", "enterprise_1", 50.0, 20.0).unwrap();
        topology
    }

    fn tasks(topology: &Topology, requests: &[(f64, f64)]) -> Vec<Task> {
        Task::from_requests(
            requests
                .iter()
                .map(|&(complexity, data_size)| TaskRequest::new("enterprise_1", complexity, data_size)),
            topology,
        )
        .unwrap()
    }

    #[test]
    fn test_split_equal_sums_to_complexity() {
        let portions = split_complexity(1e11, &[1.0, 1.0, 1.0], PortionSplit::Equal);
        assert_eq!(portions.len(), 3);
        let sum: f64 = portions.iter().sum();
        assert!((sum - 1e11).abs() <= 1e11 * 1e-12);
        assert!((portions[0] - portions[1]).abs() < 1.0);
    }

    #[test]
    fn test_split_weighted_follows_capacity() {
        let portions = split_complexity(9e12, &[1e12, 2e12], PortionSplit::CapacityWeighted);
        assert!((portions[0] - 3e12).abs() < 1.0);
        assert!((portions[1] - 6e12).abs() < 1.0);
    }

    #[test]
    fn test_split_empty() {
        assert!(split_complexity(1e9, &[], PortionSplit::Equal).is_empty());
    }

    #[test]
    fn test_direct_allocation_timings() {
        let topology = two_worker_topology();
        let mut resources = ResourcePool::from_topology(&topology).unwrap();
        let mut timeline = Timeline::new();
        let mut tasks = tasks(&topology, &[(1e12, 200.0)]);

        let mut allocator = Allocator::new(AllocatorConfig::direct()).unwrap();
        let report = allocator
            .allocate(&mut tasks, &topology, &mut resources, &mut timeline)
            .unwrap();

        assert_eq!(report.dispatched, vec![0]);
        assert!(report.unassignable.is_empty());
        assert_eq!(report.events_emitted, 3);
        assert_eq!(timeline.len(), 3);

        let timings = tasks[0].timings.unwrap();
        assert!((timings.compute_time - 0.2).abs() < 1e-12);
        assert!((timings.transmission_time - 2.0).abs() < 1e-12);
        assert!((timings.expected_finish - 2.2).abs() < 1e-12);
        assert!(tasks[0].is_dispatched());

        let worker = resources.get(&NodeId::from("user_1")).unwrap();
        assert_eq!(worker.queue_len(), 1);
    }

    #[test]
    fn test_direct_second_task_waits_for_worker() {
        let topology = two_worker_topology();
        let mut resources = ResourcePool::from_topology(&topology).unwrap();
        let mut timeline = Timeline::new();
        // Both go to user_1; each computes for 1 s after a 1 s transfer
        let mut tasks = tasks(&topology, &[(5e12, 100.0), (5e12, 100.0)]);

        let mut allocator = Allocator::new(AllocatorConfig::direct()).unwrap();
        allocator
            .allocate(&mut tasks, &topology, &mut resources, &mut timeline)
            .unwrap();

        assert!((tasks[0].timings.unwrap().expected_finish - 2.0).abs() < 1e-12);
        assert!((tasks[1].timings.unwrap().expected_finish - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_dispatched_tasks_are_not_reallocated() {
        let topology = two_worker_topology();
        let mut resources = ResourcePool::from_topology(&topology).unwrap();
        let mut timeline = Timeline::new();
        let mut tasks = tasks(&topology, &[(1e12, 200.0)]);

        let mut allocator = Allocator::new(AllocatorConfig::direct()).unwrap();
        allocator
            .allocate(&mut tasks, &topology, &mut resources, &mut timeline)
            .unwrap();
        let again = allocator
            .allocate(&mut tasks, &topology, &mut resources, &mut timeline)
            .unwrap();

        assert!(again.dispatched.is_empty());
        assert_eq!(again.events_emitted, 0);
        assert_eq!(timeline.len(), 3);
    }

    #[test]
    fn test_chain_event_layout() {
        let mut topology = two_worker_topology();
        topology.add_worker("user_3", 1.0).unwrap();
        let mut resources = ResourcePool::from_topology(&topology).unwrap();
        let mut timeline = Timeline::new();
        let mut tasks = tasks(&topology, &[(3e12, 100.0)]);

        let config = AllocatorConfig::chain(3).with_bandwidth(BandwidthModel::Fixed { mbps: 50.0 });
        let mut allocator = Allocator::new(config).unwrap();
        let report = allocator
            .allocate(&mut tasks, &topology, &mut resources, &mut timeline)
            .unwrap();

        // 3 hops * (transmission + calculation) + return transmission + closing end
        assert_eq!(report.events_emitted, 8);

        let events = timeline.ordered_events();
        let kinds: Vec<&str> = events.iter().map(|e| e.kind.name()).collect();
        assert_eq!(
            kinds,
            vec![
                "data_transmission",
                "calculation",
                "data_transmission",
                "calculation",
                "data_transmission",
                "calculation",
                "data_transmission",
                "end_calculation",
            ]
        );

        // Capacity-first ordering: user_1 (5), user_2 (2), user_3 (1)
        let hops: Vec<(String, String)> = events
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::DataTransmission(t) => Some((t.from.to_string(), t.to.to_string())),
                _ => None,
            })
            .collect();
        assert_eq!(
            hops,
            vec![
                ("enterprise_1".to_string(), "user_1".to_string()),
                ("user_1".to_string(), "user_2".to_string()),
                ("user_2".to_string(), "user_3".to_string()),
                ("user_3".to_string(), "enterprise_1".to_string()),
            ]
        );

        // Each hop: 100 MB / 50 Mbps = 2 s; portions 1e12 on 5, 2 and 1 TFLOPS
        let timings = tasks[0].timings.unwrap();
        assert!((timings.transmission_time - 8.0).abs() < 1e-9);
        assert!((timings.compute_time - (0.2 + 0.5 + 1.0)).abs() < 1e-9);
        assert!((timings.expected_finish - 9.7).abs() < 1e-9);
        assert_eq!(events.last().unwrap().time, timings.expected_finish);
    }

    #[test]
    fn test_chain_portions_sum_to_complexity() {
        let mut topology = two_worker_topology();
        topology.add_worker("user_3", 1.5).unwrap();
        let mut resources = ResourcePool::from_topology(&topology).unwrap();
        let mut timeline = Timeline::new();
        let complexity = 7.77e10;
        let mut tasks = tasks(&topology, &[(complexity, 120.0)]);

        let mut allocator = Allocator::new(AllocatorConfig::chain(3)).unwrap();
        allocator
            .allocate(&mut tasks, &topology, &mut resources, &mut timeline)
            .unwrap();

        let sum: f64 = timeline
            .ordered_events()
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::Calculation(c) => Some(c.portion),
                _ => None,
            })
            .sum();
        assert!((sum - complexity).abs() <= complexity * 1e-12);
    }

    #[test]
    fn test_chain_insufficient_devices_emits_nothing() {
        let topology = two_worker_topology();
        let mut resources = ResourcePool::from_topology(&topology).unwrap();
        let mut timeline = Timeline::new();
        let mut tasks = tasks(&topology, &[(1e12, 100.0)]);

        let mut allocator = Allocator::new(AllocatorConfig::chain(3)).unwrap();
        let report = allocator
            .allocate(&mut tasks, &topology, &mut resources, &mut timeline)
            .unwrap();

        assert!(timeline.is_empty());
        assert_eq!(report.events_emitted, 0);
        assert_eq!(report.unassignable.len(), 1);
        assert_eq!(
            report.unassignable[0].reason,
            UnassignableReason::InsufficientDevices {
                required: 3,
                available: 2
            }
        );
        assert!(tasks[0].is_pending());
        assert_eq!(resources.outstanding(), 0);
    }

    #[test]
    fn test_chain_uses_link_bandwidth_when_linked() {
        let topology = two_worker_topology();
        let mut resources = ResourcePool::from_topology(&topology).unwrap();
        let mut timeline = Timeline::new();
        let mut tasks = tasks(&topology, &[(1e12, 100.0)]);

        let config = AllocatorConfig::chain(1).with_bandwidth(BandwidthModel::LinkOrUniform {
            min: 1.0,
            max: 1.0,
        });
        let mut allocator = Allocator::new(config).unwrap();
        allocator
            .allocate(&mut tasks, &topology, &mut resources, &mut timeline)
            .unwrap();

        // enterprise_1 <-> user_1 is linked at 100 Mbps in both directions
        let timings = tasks[0].timings.unwrap();
        assert!((timings.transmission_time - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_same_seed_same_timeline() {
        fn run(seed: u64) -> Vec<Event> {
            let mut topology = Topology::new();
            for i in 0..6 {
                topology.add_worker(format!("user_{}", i), 1.5 + i as f64 * 0.25).unwrap();
            }
            topology.add_requester("enterprise_0").unwrap();
            topology.add_requester("enterprise_1").unwrap();

            let requests = (0..10).map(|i| {
                let requester = if i % 2 == 0 { "enterprise_0" } else { "enterprise_1" };
                TaskRequest::new(requester, 1e10 * (i + 1) as f64, 50.0 + i as f64)
            });
            let mut tasks = Task::from_requests(requests, &topology).unwrap();
            let mut resources = ResourcePool::from_topology(&topology).unwrap();
            let mut timeline = Timeline::new();

            let mut allocator = Allocator::new(AllocatorConfig::chain(2).with_seed(seed)).unwrap();
            allocator
                .allocate(&mut tasks, &topology, &mut resources, &mut timeline)
                .unwrap();
            timeline.ordered_events()
        }

        assert_eq!(run(11), run(11));
        assert_ne!(run(11), run(12));
    }

    #[test]
    fn test_timing_overflow_leaves_timeline_untouched() {
        let topology = two_worker_topology();
        let mut resources = ResourcePool::from_topology(&topology).unwrap();
        let mut timeline = Timeline::new();
        let mut tasks = tasks(&topology, &[(1e12, 1e308), (1e12, 100.0)]);

        // Each 1 Mbps hop takes 1e308 s; the return hop overflows to infinity
        let config = AllocatorConfig::chain(1).with_bandwidth(BandwidthModel::Fixed { mbps: 1.0 });
        let mut allocator = Allocator::new(config).unwrap();
        let report = allocator
            .allocate(&mut tasks, &topology, &mut resources, &mut timeline)
            .unwrap();

        let overflowed = report.unassignable.iter().find(|u| u.task == 0).unwrap();
        assert!(matches!(
            overflowed.reason,
            UnassignableReason::TimingOverflow { time } if time.is_infinite()
        ));
        assert!(tasks[0].is_pending());
        assert!(tasks[1].is_dispatched());

        // Only the second task's events and portion were written
        assert_eq!(report.dispatched, vec![1]);
        assert_eq!(timeline.len(), 4);
        assert!(timeline.ordered_events().iter().all(|e| e.kind.task() == 1));
        assert_eq!(resources.outstanding(), 1);
    }

    #[test]
    fn test_uniform_bandwidth_stays_in_range() {
        let mut topology = two_worker_topology();
        topology.add_worker("user_3", 1.0).unwrap();
        let mut resources = ResourcePool::from_topology(&topology).unwrap();
        let mut timeline = Timeline::new();
        let requests: Vec<(f64, f64)> = (0..10).map(|i| (1e11, 50.0 + i as f64)).collect();
        let mut tasks = tasks(&topology, &requests);

        let config = AllocatorConfig::chain(3)
            .with_seed(17)
            .with_bandwidth(BandwidthModel::Uniform { min: 20.0, max: 30.0 });
        let mut allocator = Allocator::new(config).unwrap();
        allocator
            .allocate(&mut tasks, &topology, &mut resources, &mut timeline)
            .unwrap();

        let bandwidths: Vec<f64> = timeline
            .ordered_events()
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::DataTransmission(t) => Some(t.bandwidth),
                _ => None,
            })
            .collect();
        assert_eq!(bandwidths.len(), 40);
        assert!(bandwidths.iter().all(|b| (20.0..=30.0).contains(b)));
        // Sampled, not a constant
        assert!(bandwidths.iter().any(|b| (b - bandwidths[0]).abs() > 1e-9));
    }

    #[test]
    fn test_weighted_chain_portions_follow_capacity() {
        let mut topology = two_worker_topology();
        topology.add_worker("user_3", 1.0).unwrap();
        let mut resources = ResourcePool::from_topology(&topology).unwrap();
        let mut timeline = Timeline::new();
        let mut tasks = tasks(&topology, &[(8e12, 10.0)]);

        let config = AllocatorConfig::chain(3)
            .with_bandwidth(BandwidthModel::Fixed { mbps: 10.0 })
            .with_portion_split(PortionSplit::CapacityWeighted);
        let mut allocator = Allocator::new(config).unwrap();
        allocator
            .allocate(&mut tasks, &topology, &mut resources, &mut timeline)
            .unwrap();

        let portions: Vec<(String, f64)> = timeline
            .ordered_events()
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::Calculation(c) => Some((c.node.to_string(), c.portion)),
                _ => None,
            })
            .collect();

        // 5 + 2 + 1 TFLOPS share 8e12 FLOPS
        assert_eq!(portions.len(), 3);
        assert_eq!(portions[0].0, "user_1");
        assert!((portions[0].1 - 5e12).abs() < 1.0);
        assert_eq!(portions[1].0, "user_2");
        assert!((portions[1].1 - 2e12).abs() < 1.0);
        assert_eq!(portions[2].0, "user_3");
        assert!((portions[2].1 - 1e12).abs() < 1.0);

        // Equal compute time on every hop: 1 s each
        assert!((tasks[0].timings.unwrap().compute_time - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_reused_task_id_rejected() {
        let topology = two_worker_topology();
        let mut resources = ResourcePool::from_topology(&topology).unwrap();
        let mut timeline = Timeline::new();
        let mut allocator = Allocator::new(AllocatorConfig::direct()).unwrap();

        let mut first = tasks(&topology, &[(1e12, 100.0)]);
        allocator
            .allocate(&mut first, &topology, &mut resources, &mut timeline)
            .unwrap();

        // Second batch numbered from 0 again
        let mut second = tasks(&topology, &[(1e12, 100.0)]);
        let result = allocator.allocate(&mut second, &topology, &mut resources, &mut timeline);
        assert!(matches!(result, Err(SimulationError::DuplicateTask(0))));
        assert_eq!(timeline.len(), 3);
        assert!(second[0].is_pending());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = AllocatorConfig::chain(2).with_bandwidth(BandwidthModel::Fixed { mbps: -5.0 });
        assert!(Allocator::new(config).is_err());
    }

    #[test]
    fn test_unknown_requester_rejected() {
        let topology = two_worker_topology();
        let mut resources = ResourcePool::from_topology(&topology).unwrap();
        let mut timeline = Timeline::new();
        let mut tasks = vec![Task::new(0, TaskRequest::new("enterprise_9", 1e9, 10.0)).unwrap()];

        let mut allocator = Allocator::new(AllocatorConfig::direct()).unwrap();
        let result = allocator.allocate(&mut tasks, &topology, &mut resources, &mut timeline);
        assert!(matches!(result, Err(SimulationError::UnknownNode(_))));
    }
}
