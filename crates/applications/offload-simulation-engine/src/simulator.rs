//! Step-driven discrete-event simulator
//!
//! Drains a timeline one event per [`Simulator::advance`] call and applies
//! each event to a live view of the topology and to the workers' resource
//! state. The driver (UI button, test, batch loop) paces the calls; pacing
//! never changes the outcome.
//!
//! ```text
//! Ready ──advance()──▶ Running ──timeline empty──▶ Drained ──advance()──▶ Drained (no-op)
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::event::{Completion, Computation, Event, EventKind, Transmission};
use crate::resource::ResourcePool;
use crate::timeline::Timeline;
use crate::topology::TopologyProvider;
use crate::types::{Edge, NodeId, TaskId};

/// Lifecycle of a simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimulatorState {
    Ready,
    Running,
    Drained,
}

/// What a node is doing at the current instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Activity {
    Idle,
    Computing { task: TaskId },
}

/// Kind-specific part of a node in a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeRole {
    Worker { capacity_tflops: f64 },
    Requester,
}

/// A node as seen by a renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeView {
    pub id: NodeId,
    pub role: NodeRole,
    pub activity: Activity,
    pub queue_len: usize,
}

/// A link in the live view.
///
/// Links from the topology are permanent; links created by a transmission
/// over an unlinked hop are transient and stay while any task that sent
/// over them is still in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub bandwidth: f64,
    pub latency: Option<f64>,
    pub size_mb: Option<f64>,
    pub transient: bool,
    /// Tasks holding a transient edge; always empty for permanent ones
    pub tasks: BTreeSet<TaskId>,
}

/// Owned copy of the live topology, safe to hand to a renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    pub nodes: Vec<NodeView>,
    pub edges: Vec<LiveEdge>,
}

impl TopologySnapshot {
    pub fn edge(&self, from: &NodeId, to: &NodeId) -> Option<&LiveEdge> {
        self.edges.iter().find(|e| &e.from == from && &e.to == to)
    }

    pub fn node(&self, id: &NodeId) -> Option<&NodeView> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn transient_edges(&self) -> impl Iterator<Item = &LiveEdge> {
        self.edges.iter().filter(|e| e.transient)
    }
}

/// Everything a renderer needs after one applied event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    /// 1-based index of the applied event
    pub step: u64,
    pub time: f64,
    pub event: Event,
    pub snapshot: TopologySnapshot,
}

/// Result of one `advance()` call
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// An event was applied
    Applied(Box<StepReport>),

    /// Nothing left to apply; repeated calls keep returning this
    Drained { time: f64 },
}

impl Step {
    pub fn is_drained(&self) -> bool {
        matches!(self, Step::Drained { .. })
    }
}

/// Counters collected while the timeline drains
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub events_applied: u64,
    pub transmissions: u64,
    pub data_transferred_mb: f64,
    pub calculations: u64,
    /// Simulated instant each task's final event was applied
    pub finished_at: BTreeMap<TaskId, f64>,
    pub final_time: f64,
}

/// Discrete-event simulator
pub struct Simulator {
    state: SimulatorState,
    timeline: Timeline,
    resources: ResourcePool,
    roles: BTreeMap<NodeId, NodeRole>,
    edges: BTreeMap<Edge, LiveEdge>,
    current_time: f64,
    stats: RunStats,
}

impl Simulator {
    /// Create a simulator over an allocated timeline.
    ///
    /// The live view starts with every topology link as a permanent edge.
    pub fn new(topology: &dyn TopologyProvider, resources: ResourcePool, timeline: Timeline) -> Self {
        let roles = topology
            .workers()
            .into_iter()
            .map(|w| {
                (
                    w.id.clone(),
                    NodeRole::Worker {
                        capacity_tflops: w.capacity_tflops,
                    },
                )
            })
            .chain(
                topology
                    .requesters()
                    .into_iter()
                    .map(|id| (id.clone(), NodeRole::Requester)),
            )
            .collect();

        let edges = topology
            .links()
            .into_iter()
            .map(|(edge, link)| {
                let live = LiveEdge {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                    bandwidth: link.bandwidth,
                    latency: Some(link.latency),
                    size_mb: None,
                    transient: false,
                    tasks: BTreeSet::new(),
                };
                (edge, live)
            })
            .collect();

        Simulator {
            state: SimulatorState::Ready,
            timeline,
            resources,
            roles,
            edges,
            current_time: 0.0,
            stats: RunStats::default(),
        }
    }

    pub fn state(&self) -> SimulatorState {
        self.state
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn pending_events(&self) -> usize {
        self.timeline.len()
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn resources(&self) -> &ResourcePool {
        &self.resources
    }

    /// Apply the next event.
    ///
    /// Once the timeline is exhausted the simulator is `Drained` and further
    /// calls return [`Step::Drained`] without touching any state.
    pub fn advance(&mut self) -> Step {
        match self.state {
            SimulatorState::Drained => {
                return Step::Drained {
                    time: self.current_time,
                };
            }
            SimulatorState::Ready => {
                debug!(events = self.timeline.len(), "Simulation started");
                self.state = SimulatorState::Running;
            }
            SimulatorState::Running => {}
        }

        let Some(event) = self.timeline.pop_earliest() else {
            self.drain();
            return Step::Drained {
                time: self.current_time,
            };
        };

        // The timeline pops in order, so time never goes backward
        self.current_time = self.current_time.max(event.time);
        self.apply(&event);
        self.stats.events_applied += 1;
        self.stats.final_time = self.current_time;

        if self.timeline.is_empty() {
            self.drain();
        }

        Step::Applied(Box::new(StepReport {
            step: self.stats.events_applied,
            time: self.current_time,
            event,
            snapshot: self.snapshot(),
        }))
    }

    /// Advance until drained; returns the collected counters
    pub fn run(&mut self) -> &RunStats {
        while !self.advance().is_drained() {}
        &self.stats
    }

    /// Owned copy of the live topology
    pub fn snapshot(&self) -> TopologySnapshot {
        let nodes = self
            .roles
            .iter()
            .map(|(id, role)| {
                let resource = self.resources.get(id);
                let activity = resource
                    .and_then(|r| r.active())
                    .map_or(Activity::Idle, |active| Activity::Computing { task: active.task });
                NodeView {
                    id: id.clone(),
                    role: *role,
                    activity,
                    queue_len: resource.map_or(0, |r| r.queue_len()),
                }
            })
            .collect();

        TopologySnapshot {
            nodes,
            edges: self.edges.values().cloned().collect(),
        }
    }

    fn drain(&mut self) {
        self.state = SimulatorState::Drained;
        info!(
            events = self.stats.events_applied,
            time = self.current_time,
            finished = self.stats.finished_at.len(),
            "Simulation drained"
        );
    }

    fn apply(&mut self, event: &Event) {
        debug!(time = event.time, "{}", event.kind);
        match &event.kind {
            EventKind::DataTransmission(t) => self.apply_transmission(t),
            EventKind::StartCalculation(c) => self.apply_start(c),
            EventKind::Calculation(c) => self.apply_calculation(c),
            EventKind::EndCalculation(c) => self.apply_end(c, event.edge.as_ref()),
        }
    }

    fn apply_transmission(&mut self, t: &Transmission) {
        let edge = Edge::new(t.from.clone(), t.to.clone());
        let live = self.edges.entry(edge).or_insert_with(|| LiveEdge {
            from: t.from.clone(),
            to: t.to.clone(),
            bandwidth: t.bandwidth,
            latency: None,
            size_mb: Some(t.size_mb),
            transient: true,
            tasks: BTreeSet::new(),
        });
        if live.transient {
            live.tasks.insert(t.task);
        }

        self.stats.transmissions += 1;
        self.stats.data_transferred_mb += t.size_mb;
    }

    fn apply_start(&mut self, c: &Computation) {
        let now = self.current_time;
        let Some(resource) = self.resources.get_mut(&c.node) else {
            warn!(node = %c.node, task = c.task, "Calculation on unknown worker");
            return;
        };

        match resource.pop_next(now) {
            Some((portion, _)) if portion.task != c.task => {
                warn!(node = %c.node, expected = c.task, started = portion.task, "Worker queue out of step");
            }
            Some(_) => {}
            None => warn!(node = %c.node, task = c.task, "Worker busy or queue empty at start"),
        }
    }

    fn apply_calculation(&mut self, c: &Computation) {
        self.apply_start(c);
        if let Some(resource) = self.resources.get_mut(&c.node) {
            resource.complete_active();
        }
        self.stats.calculations += 1;
    }

    fn apply_end(&mut self, c: &Completion, edge: Option<&Edge>) {
        if let Some(resource) = self.resources.get_mut(&c.node) {
            // Chain hops are already completed by their calculation event
            if resource.active().is_some_and(|active| active.task == c.task) {
                resource.complete_active();
                self.stats.calculations += 1;
            }
        }

        if let Some(edge) = edge {
            let closes_chain = matches!(self.roles.get(&edge.to), Some(NodeRole::Requester));
            self.release_edge(edge, c.task, closes_chain);
            if closes_chain {
                self.release_task_edges(c.task);
            }
        }

        self.stats.finished_at.insert(c.task, self.current_time);
    }

    /// Drop `task`'s hold on an edge. A transient edge goes once no task
    /// holds it; a chain's closing link goes even when it is permanent.
    fn release_edge(&mut self, edge: &Edge, task: TaskId, closing: bool) {
        let Some(live) = self.edges.get_mut(edge) else {
            return;
        };
        live.tasks.remove(&task);
        if live.tasks.is_empty() && (closing || live.transient) {
            self.edges.remove(edge);
        }
    }

    fn release_task_edges(&mut self, task: TaskId) {
        let held: Vec<Edge> = self
            .edges
            .iter()
            .filter(|(_, live)| live.tasks.contains(&task))
            .map(|(edge, _)| edge.clone())
            .collect();
        for edge in held {
            self.release_edge(&edge, task, false);
        }
    }
}
