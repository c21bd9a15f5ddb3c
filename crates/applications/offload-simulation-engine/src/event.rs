//! Simulation events
//!
//! Events are created only by the allocator and are immutable afterwards.
//! Each kind carries its own payload struct instead of a loose key bag.

use serde::{Deserialize, Serialize};

use crate::types::{Edge, NodeId, TaskId};

/// Data moving over one hop of a task's path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transmission {
    pub task: TaskId,
    pub from: NodeId,
    pub to: NodeId,
    pub size_mb: f64,
    pub bandwidth: f64,
}

/// A portion of a task's complexity computed on one worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Computation {
    pub task: TaskId,
    pub node: NodeId,
    pub portion: f64, // FLOPS
}

/// End of a task's work on a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub task: TaskId,
    pub node: NodeId,
}

/// Event payload, tagged by kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// Data arrived at `to`; the transmission time is already in the timestamp
    DataTransmission(Transmission),
    /// A worker starts computing its next queued portion
    StartCalculation(Computation),
    /// A chain hop: the worker's portion is computed and done at this instant
    Calculation(Computation),
    /// A worker finished its active portion
    EndCalculation(Completion),
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::DataTransmission(_) => "data_transmission",
            EventKind::StartCalculation(_) => "start_calculation",
            EventKind::Calculation(_) => "calculation",
            EventKind::EndCalculation(_) => "end_calculation",
        }
    }

    pub fn task(&self) -> TaskId {
        match self {
            EventKind::DataTransmission(t) => t.task,
            EventKind::StartCalculation(c) | EventKind::Calculation(c) => c.task,
            EventKind::EndCalculation(c) => c.task,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::DataTransmission(t) => write!(
                f,
                "Transmission({} -> {}, {:.2} MB, task #{})",
                t.from, t.to, t.size_mb, t.task
            ),
            EventKind::StartCalculation(c) => {
                write!(f, "StartCalculation({}, {:.2e} FLOPS, task #{})", c.node, c.portion, c.task)
            }
            EventKind::Calculation(c) => {
                write!(f, "Calculation({}, {:.2e} FLOPS, task #{})", c.node, c.portion, c.task)
            }
            EventKind::EndCalculation(c) => write!(f, "EndCalculation({}, task #{})", c.node, c.task),
        }
    }
}

/// A scheduled event.
///
/// `edge` marks the link that is active for this event, used by renderers
/// and by the simulator to clean up transient links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub time: f64, // Simulated seconds
    pub kind: EventKind,
    pub edge: Option<Edge>,
}

impl Event {
    pub fn new(time: f64, kind: EventKind, edge: Option<Edge>) -> Self {
        Event { time, kind, edge }
    }

    /// Transmission over `from -> to`; the edge is the hop itself
    pub fn data_transmission(time: f64, transmission: Transmission) -> Self {
        let edge = Edge::new(transmission.from.clone(), transmission.to.clone());
        Event::new(time, EventKind::DataTransmission(transmission), Some(edge))
    }

    pub fn start_calculation(time: f64, computation: Computation) -> Self {
        Event::new(time, EventKind::StartCalculation(computation), None)
    }

    pub fn calculation(time: f64, computation: Computation, edge: Edge) -> Self {
        Event::new(time, EventKind::Calculation(computation), Some(edge))
    }

    pub fn end_calculation(time: f64, completion: Completion, edge: Edge) -> Self {
        Event::new(time, EventKind::EndCalculation(completion), Some(edge))
    }
}
