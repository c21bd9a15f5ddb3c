//! Global timeline of scheduled events
//!
//! A min-heap keyed by `(time, sequence)`. The sequence number is assigned at
//! insertion, so events scheduled for the same instant pop in the order they
//! were scheduled.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimulationError};
use crate::event::Event;

/// Insertion sequence number of an event on a timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(u64);

impl EventId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E#{}", self.0)
    }
}

/// Timed event wrapper for priority queue ordering
#[derive(Debug, Clone)]
struct TimedEvent {
    id: EventId,
    event: Event,
}

// Priority queue orders by time (earliest first), then by insertion order
impl Ord for TimedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse comparison for min-heap (BinaryHeap is max-heap by default)
        other
            .event
            .time
            .total_cmp(&self.event.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for TimedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for TimedEvent {}

impl PartialEq for TimedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Ordered schedule of events, owned by whoever drives the run
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    queue: BinaryHeap<TimedEvent>,
    next_id: u64,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a timeline from recorded events, keeping their order on ties
    pub fn from_events<I>(events: I) -> Result<Self>
    where
        I: IntoIterator<Item = Event>,
    {
        let mut timeline = Timeline::new();
        for event in events {
            timeline.schedule(event)?;
        }
        Ok(timeline)
    }

    /// Insert an event.
    ///
    /// Negative or non-finite times are rejected so that a bad division
    /// upstream cannot end up as an infinitely late event.
    pub fn schedule(&mut self, event: Event) -> Result<EventId> {
        if !event.time.is_finite() || event.time < 0.0 {
            return Err(SimulationError::InvalidTime(event.time));
        }

        let id = EventId(self.next_id);
        self.next_id += 1;
        self.queue.push(TimedEvent { id, event });
        Ok(id)
    }

    /// Remove and return the earliest event; `None` once the timeline is empty
    pub fn pop_earliest(&mut self) -> Option<Event> {
        self.queue.pop().map(|timed| timed.event)
    }

    pub fn peek_earliest(&self) -> Option<&Event> {
        self.queue.peek().map(|timed| &timed.event)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Copy of all pending events in pop order, leaving the timeline intact
    pub fn ordered_events(&self) -> Vec<Event> {
        let mut timed: Vec<&TimedEvent> = self.queue.iter().collect();
        // Reversed Ord: the earliest event is the greatest
        timed.sort_by(|a, b| b.cmp(a));
        timed.into_iter().map(|t| t.event.clone()).collect()
    }
}
