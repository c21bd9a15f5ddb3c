//! Offload Simulation Engine
//!
//! Discrete-event simulator for offloading compute tasks from requester
//! nodes to a network of capacity-constrained worker nodes.
//!
//! ```text
//! TopologyProvider ──▶ ResourcePool ──┐
//!                                     ├──▶ Allocator ──▶ Timeline ──▶ Simulator ──▶ StepReport
//! TaskRequest ──▶ Task ───────────────┘    (policy)                      │
//!                                                                        ▼
//!                                                        RunStats ──▶ RunSummary
//! ```
//!
//! Key types:
//! - `Topology` / `TopologyProvider` (workers, requesters, links)
//! - `Allocator` with `AllocationPolicy` (direct nearest-latency, chain)
//! - `Timeline` (time-ordered event queue)
//! - `Simulator` (step-driven replay of the timeline)
//! - `RunSummary` (aggregate metrics)
//!
//! The library logs through `tracing` and never installs a subscriber.

pub mod allocator;
pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod policies;
pub mod resource;
pub mod simulator;
pub mod timeline;
pub mod topology;
pub mod types;

pub use allocator::{AllocationReport, Allocator, UnassignableTask};
pub use config::{AllocatorConfig, BandwidthModel, PolicyKind, PortionSplit, TieBreak};
pub use error::{Result, SimulationError, UnassignableReason};
pub use event::{Event, EventKind};
pub use metrics::{RequesterTally, RunSummary};
pub use resource::{NodeResource, ResourcePool};
pub use simulator::{RunStats, Simulator, SimulatorState, Step, StepReport, TopologySnapshot};
pub use timeline::Timeline;
pub use topology::{Topology, TopologyProvider};
pub use types::*;
