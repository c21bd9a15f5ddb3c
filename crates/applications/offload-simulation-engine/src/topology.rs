//! Network topology consumed by the allocator and the simulator
//!
//! Topology generation lives outside the engine. The engine only reads nodes
//! and links through [`TopologyProvider`]; [`Topology`] is the in-memory
//! implementation a provider fills in.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimulationError};
use crate::types::{Edge, Link, NodeId};

/// A worker (user device) with a fixed compute capacity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub id: NodeId,
    pub capacity_tflops: f64,
}

/// A requester (enterprise) that submits tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequesterSpec {
    pub id: NodeId,
}

/// A node of the topology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Worker(WorkerSpec),
    Requester(RequesterSpec),
}

impl Node {
    pub fn id(&self) -> &NodeId {
        match self {
            Node::Worker(w) => &w.id,
            Node::Requester(r) => &r.id,
        }
    }

    pub fn is_worker(&self) -> bool {
        matches!(self, Node::Worker(_))
    }

    pub fn is_requester(&self) -> bool {
        matches!(self, Node::Requester(_))
    }
}

/// Read-only view of the network the engine runs on
pub trait TopologyProvider {
    /// Look up a node by id
    fn node(&self, id: &NodeId) -> Option<&Node>;

    /// All workers, in a stable order
    fn workers(&self) -> Vec<&WorkerSpec>;

    /// All requester ids, in a stable order
    fn requesters(&self) -> Vec<&NodeId>;

    /// The directed link `from -> to`, if any
    fn link(&self, from: &NodeId, to: &NodeId) -> Option<Link>;

    /// Every directed link, in a stable order
    fn links(&self) -> Vec<(Edge, Link)>;

    fn is_requester(&self, id: &NodeId) -> bool {
        self.node(id).is_some_and(Node::is_requester)
    }

    /// Link between two nodes regardless of direction, `a -> b` first
    fn link_between(&self, a: &NodeId, b: &NodeId) -> Option<Link> {
        self.link(a, b).or_else(|| self.link(b, a))
    }
}

/// Check every capacity and link of a provider.
///
/// Runs before any allocation so that no division by a zero capacity or
/// bandwidth can happen later.
pub fn validate(topology: &dyn TopologyProvider) -> Result<()> {
    for worker in topology.workers() {
        check_capacity(&worker.id, worker.capacity_tflops)?;
    }
    for (edge, link) in topology.links() {
        if topology.node(&edge.from).is_none() {
            return Err(SimulationError::UnknownNode(edge.from));
        }
        if topology.node(&edge.to).is_none() {
            return Err(SimulationError::UnknownNode(edge.to));
        }
        check_link(&edge, &link)?;
    }
    Ok(())
}

fn check_capacity(id: &NodeId, capacity_tflops: f64) -> Result<()> {
    if !capacity_tflops.is_finite() || capacity_tflops <= 0.0 {
        return Err(SimulationError::InvalidCapacity {
            node: id.clone(),
            capacity: capacity_tflops,
        });
    }
    Ok(())
}

fn check_link(edge: &Edge, link: &Link) -> Result<()> {
    if !link.bandwidth.is_finite() || link.bandwidth <= 0.0 {
        return Err(SimulationError::bandwidth(format!("link {}", edge), link.bandwidth));
    }
    if !link.latency.is_finite() || link.latency < 0.0 {
        return Err(SimulationError::config(format!(
            "link {} has invalid latency {}",
            edge, link.latency
        )));
    }
    Ok(())
}

/// In-memory topology with id-ordered node and link maps
#[derive(Debug, Clone, Default)]
pub struct Topology {
    nodes: BTreeMap<NodeId, Node>,
    links: BTreeMap<Edge, Link>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker; capacity must be a positive number of TFLOPS
    pub fn add_worker(&mut self, id: impl Into<NodeId>, capacity_tflops: f64) -> Result<()> {
        let id = id.into();
        check_capacity(&id, capacity_tflops)?;
        self.insert(Node::Worker(WorkerSpec {
            id,
            capacity_tflops,
        }))
    }

    /// Register a requester
    pub fn add_requester(&mut self, id: impl Into<NodeId>) -> Result<()> {
        self.insert(Node::Requester(RequesterSpec { id: id.into() }))
    }

    /// Add a directed link between two registered nodes
    pub fn add_link(
        &mut self,
        from: impl Into<NodeId>,
        to: impl Into<NodeId>,
        bandwidth: f64,
        latency: f64,
    ) -> Result<()> {
        let edge = Edge::new(from.into(), to.into());
        for id in [&edge.from, &edge.to] {
            if !self.nodes.contains_key(id) {
                return Err(SimulationError::UnknownNode(id.clone()));
            }
        }

        let link = Link { bandwidth, latency };
        check_link(&edge, &link)?;
        self.links.insert(edge, link);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Re-check every capacity and link
    pub fn validate(&self) -> Result<()> {
        validate(self)
    }

    /// All nodes in id order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    fn insert(&mut self, node: Node) -> Result<()> {
        if self.nodes.contains_key(node.id()) {
            return Err(SimulationError::DuplicateNode(node.id().clone()));
        }
        self.nodes.insert(node.id().clone(), node);
        Ok(())
    }
}

impl TopologyProvider for Topology {
    fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    fn workers(&self) -> Vec<&WorkerSpec> {
        self.nodes
            .values()
            .filter_map(|node| match node {
                Node::Worker(w) => Some(w),
                Node::Requester(_) => None,
            })
            .collect()
    }

    fn requesters(&self) -> Vec<&NodeId> {
        self.nodes
            .values()
            .filter(|node| node.is_requester())
            .map(Node::id)
            .collect()
    }

    fn link(&self, from: &NodeId, to: &NodeId) -> Option<Link> {
        self.links
            .get(&Edge::new(from.clone(), to.clone()))
            .copied()
    }

    fn links(&self) -> Vec<(Edge, Link)> {
        self.links
            .iter()
            .map(|(edge, link)| (edge.clone(), *link))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_topology() -> Topology {
        let mut topology = Topology::new();
        topology.add_worker("user_1", 5.0).unwrap();
        topology.add_worker("user_2", 2.0).unwrap();
        topology.add_requester("enterprise_1").unwrap();
        topology.add_link("user_1", "enterprise_1", 100.0, 10.0).unwrap();
        topology.add_link("user_2", "enterprise_1", 50.0, 20.0).unwrap();
        topology
    }

    #[test]
    fn test_node_kinds() {
        let topology = sample_topology();
        assert_eq!(topology.len(), 3);
        assert_eq!(topology.workers().len(), 2);
        assert_eq!(topology.requesters(), vec![&NodeId::from("enterprise_1")]);
        assert!(topology.is_requester(&NodeId::from("enterprise_1")));
        assert!(!topology.is_requester(&NodeId::from("user_1")));
    }

    #[test]
    fn test_link_properties() {
        let topology = sample_topology();
        let link = topology
            .link(&NodeId::from("user_2"), &NodeId::from("enterprise_1"))
            .unwrap();
        assert_eq!(link.bandwidth, 50.0);
        assert_eq!(link.latency, 20.0);
    }

    #[test]
    fn test_link_between_ignores_direction() {
        let topology = sample_topology();
        let a = NodeId::from("enterprise_1");
        let b = NodeId::from("user_1");
        assert!(topology.link(&a, &b).is_none());
        assert_eq!(topology.link_between(&a, &b).unwrap().latency, 10.0);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut topology = Topology::new();
        let result = topology.add_worker("user_0", 0.0);
        assert!(matches!(result, Err(SimulationError::InvalidCapacity { .. })));
    }

    #[test]
    fn test_negative_capacity_rejected() {
        let mut topology = Topology::new();
        assert!(topology.add_worker("user_0", -1.5).is_err());
    }

    #[test]
    fn test_zero_bandwidth_rejected() {
        let mut topology = sample_topology();
        let result = topology.add_link("user_1", "user_2", 0.0, 5.0);
        assert!(matches!(result, Err(SimulationError::InvalidBandwidth { .. })));
    }

    #[test]
    fn test_link_to_unknown_node_rejected() {
        let mut topology = sample_topology();
        let result = topology.add_link("user_1", "user_9", 10.0, 5.0);
        assert!(matches!(result, Err(SimulationError::UnknownNode(_))));
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut topology = sample_topology();
        let result = topology.add_requester("user_1");
        assert!(matches!(result, Err(SimulationError::DuplicateNode(_))));
    }

    #[test]
    fn test_validate_accepts_well_formed_topology() {
        assert!(validate(&sample_topology()).is_ok());
    }
}
