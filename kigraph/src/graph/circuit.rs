//! Circuit Graph Implementation
//!
//! A bipartite multigraph built with petgraph. Component nodes and net nodes
//! are the two node kinds; every edge is one pin of one component landing on
//! one net, so a component touching the same net through two pins gets two
//! parallel edges.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::classify::{component_category, is_power_net, ComponentCategory};
use crate::netlist::{is_power_symbol, Component, Net, Netlist};
use crate::parser::records::Record;

/// Component side of the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentNode {
    pub reference: String,
    pub value: String,
    pub footprint: String,
    pub category: ComponentCategory,
    /// pin number -> pin name
    pub pins: IndexMap<String, String>,
    pub fields: IndexMap<String, String>,
}

impl ComponentNode {
    fn from_component(component: &Component) -> Self {
        Self {
            reference: component.reference.clone(),
            value: component.value.clone(),
            footprint: component.footprint.clone(),
            category: component_category(&component.reference),
            pins: component.pins.clone(),
            fields: component.fields.clone(),
        }
    }
}

/// Net side of the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetNode {
    pub name: String,
    pub code: String,
    pub is_power: bool,
    pub connection_count: usize,
}

impl NetNode {
    fn from_net(net: &Net) -> Self {
        Self {
            name: net.name.clone(),
            code: net.code.clone(),
            is_power: is_power_net(&net.name),
            connection_count: net.connections.len(),
        }
    }
}

/// Node type in the circuit graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitNode {
    Component(ComponentNode),
    Net(NetNode),
}

impl CircuitNode {
    /// Display label: reference for components, name for nets.
    pub fn label(&self) -> &str {
        match self {
            CircuitNode::Component(c) => &c.reference,
            CircuitNode::Net(n) => &n.name,
        }
    }

    pub fn as_component(&self) -> Option<&ComponentNode> {
        match self {
            CircuitNode::Component(c) => Some(c),
            CircuitNode::Net(_) => None,
        }
    }

    pub fn as_net(&self) -> Option<&NetNode> {
        match self {
            CircuitNode::Net(n) => Some(n),
            CircuitNode::Component(_) => None,
        }
    }
}

/// Edge type in the circuit graph - one pin connection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PinEdge {
    pub pin_number: String,
    pub pin_name: String,
}

/// Borrowed view of one edge with its endpoints resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinLink<'a> {
    pub component: &'a ComponentNode,
    pub net: &'a NetNode,
    pub pin: &'a PinEdge,
}

/// Graph model of one board.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CircuitGraph {
    pub(crate) graph: UnGraph<CircuitNode, PinEdge>,
    pub(crate) component_indices: IndexMap<String, NodeIndex>,
    pub(crate) net_indices: IndexMap<String, NodeIndex>,
    pub(crate) netlist: Netlist,
    source: Option<PathBuf>,
}

impl CircuitGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_netlist(netlist: Netlist) -> Self {
        let mut circuit = Self::new();
        circuit.rebuild(netlist);
        circuit
    }

    pub fn from_records(records: &[Record]) -> Self {
        Self::from_netlist(Netlist::extract(records))
    }

    /// Replace the model with `netlist`, discarding all previous graph state.
    pub fn rebuild(&mut self, netlist: Netlist) {
        self.graph.clear();
        self.component_indices.clear();
        self.net_indices.clear();
        self.netlist = netlist;
        self.build();
    }

    fn build(&mut self) {
        let netlist = std::mem::take(&mut self.netlist);

        // Pass 1: component nodes
        for component in netlist.components.values() {
            if is_power_symbol(&component.reference) {
                continue;
            }
            self.add_component(ComponentNode::from_component(component));
        }

        // Pass 2: net nodes and one edge per pin connection
        for net in netlist.nets.values() {
            let net_idx = self.add_net(NetNode::from_net(net));
            for conn in &net.connections {
                if is_power_symbol(&conn.reference) {
                    continue;
                }
                if let Some(&comp_idx) = self.component_indices.get(&conn.reference) {
                    let edge = PinEdge {
                        pin_number: conn.pin_number.clone(),
                        pin_name: conn.pin_name.clone(),
                    };
                    self.graph.add_edge(comp_idx, net_idx, edge);
                }
            }
        }

        self.netlist = netlist;
        debug!(
            "Built circuit graph: {} components, {} nets, {} edges",
            self.component_indices.len(),
            self.net_indices.len(),
            self.graph.edge_count()
        );
    }

    fn add_component(&mut self, component: ComponentNode) -> NodeIndex {
        let reference = component.reference.clone();
        let idx = self.graph.add_node(CircuitNode::Component(component));
        self.component_indices.insert(reference, idx);
        idx
    }

    fn add_net(&mut self, net: NetNode) -> NodeIndex {
        let name = net.name.clone();
        let idx = self.graph.add_node(CircuitNode::Net(net));
        self.net_indices.insert(name, idx);
        idx
    }

    pub fn netlist(&self) -> &Netlist {
        &self.netlist
    }

    /// File the graph was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn set_source(&mut self, source: impl Into<PathBuf>) {
        self.source = Some(source.into());
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains_component(&self, reference: &str) -> bool {
        self.component_indices.contains_key(reference)
    }

    pub fn contains_net(&self, name: &str) -> bool {
        self.net_indices.contains_key(name)
    }

    /// Component nodes in netlist order.
    pub fn components(&self) -> impl Iterator<Item = &ComponentNode> {
        self.component_indices
            .values()
            .filter_map(|&idx| self.graph[idx].as_component())
    }

    /// Net nodes in netlist order.
    pub fn nets(&self) -> impl Iterator<Item = &NetNode> {
        self.net_indices
            .values()
            .filter_map(|&idx| self.graph[idx].as_net())
    }

    /// Every pin edge in insertion order.
    pub fn links(&self) -> impl Iterator<Item = PinLink<'_>> {
        self.graph
            .edge_references()
            .filter_map(move |edge| self.resolve_link(edge.id()))
    }

    /// Pin edges of one component in insertion order.
    pub(crate) fn component_links(&self, idx: NodeIndex) -> Vec<PinLink<'_>> {
        let mut edges: Vec<EdgeIndex> = self.graph.edges(idx).map(|e| e.id()).collect();
        edges.sort();
        edges
            .into_iter()
            .filter_map(|id| self.resolve_link(id))
            .collect()
    }

    /// Resolve an edge to its (component, net, pin) triple regardless of
    /// which endpoint petgraph reports first.
    fn resolve_link(&self, edge: EdgeIndex) -> Option<PinLink<'_>> {
        let (a, b) = self.graph.edge_endpoints(edge)?;
        let pin = &self.graph[edge];
        match (&self.graph[a], &self.graph[b]) {
            (CircuitNode::Component(component), CircuitNode::Net(net))
            | (CircuitNode::Net(net), CircuitNode::Component(component)) => {
                Some(PinLink { component, net, pin })
            }
            (CircuitNode::Component(_), CircuitNode::Component(_))
            | (CircuitNode::Net(_), CircuitNode::Net(_)) => None,
        }
    }

    /// Serialize the complete graph (nodes, edges, attributes, netlist).
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_support::sample_records;

    #[test]
    fn test_circuit_creation() {
        let circuit = CircuitGraph::from_records(&sample_records());

        assert!(circuit.contains_component("U1"));
        assert!(circuit.contains_component("C1"));
        assert!(!circuit.contains_component("#PWR01"));
        assert!(circuit.contains_net("VCC"));
        assert_eq!(circuit.node_count(), 4);
        // two parallel U1-VCC edges, power symbol edge omitted
        assert_eq!(circuit.edge_count(), 5);
    }

    #[test]
    fn test_node_annotations() {
        let circuit = CircuitGraph::from_records(&sample_records());
        let u1 = circuit.components().find(|c| c.reference == "U1").unwrap();
        assert_eq!(u1.category, ComponentCategory::ICs);
        let gnd = circuit.nets().find(|n| n.name == "GND").unwrap();
        assert!(gnd.is_power);
        assert_eq!(gnd.connection_count, 3);
    }

    #[test]
    fn test_links_are_bipartite() {
        let circuit = CircuitGraph::from_records(&sample_records());
        let links: Vec<_> = circuit.links().collect();
        assert_eq!(links.len(), circuit.edge_count());
        assert_eq!(links[0].component.reference, "U1");
        assert_eq!(links[0].net.name, "VCC");
        assert_eq!(links[1].pin.pin_number, "24");
    }

    #[test]
    fn test_rebuild_discards_previous_state() {
        let mut circuit = CircuitGraph::from_records(&sample_records());
        circuit.rebuild(Netlist::default());
        assert_eq!(circuit.node_count(), 0);
        assert!(!circuit.contains_component("U1"));
    }

    #[test]
    fn test_roundtrip_bytes() {
        let mut circuit = CircuitGraph::from_records(&sample_records());
        circuit.set_source("/tmp/board.net");
        let restored = CircuitGraph::from_bytes(&circuit.to_bytes().unwrap()).unwrap();

        assert_eq!(restored.node_count(), circuit.node_count());
        assert_eq!(restored.edge_count(), circuit.edge_count());
        assert_eq!(restored.netlist(), circuit.netlist());
        assert_eq!(restored.source(), Some(Path::new("/tmp/board.net")));
    }
}
