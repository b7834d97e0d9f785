//! Read-only queries over a built [`CircuitGraph`].
//!
//! Unknown components, nets and pins give `None` or an empty collection.
//! None of these methods mutate the graph, so a shared reference can be
//! queried from any number of callers.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use petgraph::algo::astar;
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use super::circuit::{CircuitGraph, CircuitNode, ComponentNode, NetNode};
use super::classify::ComponentCategory;
use crate::netlist::Connection;

/// Number of nets kept in [`CircuitStatistics::largest_nets`].
const LARGEST_NET_COUNT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitStatistics {
    pub total_components: usize,
    pub total_nets: usize,
    pub total_connections: usize,
    pub component_categories: BTreeMap<ComponentCategory, usize>,
    pub power_nets: Vec<String>,
    /// (net name, connection count), largest first, ties in netlist order
    pub largest_nets: Vec<(String, usize)>,
    pub floating_components: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetDetails {
    pub name: String,
    pub code: String,
    pub is_power: bool,
    pub num_connections: usize,
    pub components: Vec<Connection>,
    pub component_types: Vec<ComponentCategory>,
}

impl CircuitGraph {
    pub fn get_component(&self, reference: &str) -> Option<&ComponentNode> {
        self.component_indices
            .get(reference)
            .and_then(|&idx| self.graph[idx].as_component())
    }

    pub fn get_net(&self, name: &str) -> Option<&NetNode> {
        self.net_indices
            .get(name)
            .and_then(|&idx| self.graph[idx].as_net())
    }

    /// Distinct nets touched by a component, sorted by name.
    pub fn nets_of(&self, reference: &str) -> Vec<String> {
        let Some(&comp_idx) = self.component_indices.get(reference) else {
            return Vec::new();
        };

        let nets: BTreeSet<&str> = self
            .graph
            .neighbors(comp_idx)
            .filter_map(|n| match &self.graph[n] {
                CircuitNode::Net(net) => Some(net.name.as_str()),
                CircuitNode::Component(_) => None,
            })
            .collect();

        nets.into_iter().map(str::to_string).collect()
    }

    /// Every pin on a net, one entry per parallel edge, sorted.
    pub fn components_on(&self, net_name: &str) -> Vec<Connection> {
        let Some(&net_idx) = self.net_indices.get(net_name) else {
            return Vec::new();
        };

        let mut pins: Vec<Connection> = self
            .graph
            .edges(net_idx)
            .filter_map(|edge| {
                let other = if edge.source() == net_idx {
                    edge.target()
                } else {
                    edge.source()
                };
                match &self.graph[other] {
                    CircuitNode::Component(component) => Some(Connection {
                        reference: component.reference.clone(),
                        pin_number: edge.weight().pin_number.clone(),
                        pin_name: edge.weight().pin_name.clone(),
                    }),
                    CircuitNode::Net(_) => None,
                }
            })
            .collect();

        pins.sort();
        pins
    }

    /// Net on a given pin. With duplicate pin numbers the first edge in
    /// source order wins.
    pub fn pin_net(&self, reference: &str, pin_number: &str) -> Option<&str> {
        let &comp_idx = self.component_indices.get(reference)?;
        self.component_links(comp_idx)
            .into_iter()
            .find(|link| link.pin.pin_number == pin_number)
            .map(|link| link.net.name.as_str())
    }

    /// Pin name from the component's pin map.
    pub fn pin_name(&self, reference: &str, pin_number: &str) -> Option<&str> {
        self.get_component(reference)
            .and_then(|c| c.pins.get(pin_number))
            .map(String::as_str)
    }

    /// Shortest path between two components, alternating component and net
    /// labels. `None` if either end is unknown or they are not connected.
    pub fn shortest_path(&self, from_ref: &str, to_ref: &str) -> Option<Vec<String>> {
        let &from_idx = self.component_indices.get(from_ref)?;
        let &to_idx = self.component_indices.get(to_ref)?;

        let (_, path) = astar(&self.graph, from_idx, |n| n == to_idx, |_| 1usize, |_| 0)?;

        Some(
            path.into_iter()
                .map(|idx| self.graph[idx].label().to_string())
                .collect(),
        )
    }

    /// Components reachable within `max_hops` edge traversals, including
    /// the start component itself. Net nodes count as hops.
    pub fn connected_within(&self, reference: &str, max_hops: usize) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let Some(&start) = self.component_indices.get(reference) else {
            return found;
        };

        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([(start, 0usize)]);

        while let Some((idx, depth)) = queue.pop_front() {
            match &self.graph[idx] {
                CircuitNode::Component(c) => {
                    found.insert(c.reference.clone());
                }
                CircuitNode::Net(_) => {}
            }

            if depth == max_hops {
                continue;
            }

            for neighbor in self.graph.neighbors(idx) {
                if visited.insert(neighbor) {
                    queue.push_back((neighbor, depth + 1));
                }
            }
        }

        found
    }

    pub fn statistics(&self) -> CircuitStatistics {
        let mut component_categories = BTreeMap::new();
        for component in self.components() {
            *component_categories.entry(component.category).or_insert(0) += 1;
        }

        let power_nets = self
            .nets()
            .filter(|n| n.is_power)
            .map(|n| n.name.clone())
            .collect();

        let mut largest_nets: Vec<(String, usize)> = self
            .nets()
            .map(|n| (n.name.clone(), n.connection_count))
            .collect();
        // stable sort keeps netlist order among equal counts
        largest_nets.sort_by(|a, b| b.1.cmp(&a.1));
        largest_nets.truncate(LARGEST_NET_COUNT);

        let connected: HashSet<&str> = self
            .netlist
            .nets
            .values()
            .flat_map(|n| n.connections.iter())
            .map(|c| c.reference.as_str())
            .filter(|r| !r.starts_with('#'))
            .collect();

        let floating_components = self
            .components()
            .filter(|c| !connected.contains(c.reference.as_str()))
            .map(|c| c.reference.clone())
            .collect();

        CircuitStatistics {
            total_components: self.component_indices.len(),
            total_nets: self.net_indices.len(),
            total_connections: self.netlist.connection_count(),
            component_categories,
            power_nets,
            largest_nets,
            floating_components,
        }
    }

    pub fn get_net_details(&self, name: &str) -> Option<NetDetails> {
        let net = self.get_net(name)?;
        let components = self.components_on(name);

        let component_types: BTreeSet<ComponentCategory> = components
            .iter()
            .filter_map(|c| self.get_component(&c.reference))
            .map(|c| c.category)
            .collect();

        Some(NetDetails {
            name: net.name.clone(),
            code: net.code.clone(),
            is_power: net.is_power,
            num_connections: net.connection_count,
            components,
            component_types: component_types.into_iter().collect(),
        })
    }

    /// Components in netlist order, optionally restricted to one category.
    pub fn list_components(&self, category: Option<ComponentCategory>) -> Vec<&ComponentNode> {
        self.components()
            .filter(|c| category.map_or(true, |wanted| c.category == wanted))
            .collect()
    }

    /// Nets sorted by name, optionally power nets only.
    pub fn list_nets(&self, power_only: bool) -> Vec<&NetNode> {
        let mut nets: Vec<&NetNode> = self
            .nets()
            .filter(|n| !power_only || n.is_power)
            .collect();
        nets.sort_by(|a, b| a.name.cmp(&b.name));
        nets
    }
}
