//! Multi-board composition
//!
//! Merges per-board [`CircuitGraph`]s into one unified graph. Every node id is
//! board-qualified (`board:R1`, `board:/MISO`), so nothing merges implicitly.
//! Same-named nets on two boards are joined by a cross-board edge only when
//! some component on each side comes from the same schematic sheet file,
//! which is how the two halves of a connector pair defined in a shared
//! interface sheet show up. Every comparison is kept as a [`LinkCandidate`]
//! so callers can see why a link was or was not made.
//!
//! Boards must be added in a fixed order: linking only looks at boards that
//! are already present.

mod signal;

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::fmt::Write;

use indexmap::IndexMap;
use petgraph::algo::astar;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::graph::{CircuitGraph, ComponentCategory, PinEdge};
use crate::hierarchy::SheetMap;

pub use signal::{SignalPath, SignalStep};

pub const BOARD_SEPARATOR: char = ':';

/// `board:local`
pub fn qualify(board: &str, local: &str) -> String {
    format!("{}{}{}", board, BOARD_SEPARATOR, local)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemComponent {
    pub id: String,
    pub board: String,
    pub reference: String,
    pub value: String,
    pub category: ComponentCategory,
    /// File name of the schematic sheet declaring this reference.
    pub sheet: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemNet {
    pub id: String,
    pub board: String,
    pub name: String,
    pub is_power: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemNode {
    Component(SystemComponent),
    Net(SystemNet),
}

impl SystemNode {
    pub fn id(&self) -> &str {
        match self {
            SystemNode::Component(c) => &c.id,
            SystemNode::Net(n) => &n.id,
        }
    }

    pub fn board(&self) -> &str {
        match self {
            SystemNode::Component(c) => &c.board,
            SystemNode::Net(n) => &n.board,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemEdge {
    /// Mirrors a pin edge of one board.
    Pin(PinEdge),
    /// Inferred link between two board-qualified instances of one net.
    CrossBoard { shared_sheets: Vec<String> },
}

/// One same-name comparison made while adding a board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkCandidate {
    pub net: String,
    /// Board being added when the comparison was made.
    pub board: String,
    pub other_board: String,
    /// Sheet files seen on both sides; empty means no evidence.
    pub shared_sheets: Vec<String>,
    pub linked: bool,
}

#[derive(Debug, Clone)]
struct BoardEntry {
    circuit: CircuitGraph,
    ignored: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemSummary {
    pub boards: usize,
    pub components: usize,
    pub nets: usize,
    pub connections: usize,
    pub cross_board_links: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MultiBoardGraph {
    boards: IndexMap<String, BoardEntry>,
    graph: UnGraph<SystemNode, SystemEdge>,
    component_indices: IndexMap<String, NodeIndex>,
    net_indices: IndexMap<String, NodeIndex>,
    candidates: Vec<LinkCandidate>,
}

impl MultiBoardGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one board. Components listed in `ignore` stay in the board's own
    /// graph but are left out of the unified one. Returns `false` if a board
    /// with this name was already added.
    pub fn add_board(
        &mut self,
        name: &str,
        circuit: CircuitGraph,
        sheets: &SheetMap,
        ignore: &[String],
    ) -> bool {
        if self.boards.contains_key(name) {
            warn!("Board '{}' already added, ignoring", name);
            return false;
        }

        let ignored: BTreeSet<String> = ignore.iter().cloned().collect();
        info!(
            "Adding board '{}' ({} components, {} ignored)",
            name,
            circuit.components().count(),
            ignored.len()
        );

        for component in circuit.components() {
            if ignored.contains(&component.reference) {
                continue;
            }
            let id = qualify(name, &component.reference);
            let idx = self.graph.add_node(SystemNode::Component(SystemComponent {
                id: id.clone(),
                board: name.to_string(),
                reference: component.reference.clone(),
                value: component.value.clone(),
                category: component.category,
                sheet: sheets.sheet_of(&component.reference).map(str::to_string),
            }));
            self.component_indices.insert(id, idx);
        }

        let mut new_nets = Vec::new();
        for net in circuit.nets() {
            let id = qualify(name, &net.name);
            let idx = self.graph.add_node(SystemNode::Net(SystemNet {
                id: id.clone(),
                board: name.to_string(),
                name: net.name.clone(),
                is_power: net.is_power,
            }));
            self.net_indices.insert(id, idx);
            new_nets.push((net.name.clone(), idx));
        }

        for link in circuit.links() {
            let comp_id = qualify(name, &link.component.reference);
            let net_id = qualify(name, &link.net.name);
            if let (Some(&comp_idx), Some(&net_idx)) = (
                self.component_indices.get(&comp_id),
                self.net_indices.get(&net_id),
            ) {
                self.graph
                    .add_edge(comp_idx, net_idx, SystemEdge::Pin(link.pin.clone()));
            }
        }

        let previous: Vec<String> = self.boards.keys().cloned().collect();
        for (net_name, net_idx) in &new_nets {
            for other in &previous {
                let Some(&other_idx) = self.net_indices.get(&qualify(other, net_name)) else {
                    continue;
                };
                self.compare_and_link(name, other, net_name, *net_idx, other_idx);
            }
        }

        self.boards
            .insert(name.to_string(), BoardEntry { circuit, ignored });
        true
    }

    fn compare_and_link(
        &mut self,
        board: &str,
        other: &str,
        net_name: &str,
        net_idx: NodeIndex,
        other_idx: NodeIndex,
    ) {
        let ours = self.member_sheets(net_idx);
        let theirs = self.member_sheets(other_idx);
        let shared_sheets: Vec<String> = ours.intersection(&theirs).cloned().collect();
        let linked = !shared_sheets.is_empty();

        if linked {
            debug!(
                "Linking {} between '{}' and '{}' via {:?}",
                net_name, board, other, shared_sheets
            );
            self.graph.add_edge(
                net_idx,
                other_idx,
                SystemEdge::CrossBoard {
                    shared_sheets: shared_sheets.clone(),
                },
            );
        } else {
            debug!(
                "Not linking {} between '{}' and '{}': no shared sheet",
                net_name, board, other
            );
        }

        self.candidates.push(LinkCandidate {
            net: net_name.to_string(),
            board: board.to_string(),
            other_board: other.to_string(),
            shared_sheets,
            linked,
        });
    }

    fn member_sheets(&self, net_idx: NodeIndex) -> BTreeSet<String> {
        self.net_members(net_idx)
            .into_iter()
            .filter_map(|c| c.sheet.clone())
            .collect()
    }

    /// Components attached to a net node, in edge insertion order, deduplicated.
    pub(crate) fn net_members(&self, net_idx: NodeIndex) -> Vec<&SystemComponent> {
        let mut edges: Vec<_> = self
            .graph
            .edges(net_idx)
            .filter(|e| matches!(e.weight(), SystemEdge::Pin(_)))
            .map(|e| (e.id(), if e.source() == net_idx { e.target() } else { e.source() }))
            .collect();
        edges.sort();

        let mut seen = HashSet::new();
        edges
            .into_iter()
            .filter(|(_, idx)| seen.insert(*idx))
            .filter_map(|(_, idx)| match &self.graph[idx] {
                SystemNode::Component(c) => Some(c),
                SystemNode::Net(_) => None,
            })
            .collect()
    }

    /// Net nodes named `net_name`, one per board that has it, in board order.
    pub(crate) fn net_instances(&self, net_name: &str) -> Vec<NodeIndex> {
        self.boards
            .keys()
            .filter_map(|board| self.net_indices.get(&qualify(board, net_name)).copied())
            .collect()
    }

    pub fn board_names(&self) -> impl Iterator<Item = &str> {
        self.boards.keys().map(String::as_str)
    }

    pub fn board(&self, name: &str) -> Option<&CircuitGraph> {
        self.boards.get(name).map(|b| &b.circuit)
    }

    pub fn ignored(&self, board: &str) -> Option<&BTreeSet<String>> {
        self.boards.get(board).map(|b| &b.ignored)
    }

    pub fn is_empty(&self) -> bool {
        self.boards.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn component(&self, id: &str) -> Option<&SystemComponent> {
        match &self.graph[*self.component_indices.get(id)?] {
            SystemNode::Component(c) => Some(c),
            SystemNode::Net(_) => None,
        }
    }

    pub fn net(&self, id: &str) -> Option<&SystemNet> {
        match &self.graph[*self.net_indices.get(id)?] {
            SystemNode::Net(n) => Some(n),
            SystemNode::Component(_) => None,
        }
    }

    /// Every same-name comparison, linked or not, in the order made.
    pub fn link_candidates(&self) -> &[LinkCandidate] {
        &self.candidates
    }

    /// Net name -> boards joined by at least one cross-board link.
    pub fn get_cross_board_connections(&self) -> BTreeMap<String, Vec<String>> {
        let mut shared: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for candidate in self.candidates.iter().filter(|c| c.linked) {
            let boards = shared.entry(candidate.net.clone()).or_default();
            boards.insert(candidate.board.clone());
            boards.insert(candidate.other_board.clone());
        }
        shared
            .into_iter()
            .map(|(net, boards)| (net, boards.into_iter().collect()))
            .collect()
    }

    /// Boards whose netlist has a net with this name, linked or not.
    pub fn boards_with_net(&self, net_name: &str) -> Vec<String> {
        self.boards
            .keys()
            .filter(|board| self.net_indices.contains_key(&qualify(board, net_name)))
            .cloned()
            .collect()
    }

    /// Distinct net ids touched by a board-qualified component, sorted.
    pub fn nets_of(&self, component_id: &str) -> Vec<String> {
        let Some(&idx) = self.component_indices.get(component_id) else {
            return Vec::new();
        };
        let nets: BTreeSet<&str> = self
            .graph
            .neighbors(idx)
            .filter_map(|n| match &self.graph[n] {
                SystemNode::Net(net) => Some(net.id.as_str()),
                SystemNode::Component(_) => None,
            })
            .collect();
        nets.into_iter().map(str::to_string).collect()
    }

    /// Board-qualified component ids on a board-qualified net, sorted.
    pub fn components_on(&self, net_id: &str) -> Vec<String> {
        let Some(&idx) = self.net_indices.get(net_id) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = self
            .net_members(idx)
            .into_iter()
            .map(|c| c.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Component ids within `max_hops` edges of `component_id`, cross-board
    /// links included.
    pub fn connected_within(&self, component_id: &str, max_hops: usize) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let Some(&start) = self.component_indices.get(component_id) else {
            return found;
        };

        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([(start, 0usize)]);
        while let Some((idx, depth)) = queue.pop_front() {
            match &self.graph[idx] {
                SystemNode::Component(c) => {
                    found.insert(c.id.clone());
                }
                SystemNode::Net(_) => {}
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

    /// Shortest path between two components anywhere in the system.
    ///
    /// Without a board filter every board holding the reference is tried,
    /// in board order, and the first connected pair wins.
    pub fn trace_cross_board(
        &self,
        start_ref: &str,
        end_ref: &str,
        start_board: Option<&str>,
        end_board: Option<&str>,
    ) -> Option<Vec<String>> {
        let candidates = |reference: &str, board: Option<&str>| -> Vec<NodeIndex> {
            self.boards
                .keys()
                .filter(|b| board.map_or(true, |wanted| wanted == b.as_str()))
                .filter_map(|b| self.component_indices.get(&qualify(b, reference)).copied())
                .collect()
        };

        let starts = candidates(start_ref, start_board);
        let ends = candidates(end_ref, end_board);

        for &from in &starts {
            for &to in &ends {
                if let Some((_, path)) = astar(&self.graph, from, |n| n == to, |_| 1usize, |_| 0) {
                    return Some(
                        path.into_iter()
                            .map(|idx| self.graph[idx].id().to_string())
                            .collect(),
                    );
                }
            }
        }
        None
    }

    /// Components on any instance of the net that can drive it
    /// (ICs, switches, uncategorised parts), as (board, reference).
    pub fn find_signal_sources(&self, net_name: &str) -> Vec<(String, String)> {
        self.net_instances(net_name)
            .into_iter()
            .flat_map(|idx| self.net_members(idx))
            .filter(|c| {
                matches!(
                    c.category,
                    ComponentCategory::ICs | ComponentCategory::Switches | ComponentCategory::Other
                )
            })
            .map(|c| (c.board.clone(), c.reference.clone()))
            .collect()
    }

    pub fn summary(&self) -> SystemSummary {
        SystemSummary {
            boards: self.boards.len(),
            components: self.component_indices.len(),
            nets: self.net_indices.len(),
            connections: self.graph.edge_count(),
            cross_board_links: self.candidates.iter().filter(|c| c.linked).count(),
        }
    }

    pub fn overview_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Multi-Board System Overview\n");
        let _ = writeln!(out, "## Boards");
        for (name, entry) in &self.boards {
            let stats = entry.circuit.statistics();
            let _ = writeln!(
                out,
                "- **{}**: {} components, {} nets",
                name, stats.total_components, stats.total_nets
            );
        }

        let cross_board = self.get_cross_board_connections();
        let _ = writeln!(
            out,
            "\n## Cross-Board Connections ({} shared nets)",
            cross_board.len()
        );

        let mut power = Vec::new();
        let mut signals = Vec::new();
        for (net, boards) in cross_board.iter().take(20) {
            let line = format!("- **{}**: {}", net, boards.join(" <-> "));
            if crate::graph::is_power_net(net) {
                power.push(line);
            } else {
                signals.push(line);
            }
        }
        if !power.is_empty() {
            let _ = writeln!(out, "\n### Power\n{}", power.join("\n"));
        }
        if !signals.is_empty() {
            let _ = writeln!(out, "\n### Signals\n{}", signals.join("\n"));
        }

        let summary = self.summary();
        let _ = writeln!(out, "\n## Unified Graph Statistics");
        let _ = writeln!(out, "- Total components: {}", summary.components);
        let _ = writeln!(out, "- Total nets: {}", summary.nets);
        let _ = writeln!(out, "- Total connections: {}", summary.connections);
        let _ = writeln!(out, "- Cross-board links: {}", summary.cross_board_links);

        out.trim_end().to_string()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::graph::test_support::{net, part};
    use crate::parser::records::Record;

    pub(crate) fn board(records: Vec<Record>) -> CircuitGraph {
        CircuitGraph::from_records(&records)
    }

    /// main: U1 (MCU) -> J1 (interface connector) on /MISO; R1 pull-up on /MISO.
    /// sense: J2 (mating connector) -> U5 (ADC) on /MISO.
    /// J1 and J2 are both declared in spi_link.kicad_sch.
    pub(crate) fn mated_system() -> MultiBoardGraph {
        let main = board(vec![
            part("U1", "STM32"),
            part("J1", "Conn_SPI"),
            part("R1", "10k"),
            net("1", "/MISO", &[("U1", "12"), ("J1", "3"), ("R1", "1")]),
            net("2", "GND", &[("U1", "2"), ("J1", "1")]),
        ]);
        let sense = board(vec![
            part("J2", "Conn_SPI"),
            part("U5", "ADS1118"),
            net("1", "/MISO", &[("J2", "3"), ("U5", "6")]),
            net("2", "GND", &[("J2", "1"), ("U5", "3")]),
        ]);

        let main_sheets: SheetMap = [
            ("U1", "main.kicad_sch"),
            ("R1", "main.kicad_sch"),
            ("J1", "spi_link.kicad_sch"),
        ]
        .into_iter()
        .collect();
        let sense_sheets: SheetMap = [("J2", "spi_link.kicad_sch"), ("U5", "sense.kicad_sch")]
            .into_iter()
            .collect();

        let mut system = MultiBoardGraph::new();
        system.add_board("main", main, &main_sheets, &[]);
        system.add_board("sense", sense, &sense_sheets, &[]);
        system
    }

    #[test]
    fn test_ids_are_board_qualified() {
        let system = mated_system();
        assert!(system.component("main:U1").is_some());
        assert!(system.component("sense:U5").is_some());
        assert!(system.net("main:/MISO").is_some());
        assert!(system.net("sense:/MISO").is_some());
        assert_eq!(system.component("main:J1").unwrap().sheet.as_deref(), Some("spi_link.kicad_sch"));
    }

    #[test]
    fn test_shared_sheet_links_nets() {
        let system = mated_system();
        let cross = system.get_cross_board_connections();
        assert_eq!(cross.get("/MISO"), Some(&vec!["main".to_string(), "sense".to_string()]));
        assert_eq!(cross.get("GND"), Some(&vec!["main".to_string(), "sense".to_string()]));
        assert_eq!(system.summary().cross_board_links, 2);
        let candidate = &system.link_candidates()[0];
        assert_eq!(candidate.board, "sense");
        assert_eq!(candidate.other_board, "main");
        assert_eq!(candidate.shared_sheets, vec!["spi_link.kicad_sch"]);
    }

    #[test]
    fn test_matching_name_without_shared_sheet_is_not_linked() {
        let main = board(vec![part("U1", "MCU"), net("1", "/MISO", &[("U1", "12")])]);
        let sense = board(vec![part("U5", "ADC"), net("1", "/MISO", &[("U5", "6")])]);
        let main_sheets: SheetMap = [("U1", "main.kicad_sch")].into_iter().collect();
        let sense_sheets: SheetMap = [("U5", "sense.kicad_sch")].into_iter().collect();

        let mut system = MultiBoardGraph::new();
        system.add_board("main", main, &main_sheets, &[]);
        system.add_board("sense", sense, &sense_sheets, &[]);

        assert!(system.get_cross_board_connections().is_empty());
        assert_eq!(system.link_candidates().len(), 1);
        assert!(!system.link_candidates()[0].linked);
        assert_eq!(system.boards_with_net("/MISO"), vec!["main", "sense"]);
        assert_eq!(system.trace_cross_board("U1", "U5", None, None), None);
    }

    #[test]
    fn test_ignored_components_stay_on_board() {
        let main = board(vec![
            part("U1", "MCU"),
            part("J9", "Debug"),
            net("1", "/SWDIO", &[("U1", "30"), ("J9", "2")]),
        ]);
        let mut system = MultiBoardGraph::new();
        system.add_board("main", main, &SheetMap::new(), &["J9".to_string()]);

        assert!(system.component("main:J9").is_none());
        assert!(system.board("main").unwrap().contains_component("J9"));
        assert_eq!(system.components_on("main:/SWDIO"), vec!["main:U1"]);
        assert!(system.ignored("main").unwrap().contains("J9"));
        assert!(system.ignored("sense").is_none());
    }

    #[test]
    fn test_adding_board_twice_is_noop() {
        let mut system = mated_system();
        let nodes = system.node_count();
        let again = board(vec![part("X1", "Crystal")]);
        assert!(!system.add_board("main", again, &SheetMap::new(), &[]));
        assert_eq!(system.node_count(), nodes);
    }

    #[test]
    fn test_cross_board_trace() {
        let system = mated_system();
        let path = system.trace_cross_board("U1", "U5", None, None).unwrap();
        assert_eq!(path.first().map(String::as_str), Some("main:U1"));
        assert_eq!(path.last().map(String::as_str), Some("sense:U5"));
        assert!(path.len() >= 4);
        assert_eq!(system.trace_cross_board("U1", "U5", Some("sense"), None), None);
    }

    #[test]
    fn test_unified_queries() {
        let system = mated_system();
        assert_eq!(system.nets_of("main:J1"), vec!["main:/MISO", "main:GND"]);
        let reach = system.connected_within("main:U1", 4);
        assert!(reach.contains("sense:J2"));
        assert!(!system.connected_within("main:U1", 2).contains("sense:J2"));
        assert_eq!(
            system.find_signal_sources("/MISO"),
            vec![("main".to_string(), "U1".to_string()), ("sense".to_string(), "U5".to_string())]
        );
    }

    #[test]
    fn test_overview() {
        let text = mated_system().overview_text();
        assert!(text.contains("- **main**: 3 components, 2 nets"));
        assert!(text.contains("## Cross-Board Connections (2 shared nets)"));
        assert!(text.contains("### Power\n- **GND**: main <-> sense"));
        assert!(text.contains("### Signals\n- **/MISO**: main <-> sense"));
    }
}
