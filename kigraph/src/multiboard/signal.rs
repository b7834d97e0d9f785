//! Signal-flow ordering across boards.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use indexmap::IndexMap;
use petgraph::algo::dijkstra;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{MultiBoardGraph, SystemComponent, BOARD_SEPARATOR};
use crate::graph::ComponentCategory;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalStep {
    Component {
        id: String,
        board: String,
        reference: String,
        /// Hops from the start component; `None` when unreachable.
        distance: Option<usize>,
    },
    /// Marker between consecutive components on different boards.
    BoardTransition { net: String, from: String, to: String },
}

impl SignalStep {
    pub fn label(&self) -> &str {
        match self {
            SignalStep::Component { id, .. } => id,
            SignalStep::BoardTransition { net, .. } => net,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalPath {
    pub net: String,
    pub start: String,
    pub steps: Vec<SignalStep>,
}

impl SignalPath {
    /// Flat sequence of component ids with the net name at board changes.
    pub fn labels(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.label().to_string()).collect()
    }

    pub fn component_ids(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter_map(|s| match s {
                SignalStep::Component { id, .. } => Some(id.as_str()),
                SignalStep::BoardTransition { .. } => None,
            })
            .collect()
    }

    pub fn boards(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.steps
            .iter()
            .filter_map(|s| match s {
                SignalStep::Component { board, .. } => Some(board.as_str()),
                SignalStep::BoardTransition { .. } => None,
            })
            .filter(|b| seen.insert(*b))
            .collect()
    }
}

impl MultiBoardGraph {
    /// Order every component on any instance of `net_name` by signal flow.
    ///
    /// `start` may be `board:ref` or a bare reference. Without a usable
    /// start the first IC is used, then the first non-connector, then the
    /// first component. Returns `None` only when no component touches the
    /// net; disconnected components are placed last.
    pub fn trace_signal_path(&self, net_name: &str, start: Option<&str>) -> Option<SignalPath> {
        let mut seen = HashSet::new();
        let members: Vec<&SystemComponent> = self
            .net_instances(net_name)
            .into_iter()
            .flat_map(|idx| self.net_members(idx))
            .filter(|c| seen.insert(c.id.clone()))
            .collect();

        if members.is_empty() {
            return None;
        }

        let origin = start
            .and_then(|wanted| find_start(&members, wanted))
            .unwrap_or_else(|| default_start(&members));
        let origin_idx = *self.component_indices.get(&origin.id)?;
        debug!("Tracing {} from {}", net_name, origin.id);

        let distances = dijkstra(&self.graph, origin_idx, None, |_| 1usize);
        let distance_of = |c: &SystemComponent| -> Option<usize> {
            self.component_indices
                .get(&c.id)
                .and_then(|idx| distances.get(idx).copied())
        };

        let mut board_rank: IndexMap<&str, usize> = IndexMap::new();
        for c in &members {
            let next = board_rank.len();
            board_rank.entry(c.board.as_str()).or_insert(next);
        }

        // distance bucket (unreachable last) -> board rank -> members
        let mut buckets: BTreeMap<usize, BTreeMap<usize, Vec<&SystemComponent>>> = BTreeMap::new();
        for &c in &members {
            let distance = distance_of(c).unwrap_or(usize::MAX);
            let rank = board_rank[c.board.as_str()];
            buckets
                .entry(distance)
                .or_default()
                .entry(rank)
                .or_default()
                .push(c);
        }

        let mut placed_sheets: BTreeSet<&str> = BTreeSet::new();
        let mut ordered: Vec<&SystemComponent> = Vec::with_capacity(members.len());
        for boards in buckets.into_values() {
            for mut group in boards.into_values() {
                group.sort_by(|a, b| {
                    tie_break(a, &placed_sheets).cmp(&tie_break(b, &placed_sheets))
                });
                placed_sheets.extend(group.iter().copied().filter_map(|c| c.sheet.as_deref()));
                ordered.extend(group);
            }
        }

        let mut steps = Vec::with_capacity(ordered.len() * 2);
        let mut previous: Option<&str> = None;
        for c in ordered {
            if let Some(prev) = previous.filter(|prev| *prev != c.board) {
                steps.push(SignalStep::BoardTransition {
                    net: net_name.to_string(),
                    from: prev.to_string(),
                    to: c.board.clone(),
                });
            }
            steps.push(SignalStep::Component {
                id: c.id.clone(),
                board: c.board.clone(),
                reference: c.reference.clone(),
                distance: distance_of(c),
            });
            previous = Some(c.board.as_str());
        }

        Some(SignalPath {
            net: net_name.to_string(),
            start: origin.id.clone(),
            steps,
        })
    }
}

/// Sheet shared with an already placed component first, then sheet file
/// name (unknown last), then reference.
fn tie_break<'a>(
    c: &'a SystemComponent,
    placed: &BTreeSet<&str>,
) -> (bool, bool, &'a str, &'a str) {
    let sheet = c.sheet.as_deref();
    let shares = sheet.map_or(false, |s| placed.contains(s));
    (!shares, sheet.is_none(), sheet.unwrap_or(""), c.reference.as_str())
}

fn find_start<'a>(members: &[&'a SystemComponent], wanted: &str) -> Option<&'a SystemComponent> {
    let qualified = wanted.contains(BOARD_SEPARATOR);
    members
        .iter()
        .copied()
        .find(|c| if qualified { c.id == wanted } else { c.reference == wanted })
}

fn default_start<'a>(members: &[&'a SystemComponent]) -> &'a SystemComponent {
    let mut candidates = members.iter().copied();
    candidates
        .clone()
        .find(|c| c.category == ComponentCategory::ICs)
        .or_else(|| candidates.find(|c| c.category != ComponentCategory::Connectors))
        .unwrap_or(members[0])
}
