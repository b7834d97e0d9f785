//! kigraph - queryable graph models of KiCad netlists
//!
//! Turns a KiCad netlist into a bipartite component/net graph, answers
//! connectivity queries over it, and composes several boards into one
//! system graph so a signal can be followed from one board to another.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//!
//! let circuit = kigraph::load_netlist(Path::new("board.net")).unwrap();
//! println!("{}", circuit.overview_text());
//!
//! if let Some(path) = circuit.shortest_path("U1", "J3") {
//!     println!("{}", path.join(" -> "));
//! }
//! ```
//!
//! Multi-board systems are described in a `.kigraph.yaml` and loaded through
//! a [`LoadContext`]:
//!
//! ```no_run
//! use kigraph::LoadContext;
//!
//! let mut ctx = LoadContext::discover().unwrap();
//! let system = ctx.load_system("full", false).unwrap();
//! if let Some(path) = system.trace_signal_path("/MISO", None) {
//!     println!("{}", path.labels().join(" -> "));
//! }
//! ```

pub mod cache;
pub mod config;
pub mod core;
pub mod export;
pub mod graph;
pub mod hierarchy;
pub mod multiboard;
pub mod netlist;
pub mod parser;

pub use cache::{cache_key, CacheError, GraphCache};
pub use config::{BoardConfig, CacheConfig, Config, ConfigError, SystemConfig};
pub use crate::core::{KigraphError, LoadContext, LoadedBoard};
pub use export::{ExportError, KicadCli, NetlistExporter};
pub use graph::{
    CircuitGraph, CircuitNode, CircuitStatistics, ComponentCategory, ComponentNode, NetDetails,
    NetNode, PinEdge,
};
pub use hierarchy::{HierarchyError, SheetMap};
pub use multiboard::{LinkCandidate, MultiBoardGraph, SignalPath, SignalStep, SystemSummary};
pub use netlist::{Component, Connection, Net, Netlist};
pub use parser::records::{Field, NetRecord, PartRecord, ReadError, Record};

/// Read a `.net` file and build its graph.
pub fn load_netlist(path: &std::path::Path) -> Result<CircuitGraph, KigraphError> {
    let records = parser::read_netlist(path)?;
    let mut circuit = CircuitGraph::from_records(&records);
    circuit.set_source(path);
    Ok(circuit)
}

/// Build a graph from netlist text.
pub fn parse_netlist(content: &str) -> Result<CircuitGraph, KigraphError> {
    let records = parser::records_from_str(content)?;
    Ok(CircuitGraph::from_records(&records))
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        CircuitGraph, ComponentCategory, KigraphError, LoadContext, MultiBoardGraph, SheetMap,
        SignalPath,
    };
}
