//! Circuit graph of a single board
//!
//! - [`circuit`] builds the bipartite component/net multigraph from a [`Netlist`](crate::netlist::Netlist)
//! - [`classify`] holds the pure name-based classifications
//! - [`query`] implements the read-only queries and statistics
//! - [`overview`] renders the markdown board overview

pub mod circuit;
pub mod classify;
pub mod overview;
pub mod query;

pub use circuit::{CircuitGraph, CircuitNode, ComponentNode, NetNode, PinEdge, PinLink};
pub use classify::{component_category, is_power_net, ComponentCategory};
pub use query::{CircuitStatistics, NetDetails};
