//! Netlist model extraction
//!
//! Turns the positional records produced by the netlist reader into a
//! normalized [`Netlist`]: components keyed by reference designator and nets
//! keyed by name. Extraction is best effort; malformed records are skipped
//! and never abort the load.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::parser::records::{Field, NetRecord, PartRecord, Record};

/// Reference prefix of power-flag symbols. They carry no physical part and
/// never enter the model.
pub const POWER_SYMBOL_PREFIX: &str = "#PWR";

pub fn is_power_symbol(reference: &str) -> bool {
    reference.starts_with(POWER_SYMBOL_PREFIX)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub reference: String,
    pub value: String,
    pub footprint: String,
    pub datasheet: String,
    pub description: String,
    /// Extra named fields in source order (MPN, Manufacturer, ...).
    pub fields: IndexMap<String, String>,
    /// pin number -> pin name
    pub pins: IndexMap<String, String>,
}

impl Component {
    pub fn new(reference: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            value: value.into(),
            footprint: String::new(),
            datasheet: String::new(),
            description: String::new(),
            fields: IndexMap::new(),
            pins: IndexMap::new(),
        }
    }
}

/// One pin landing on a net. Orders by (reference, pin number, pin name).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub reference: String,
    pub pin_number: String,
    pub pin_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Net {
    pub name: String,
    pub code: String,
    pub connections: Vec<Connection>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Netlist {
    pub components: IndexMap<String, Component>,
    pub nets: IndexMap<String, Net>,
}

impl Netlist {
    /// Build a netlist from raw records.
    ///
    /// All part-records are processed before any net-record so pin names can
    /// be attached to components regardless of record interleaving.
    pub fn extract(records: &[Record]) -> Self {
        let mut netlist = Netlist::default();

        for record in records {
            if let Record::Part(part) = record {
                netlist.add_part(part);
            }
        }

        for record in records {
            if let Record::Net(net) = record {
                netlist.add_net(net);
            }
        }

        debug!(
            "Extracted netlist: {} components, {} nets",
            netlist.components.len(),
            netlist.nets.len()
        );
        netlist
    }

    pub fn component(&self, reference: &str) -> Option<&Component> {
        self.components.get(reference)
    }

    pub fn net(&self, name: &str) -> Option<&Net> {
        self.nets.get(name)
    }

    /// Total number of pin connections over all nets.
    pub fn connection_count(&self) -> usize {
        self.nets.values().map(|n| n.connections.len()).sum()
    }

    fn add_part(&mut self, part: &PartRecord) {
        let fields = &part.fields;
        if fields.len() < 3 {
            debug!("Skipping part record with {} fields", fields.len());
            return;
        }

        let reference = text_at(fields, 0);
        if reference.is_empty() || is_power_symbol(&reference) {
            return;
        }

        let mut component = Component::new(reference.clone(), text_at(fields, 1));
        component.footprint = text_at(fields, 2);
        component.datasheet = text_at(fields, 3);

        for extra in fields.iter().skip(4) {
            let Some([name, value, ..]) = extra.as_list() else {
                continue;
            };
            let (Some(name), Some(value)) = (name.as_text(), value.as_text()) else {
                continue;
            };
            if name.eq_ignore_ascii_case("description") {
                component.description = value.to_string();
            }
            component.fields.insert(name.to_string(), value.to_string());
        }

        self.components.insert(reference, component);
    }

    fn add_net(&mut self, record: &NetRecord) {
        let fields = &record.fields;
        if fields.len() < 4 {
            debug!("Skipping net record with {} fields", fields.len());
            return;
        }

        let code = text_at(fields, 0);
        let name = match fields[1].as_text() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("Net_{}", code),
        };

        let mut net = Net {
            name: name.clone(),
            code,
            connections: Vec::new(),
        };

        for conn in fields[3].as_list().unwrap_or_default() {
            let Some(conn) = conn.as_list() else {
                continue;
            };
            let (Some(reference), Some(pin_number)) = (
                conn.first().and_then(Field::as_text),
                conn.get(1).and_then(Field::as_text),
            ) else {
                continue;
            };
            let pin_name = conn
                .get(2)
                .and_then(Field::as_text)
                .filter(|name| !name.is_empty())
                .unwrap_or(pin_number);

            // first writer wins for a given pin number
            if let Some(component) = self.components.get_mut(reference) {
                component
                    .pins
                    .entry(pin_number.to_string())
                    .or_insert_with(|| pin_name.to_string());
            }

            net.connections.push(Connection {
                reference: reference.to_string(),
                pin_number: pin_number.to_string(),
                pin_name: pin_name.to_string(),
            });
        }

        if net.connections.is_empty() {
            debug!("Dropping net '{}' with no connections", name);
            return;
        }

        self.nets.insert(name, net);
    }
}

fn text_at(fields: &[Field], index: usize) -> String {
    fields
        .get(index)
        .and_then(Field::as_text)
        .unwrap_or_default()
        .to_string()
}
