//! Pure classification of components and nets by name.
//!
//! Both functions depend only on their input string; nodes copy the result
//! at build time and nothing caches it globally.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ComponentCategory {
    Resistors,
    Capacitors,
    Inductors,
    Diodes,
    Transistors,
    ICs,
    Connectors,
    Crystals,
    Switches,
    #[serde(rename = "Test Points")]
    TestPoints,
    LEDs,
    #[serde(rename = "Ferrite Beads")]
    FerriteBeads,
    Fuses,
    Transformers,
    Batteries,
    Power,
    Other,
}

impl ComponentCategory {
    pub fn label(&self) -> &'static str {
        match self {
            ComponentCategory::Resistors => "Resistors",
            ComponentCategory::Capacitors => "Capacitors",
            ComponentCategory::Inductors => "Inductors",
            ComponentCategory::Diodes => "Diodes",
            ComponentCategory::Transistors => "Transistors",
            ComponentCategory::ICs => "ICs",
            ComponentCategory::Connectors => "Connectors",
            ComponentCategory::Crystals => "Crystals",
            ComponentCategory::Switches => "Switches",
            ComponentCategory::TestPoints => "Test Points",
            ComponentCategory::LEDs => "LEDs",
            ComponentCategory::FerriteBeads => "Ferrite Beads",
            ComponentCategory::Fuses => "Fuses",
            ComponentCategory::Transformers => "Transformers",
            ComponentCategory::Batteries => "Batteries",
            ComponentCategory::Power => "Power",
            ComponentCategory::Other => "Other",
        }
    }

    /// Parse a category label, case-insensitively ("ics", "Test Points", ...).
    pub fn from_label(label: &str) -> Option<Self> {
        ALL_CATEGORIES
            .iter()
            .copied()
            .find(|c| c.label().eq_ignore_ascii_case(label.trim()))
    }
}

impl fmt::Display for ComponentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

const ALL_CATEGORIES: [ComponentCategory; 17] = [
    ComponentCategory::Resistors,
    ComponentCategory::Capacitors,
    ComponentCategory::Inductors,
    ComponentCategory::Diodes,
    ComponentCategory::Transistors,
    ComponentCategory::ICs,
    ComponentCategory::Connectors,
    ComponentCategory::Crystals,
    ComponentCategory::Switches,
    ComponentCategory::TestPoints,
    ComponentCategory::LEDs,
    ComponentCategory::FerriteBeads,
    ComponentCategory::Fuses,
    ComponentCategory::Transformers,
    ComponentCategory::Batteries,
    ComponentCategory::Power,
    ComponentCategory::Other,
];

/// Reference-designator prefix table.
const PREFIX_CATEGORIES: &[(&str, ComponentCategory)] = &[
    ("R", ComponentCategory::Resistors),
    ("C", ComponentCategory::Capacitors),
    ("L", ComponentCategory::Inductors),
    ("D", ComponentCategory::Diodes),
    ("Q", ComponentCategory::Transistors),
    ("U", ComponentCategory::ICs),
    ("IC", ComponentCategory::ICs),
    ("J", ComponentCategory::Connectors),
    ("P", ComponentCategory::Connectors),
    ("CN", ComponentCategory::Connectors),
    ("Y", ComponentCategory::Crystals),
    ("X", ComponentCategory::Crystals),
    ("SW", ComponentCategory::Switches),
    ("TP", ComponentCategory::TestPoints),
    ("LED", ComponentCategory::LEDs),
    ("FB", ComponentCategory::FerriteBeads),
    ("F", ComponentCategory::Fuses),
    ("T", ComponentCategory::Transformers),
    ("BT", ComponentCategory::Batteries),
];

/// Substrings that mark a net as a supply or ground rail.
const POWER_NET_TOKENS: &[&str] = &[
    "VCC", "VDD", "VSS", "GND", "DGND", "AGND", "PGND", "3.3V", "+3V", "5V", "+5V", "12V",
    "24V", "48V", "-12V", "-5V", "-3V", "-2.5V", "+2.5V", "+1.8V", "VBAT", "VBUS", "VIN",
    "VOUT", "AVDD", "AVSS", "DVDD",
];

/// Classify a component by the alphabetic prefix of its reference designator.
pub fn component_category(reference: &str) -> ComponentCategory {
    if reference.starts_with('#') {
        return ComponentCategory::Power;
    }

    let prefix: &str = reference
        .find(|c: char| !c.is_alphabetic())
        .map_or(reference, |end| &reference[..end]);

    if prefix.starts_with("IC") {
        return ComponentCategory::ICs;
    }

    PREFIX_CATEGORIES
        .iter()
        .find(|(p, _)| *p == prefix)
        .map_or(ComponentCategory::Other, |(_, category)| *category)
}

/// Case-insensitive substring match against the power-rail token list.
pub fn is_power_net(net_name: &str) -> bool {
    let upper = net_name.to_uppercase();
    POWER_NET_TOKENS.iter().any(|token| upper.contains(token))
}
