//! Markdown overview of one board.

use std::fmt::Write;

use super::circuit::CircuitGraph;
use super::classify::ComponentCategory;

const LARGEST_NETS_SHOWN: usize = 5;
const MEMBERS_PER_NET: usize = 3;
const LIST_LIMIT: usize = 10;

impl CircuitGraph {
    pub fn overview_text(&self) -> String {
        let stats = self.statistics();
        let mut out = String::new();

        let _ = writeln!(out, "# Circuit Overview\n");
        let _ = writeln!(out, "**Components:** {}", stats.total_components);
        let _ = writeln!(out, "**Nets:** {}", stats.total_nets);
        let _ = writeln!(out, "**Connections:** {}", stats.total_connections);
        let _ = writeln!(out, "\n## Component Categories:");
        for (category, count) in &stats.component_categories {
            let _ = writeln!(out, "- {}: {}", category, count);
        }

        if !stats.largest_nets.is_empty() {
            let _ = writeln!(out, "\n## Largest Nets (by connections):");
            for (name, count) in stats.largest_nets.iter().take(LARGEST_NETS_SHOWN) {
                let members = self.components_on(name);
                let mut line = members
                    .iter()
                    .take(MEMBERS_PER_NET)
                    .map(|c| format!("{}:{}", c.reference, c.pin_number))
                    .collect::<Vec<_>>()
                    .join(", ");
                if members.len() > MEMBERS_PER_NET {
                    let _ = write!(line, ", ... ({} total)", count);
                }
                let _ = writeln!(out, "- **{}**: {}", name, line);
            }
        }

        if !stats.power_nets.is_empty() {
            let _ = writeln!(out, "\n## Power Nets:");
            let mut power_nets = stats.power_nets.clone();
            power_nets.sort();
            for name in power_nets.iter().take(LIST_LIMIT) {
                if let Some(net) = self.get_net(name) {
                    let _ = writeln!(out, "- **{}**: {} connections", name, net.connection_count);
                }
            }
        }

        let mut ics = self.list_components(Some(ComponentCategory::ICs));
        if !ics.is_empty() {
            ics.sort_by(|a, b| a.reference.cmp(&b.reference));
            let _ = writeln!(out, "\n## Main ICs:");
            for ic in ics.iter().take(LIST_LIMIT) {
                let _ = writeln!(out, "- **{}**: {}", ic.reference, ic.value);
                let nets = self.nets_of(&ic.reference);
                if !nets.is_empty() {
                    let shown: Vec<&str> = nets.iter().take(5).map(String::as_str).collect();
                    let _ = writeln!(out, "  Nets: {}", shown.join(", "));
                }
            }
        }

        let mut connectors = self.list_components(Some(ComponentCategory::Connectors));
        if !connectors.is_empty() {
            connectors.sort_by(|a, b| a.reference.cmp(&b.reference));
            let _ = writeln!(out, "\n## Connectors:");
            for connector in connectors.iter().take(LIST_LIMIT) {
                let _ = writeln!(
                    out,
                    "- **{}**: {} ({} pins)",
                    connector.reference,
                    connector.value,
                    connector.pins.len()
                );
            }
        }

        if !stats.floating_components.is_empty() {
            let _ = writeln!(out, "\n## Warning: Floating Components:");
            for reference in stats.floating_components.iter().take(LIST_LIMIT) {
                let value = self
                    .get_component(reference)
                    .map(|c| c.value.as_str())
                    .unwrap_or("");
                let _ = writeln!(out, "- {} ({})", reference, value);
            }
        }

        out.trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_support::{chain_records, sample_records};

    #[test]
    fn test_overview_sections() {
        let text = CircuitGraph::from_records(&sample_records()).overview_text();
        assert!(text.starts_with("# Circuit Overview"));
        assert!(text.contains("**Components:** 2"));
        assert!(text.contains("- ICs: 1"));
        assert!(text.contains("- **VCC**: C1:1, U1:1, U1:24"));
        assert!(text.contains("## Power Nets:"));
        assert!(text.contains("- **U1**: STM32F411"));
        assert!(text.contains("  Nets: GND, VCC"));
        assert!(!text.contains("Floating"));
    }

    #[test]
    fn test_overview_flags_floating_parts() {
        let text = CircuitGraph::from_records(&chain_records()).overview_text();
        assert!(text.contains("## Warning: Floating Components:"));
        assert!(text.contains("- TP1 (TestPoint)"));
        assert!(text.contains("- **J1**: Conn_01x02 (1 pins)"));
    }
}
