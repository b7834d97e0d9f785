//! kigraph CLI - query KiCad netlists and multi-board systems from the command line.

use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use kigraph::{
    BoardConfig, CircuitGraph, ComponentCategory, Config, LoadContext, MultiBoardGraph,
    SignalStep, SystemConfig,
};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kigraph")]
#[command(about = "Graph queries over KiCad netlists and multi-board systems", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: KIGRAPH_CONFIG, .kigraph.yaml, ~/.config/kigraph/config.yaml)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "human")]
    format: OutputFormat,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize one board
    Overview {
        /// Configured board name, or path to a .net / .kicad_sch file
        #[arg(value_name = "BOARD")]
        source: String,
    },

    /// List components, optionally of one category
    Components {
        #[arg(value_name = "BOARD")]
        source: String,

        /// Category label, e.g. ICs, Resistors, "Test Points"
        #[arg(long)]
        category: Option<String>,
    },

    /// List nets
    Nets {
        #[arg(value_name = "BOARD")]
        source: String,

        /// Only power nets
        #[arg(long)]
        power: bool,
    },

    /// Show one component and the nets it touches
    Component {
        #[arg(value_name = "BOARD")]
        source: String,
        reference: String,
    },

    /// Show one net and its connections
    Net {
        #[arg(value_name = "BOARD")]
        source: String,
        name: String,
    },

    /// Shortest path between two components
    Trace {
        #[arg(value_name = "BOARD")]
        source: String,
        from: String,
        to: String,
    },

    /// Components within a number of hops
    Connected {
        #[arg(value_name = "BOARD")]
        source: String,
        reference: String,

        #[arg(long, default_value_t = 2)]
        hops: usize,
    },

    /// Net and pin name of a component pin
    Pin {
        #[arg(value_name = "BOARD")]
        source: String,
        reference: String,
        pin: String,
    },

    /// List configured boards
    Boards,

    /// List configured systems
    Systems,

    /// Summarize a multi-board system
    System {
        name: String,

        /// Bypass in-memory and on-disk caches
        #[arg(long)]
        force: bool,
    },

    /// Order the components on a net by signal flow across boards
    Signal {
        system: String,
        net: String,

        /// Start component, as board:ref or ref
        #[arg(long)]
        start: Option<String>,
    },

    /// Nets linked across boards
    CrossBoard {
        system: String,

        /// Show every same-name comparison with its shared-sheet evidence
        #[arg(long)]
        candidates: bool,
    },

    /// Shortest path between components anywhere in a system
    SystemTrace {
        system: String,
        from: String,
        to: String,

        #[arg(long)]
        from_board: Option<String>,

        #[arg(long)]
        to_board: Option<String>,
    },

    /// Components that can drive a net (ICs, switches, other)
    Sources { system: String, net: String },

    /// Add or replace a board in the config
    AddBoard {
        name: String,
        path: PathBuf,

        #[arg(long, default_value = "")]
        description: String,

        /// Reference to leave out of systems (repeatable)
        #[arg(long)]
        ignore: Vec<String>,
    },

    /// Remove a board from the config
    RemoveBoard { name: String },

    /// Add or replace a system in the config
    AddSystem {
        name: String,

        #[arg(required = true)]
        boards: Vec<String>,

        #[arg(long, default_value = "")]
        description: String,
    },

    /// Remove a system from the config
    RemoveSystem { name: String },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit_code = match run(cli) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(explicit: Option<PathBuf>) -> Result<Config> {
    match explicit {
        Some(path) => {
            if !path.exists() {
                bail!("Config file {} does not exist", path.display());
            }
            Ok(Config::load(path)?)
        }
        None => Ok(Config::discover()?),
    }
}

fn run(cli: Cli) -> Result<()> {
    let format = cli.format;
    let config = load_config(cli.config)?;
    debug!("Config path {}", config.path().display());
    let mut ctx = LoadContext::new(config);

    match cli.command {
        Commands::Overview { source } => {
            let circuit = &ctx.load_source(&source)?.circuit;
            emit(format, &circuit.statistics(), || circuit.overview_text())
        }
        Commands::Components { source, category } => {
            let category = category
                .map(|label| {
                    ComponentCategory::from_label(&label)
                        .with_context(|| format!("Unknown category '{}'", label))
                })
                .transpose()?;
            let circuit = &ctx.load_source(&source)?.circuit;
            let components = circuit.list_components(category);
            emit(format, &components, || {
                components
                    .iter()
                    .map(|c| format!("{}\t{}\t{}", c.reference, c.value, c.category))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        Commands::Nets { source, power } => {
            let circuit = &ctx.load_source(&source)?.circuit;
            let nets = circuit.list_nets(power);
            emit(format, &nets, || {
                nets.iter()
                    .map(|n| format!("{}\t{} connections", n.name, n.connection_count))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        Commands::Component { source, reference } => {
            let circuit = &ctx.load_source(&source)?.circuit;
            show_component(format, circuit, &reference)
        }
        Commands::Net { source, name } => {
            let circuit = &ctx.load_source(&source)?.circuit;
            let details = circuit
                .get_net_details(&name)
                .with_context(|| format!("Net '{}' not found", name))?;
            emit(format, &details, || {
                let mut lines = vec![format!(
                    "{} (code {}){}: {} connections",
                    details.name,
                    details.code,
                    if details.is_power { " [power]" } else { "" },
                    details.num_connections
                )];
                lines.extend(details.components.iter().map(|c| {
                    format!("  {}:{} ({})", c.reference, c.pin_number, c.pin_name)
                }));
                lines.join("\n")
            })
        }
        Commands::Trace { source, from, to } => {
            let circuit = &ctx.load_source(&source)?.circuit;
            let path = circuit
                .shortest_path(&from, &to)
                .with_context(|| format!("No path between {} and {}", from, to))?;
            emit(format, &path, || path.join(" -> "))
        }
        Commands::Connected {
            source,
            reference,
            hops,
        } => {
            let circuit = &ctx.load_source(&source)?.circuit;
            if circuit.get_component(&reference).is_none() {
                bail!("Component '{}' not found", reference);
            }
            let found = circuit.connected_within(&reference, hops);
            emit(format, &found, || {
                found.iter().cloned().collect::<Vec<_>>().join("\n")
            })
        }
        Commands::Pin {
            source,
            reference,
            pin,
        } => {
            let circuit = &ctx.load_source(&source)?.circuit;
            let net = circuit
                .pin_net(&reference, &pin)
                .with_context(|| format!("Pin {}:{} is not connected", reference, pin))?;
            let pin_name = circuit.pin_name(&reference, &pin).unwrap_or(&pin);
            let report = PinReport {
                reference: &reference,
                pin: &pin,
                pin_name,
                net,
            };
            emit(format, &report, || {
                format!("{}:{} ({}) -> {}", reference, pin, pin_name, net)
            })
        }
        Commands::Boards => {
            let boards = ctx.config().list_boards();
            emit(format, &boards, || boards.join("\n"))
        }
        Commands::Systems => {
            let systems = ctx.config().list_systems();
            emit(format, &systems, || systems.join("\n"))
        }
        Commands::System { name, force } => {
            let system = ctx.load_system(&name, force)?;
            emit(format, &system.summary(), || system.overview_text())
        }
        Commands::Signal { system, net, start } => {
            let system = ctx.load_system(&system, false)?;
            let path = system
                .trace_signal_path(&net, start.as_deref())
                .with_context(|| format!("Net '{}' has no components in this system", net))?;
            emit(format, &path, || {
                path.steps
                    .iter()
                    .map(|step| match step {
                        SignalStep::Component { id, distance, .. } => match distance {
                            Some(d) => format!("{} (distance {})", id, d),
                            None => format!("{} (unreachable)", id),
                        },
                        SignalStep::BoardTransition { net, from, to } => {
                            format!("  --- {} : {} -> {} ---", net, from, to)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        Commands::CrossBoard { system, candidates } => {
            let system = ctx.load_system(&system, false)?;
            if candidates {
                show_candidates(format, &system)
            } else {
                let shared = system.get_cross_board_connections();
                emit(format, &shared, || {
                    shared
                        .iter()
                        .map(|(net, boards)| format!("{}: {}", net, boards.join(", ")))
                        .collect::<Vec<_>>()
                        .join("\n")
                })
            }
        }
        Commands::SystemTrace {
            system,
            from,
            to,
            from_board,
            to_board,
        } => {
            let system = ctx.load_system(&system, false)?;
            let path = system
                .trace_cross_board(&from, &to, from_board.as_deref(), to_board.as_deref())
                .with_context(|| format!("No path between {} and {}", from, to))?;
            emit(format, &path, || path.join(" -> "))
        }
        Commands::Sources { system, net } => {
            let system = ctx.load_system(&system, false)?;
            let sources = system.find_signal_sources(&net);
            emit(format, &sources, || {
                sources
                    .iter()
                    .map(|(board, reference)| format!("{}:{}", board, reference))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        Commands::AddBoard {
            name,
            path,
            description,
            ignore,
        } => {
            let mut board = BoardConfig::new(path, description);
            board.ignore = ignore;
            ctx.config_mut().add_board(&name, board)?;
            println!("Added board '{}'", name);
            Ok(())
        }
        Commands::RemoveBoard { name } => {
            if !ctx.config_mut().remove_board(&name)? {
                bail!("Board '{}' not found", name);
            }
            println!("Removed board '{}'", name);
            Ok(())
        }
        Commands::AddSystem {
            name,
            boards,
            description,
        } => {
            ctx.config_mut()
                .add_system(&name, SystemConfig { boards, description })?;
            println!("Added system '{}'", name);
            Ok(())
        }
        Commands::RemoveSystem { name } => {
            if !ctx.config_mut().remove_system(&name)? {
                bail!("System '{}' not found", name);
            }
            println!("Removed system '{}'", name);
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct PinReport<'a> {
    reference: &'a str,
    pin: &'a str,
    pin_name: &'a str,
    net: &'a str,
}

/// Print `value` as JSON, or the human rendering.
fn emit<T: Serialize + ?Sized>(
    format: OutputFormat,
    value: &T,
    human: impl FnOnce() -> String,
) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Human => {
            let text = human();
            if !text.is_empty() {
                println!("{}", text);
            }
        }
    }
    Ok(())
}

fn show_component(format: OutputFormat, circuit: &CircuitGraph, reference: &str) -> Result<()> {
    let component = circuit
        .get_component(reference)
        .with_context(|| format!("Component '{}' not found", reference))?;
    let nets = circuit.nets_of(reference);

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "component": component,
                "nets": nets,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Human => {
            println!("{}: {} [{}]", component.reference, component.value, component.category);
            if !component.footprint.is_empty() {
                println!("  Footprint: {}", component.footprint);
            }
            for (name, value) in &component.fields {
                println!("  {}: {}", name, value);
            }
            println!("  Nets: {}", nets.join(", "));
            for (number, name) in &component.pins {
                let net = circuit.pin_net(reference, number).unwrap_or("-");
                println!("    pin {} ({}): {}", number, name, net);
            }
        }
    }
    Ok(())
}

fn show_candidates(format: OutputFormat, system: &MultiBoardGraph) -> Result<()> {
    let candidates = system.link_candidates();
    emit(format, candidates, || {
        candidates
            .iter()
            .map(|c| {
                let evidence = if c.shared_sheets.is_empty() {
                    "no shared sheet".to_string()
                } else {
                    c.shared_sheets.join(", ")
                };
                format!(
                    "{} {}: {} <-> {} ({})",
                    if c.linked { "linked " } else { "skipped" },
                    c.net,
                    c.other_board,
                    c.board,
                    evidence
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    })
}
