//! Loading boards and systems.
//! All process state (config, caches, exporter) lives in an explicit
//! [`LoadContext`]; the graph modules never touch the filesystem.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::cache::{CacheError, GraphCache};
use crate::config::{Config, ConfigError};
use crate::export::{ExportError, KicadCli, NetlistExporter};
use crate::graph::CircuitGraph;
use crate::hierarchy::{HierarchyError, SheetMap};
use crate::multiboard::MultiBoardGraph;
use crate::parser::records::{read_netlist, records_from_str, ReadError};

pub const NETLIST_EXTENSION: &str = "net";
pub const SCHEMATIC_EXTENSION: &str = "kicad_sch";

#[derive(Debug, thiserror::Error)]
pub enum KigraphError {
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("Export error: {0}")]
    Export(#[from] ExportError),
    #[error("{0} not found")]
    NotFound(String),
}

impl From<ReadError> for KigraphError {
    fn from(e: ReadError) -> Self {
        match e {
            ReadError::Io(io) => KigraphError::Io(io),
            other => KigraphError::Parse(other.to_string()),
        }
    }
}

impl From<HierarchyError> for KigraphError {
    fn from(e: HierarchyError) -> Self {
        match e {
            HierarchyError::Io { path, source } => KigraphError::Io(std::io::Error::new(
                source.kind(),
                format!("{}: {}", path.display(), source),
            )),
            parse @ HierarchyError::Parse { .. } => KigraphError::Parse(parse.to_string()),
        }
    }
}

/// A loaded board: its graph plus the sheet-of-origin map.
#[derive(Debug, Clone)]
pub struct LoadedBoard {
    pub name: String,
    pub source: PathBuf,
    pub circuit: CircuitGraph,
    pub sheets: SheetMap,
}

/// Where a board's data comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BoardSources {
    /// Cache key and mtime reference.
    source: PathBuf,
    netlist: Option<PathBuf>,
    schematic: Option<PathBuf>,
}

impl BoardSources {
    /// A `.net` path is read directly; anything else is treated as a
    /// schematic to export. The hierarchy falls back to a sibling
    /// `<stem>.kicad_sch` next to a netlist.
    fn infer(path: PathBuf, netlist: Option<PathBuf>, schematic: Option<PathBuf>) -> Self {
        let is_netlist = has_extension(&path, NETLIST_EXTENSION);
        let netlist = netlist.or_else(|| is_netlist.then(|| path.clone()));
        let schematic = schematic
            .or_else(|| (!is_netlist).then(|| path.clone()))
            .or_else(|| {
                let sibling = path.with_extension(SCHEMATIC_EXTENSION);
                sibling.exists().then_some(sibling)
            });
        Self {
            source: path,
            netlist,
            schematic,
        }
    }

    /// File the graph is built from: the configured netlist, else `source`.
    /// Cache entries are keyed and checked against this file.
    fn built_from(&self) -> &Path {
        self.netlist.as_deref().unwrap_or(&self.source)
    }
}

pub struct LoadContext {
    config: Config,
    cache: Option<GraphCache>,
    exporter: Option<Box<dyn NetlistExporter>>,
    boards: IndexMap<String, LoadedBoard>,
}

impl LoadContext {
    pub fn new(config: Config) -> Self {
        let cache = GraphCache::from_config(&config);
        Self {
            config,
            cache,
            exporter: None,
            boards: IndexMap::new(),
        }
    }

    /// Context for the discovered config.
    pub fn discover() -> Result<Self, KigraphError> {
        Ok(Self::new(Config::discover()?))
    }

    /// Use `exporter` instead of locating `kicad-cli` on first need.
    pub fn with_exporter(mut self, exporter: impl NetlistExporter + 'static) -> Self {
        self.exporter = Some(Box::new(exporter));
        self
    }

    pub fn with_cache(mut self, cache: Option<GraphCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Mutable config access. Loaded boards are kept; call
    /// [`LoadContext::reload_config`] to drop them.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn reload_config(&mut self) -> Result<(), KigraphError> {
        self.config.reload()?;
        self.cache = GraphCache::from_config(&self.config);
        self.boards.clear();
        Ok(())
    }

    /// Boards currently held in memory.
    pub fn loaded(&self) -> impl Iterator<Item = &str> {
        self.boards.keys().map(String::as_str)
    }

    /// Load a configured board. `force` bypasses both the in-memory map and
    /// the on-disk cache.
    pub fn load_board(&mut self, name: &str, force: bool) -> Result<&LoadedBoard, KigraphError> {
        if force {
            self.boards.shift_remove(name);
        }
        if !self.boards.contains_key(name) {
            let board = self
                .config
                .board(name)
                .ok_or_else(|| KigraphError::NotFound(format!("Board '{}'", name)))?;
            let sources = BoardSources::infer(
                self.config.resolve(&board.path),
                board.netlist.as_deref().map(|p| self.config.resolve(p)),
                board.schematic.as_deref().map(|p| self.config.resolve(p)),
            );
            let loaded = self.read_board(name, sources, force)?;
            self.boards.insert(name.to_string(), loaded);
        }
        self.boards
            .get(name)
            .ok_or_else(|| KigraphError::NotFound(format!("Board '{}'", name)))
    }

    /// Load every board of a configured system, in configured order.
    /// Boards missing from the config are skipped with a warning.
    pub fn load_system(&mut self, name: &str, force: bool) -> Result<MultiBoardGraph, KigraphError> {
        let system = self
            .config
            .system(name)
            .cloned()
            .ok_or_else(|| KigraphError::NotFound(format!("System '{}'", name)))?;

        let mut multi = MultiBoardGraph::new();
        for board_name in &system.boards {
            if self.config.board(board_name).is_none() {
                warn!("Board '{}' of system '{}' is not configured, skipping", board_name, name);
                continue;
            }
            let ignore = self.config.ignore_list(board_name).to_vec();
            let board = self.load_board(board_name, force)?;
            multi.add_board(board_name, board.circuit.clone(), &board.sheets, &ignore);
        }

        if multi.is_empty() {
            return Err(KigraphError::NotFound(format!(
                "Boards for system '{}'",
                name
            )));
        }
        info!("Loaded system '{}' ({} nodes)", name, multi.node_count());
        Ok(multi)
    }

    /// Load by board name, or by path to a `.net` or schematic file.
    pub fn load_source(&mut self, source: &str) -> Result<&LoadedBoard, KigraphError> {
        if self.config.board(source).is_some() {
            return self.load_board(source, false);
        }

        if !self.boards.contains_key(source) {
            let path = PathBuf::from(source);
            if !path.exists() {
                return Err(KigraphError::NotFound(format!(
                    "Board or file '{}'",
                    source
                )));
            }
            let loaded = self.read_board(source, BoardSources::infer(path, None, None), false)?;
            self.boards.insert(source.to_string(), loaded);
        }
        self.boards
            .get(source)
            .ok_or_else(|| KigraphError::NotFound(format!("Board or file '{}'", source)))
    }

    fn read_board(
        &mut self,
        name: &str,
        sources: BoardSources,
        force: bool,
    ) -> Result<LoadedBoard, KigraphError> {
        debug!("Loading board '{}' from {}", name, sources.source.display());

        let cached = match (&self.cache, force) {
            (Some(cache), false) => cache.load(sources.built_from()),
            _ => None,
        };

        let circuit = match cached {
            Some(circuit) => {
                info!("Loaded '{}' from cache", name);
                circuit
            }
            None => {
                let records = match &sources.netlist {
                    Some(netlist) => read_netlist(netlist)?,
                    None => {
                        let schematic = sources
                            .schematic
                            .as_deref()
                            .unwrap_or(&sources.source)
                            .to_path_buf();
                        records_from_str(&self.exporter()?.export_to_string(&schematic)?)?
                    }
                };
                let mut circuit = CircuitGraph::from_records(&records);
                circuit.set_source(&sources.source);
                if let Some(cache) = &self.cache {
                    if let Err(e) = cache.store(sources.built_from(), &circuit) {
                        warn!("Could not cache '{}': {}", name, e);
                    }
                }
                circuit
            }
        };

        let sheets = match &sources.schematic {
            Some(schematic) => SheetMap::discover(schematic)?,
            None => SheetMap::new(),
        };

        info!(
            "Loaded board '{}': {} components, {} nets, {} mapped references",
            name,
            circuit.components().count(),
            circuit.nets().count(),
            sheets.len()
        );
        Ok(LoadedBoard {
            name: name.to_string(),
            source: sources.source,
            circuit,
            sheets,
        })
    }

    /// Configured `kicad_cli` path if set, otherwise the probed one.
    fn exporter(&mut self) -> Result<&dyn NetlistExporter, KigraphError> {
        if self.exporter.is_none() {
            let cli = KicadCli::resolve(self.config.kicad_cli().as_deref())?;
            debug!("Exporting with {}", cli.program().display());
            self.exporter = Some(Box::new(cli));
        }
        self.exporter
            .as_deref()
            .ok_or_else(|| KigraphError::NotFound("kicad-cli".to_string()))
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::cache_key;
    use crate::config::BoardConfig;
    use std::fs;
    use std::time::{Duration, SystemTime};

    const NETLIST: &str = r#"(export (version "E")
  (components
    (comp (ref "U1") (value "MCU") (footprint "QFN"))
    (comp (ref "R1") (value "10k")))
  (nets
    (net (code "1") (name "/SDA") (node (ref "U1") (pin "3")) (node (ref "R1") (pin "1")))))"#;

    struct FixedExporter(&'static str);

    impl NetlistExporter for FixedExporter {
        fn export(&self, _schematic: &Path, output: &Path) -> Result<(), ExportError> {
            Ok(fs::write(output, self.0)?)
        }
    }

    struct FailingExporter;

    impl NetlistExporter for FailingExporter {
        fn export(&self, _schematic: &Path, _output: &Path) -> Result<(), ExportError> {
            Err(ExportError::Failed("ERC errors".to_string()))
        }
    }

    fn context_with_board(dir: &Path, path: &str) -> LoadContext {
        let mut config = Config::empty(dir.join(".kigraph.yaml"));
        config.add_board("main", BoardConfig::new(path, "Main")).unwrap();
        LoadContext::new(config)
    }

    #[test]
    fn test_load_netlist_board_and_memoize() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.net"), NETLIST).unwrap();
        let mut ctx = context_with_board(dir.path(), "main.net").with_exporter(FailingExporter);

        let board = ctx.load_board("main", false).unwrap();
        assert!(board.circuit.contains_component("U1"));
        assert!(board.sheets.is_empty());
        assert_eq!(board.source, dir.path().join("main.net"));

        fs::remove_file(dir.path().join("main.net")).unwrap();
        assert!(ctx.load_board("main", false).is_ok());
        assert!(matches!(ctx.load_board("main", true), Err(KigraphError::Io(_))));
    }

    #[test]
    fn test_schematic_board_goes_through_exporter() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("main.kicad_sch"),
            r#"(kicad_sch (symbol (property "Reference" "U1")))"#,
        )
        .unwrap();

        let mut ctx = context_with_board(dir.path(), "main.kicad_sch").with_exporter(FixedExporter(NETLIST));
        let board = ctx.load_board("main", false).unwrap();
        assert_eq!(board.circuit.components().count(), 2);
        assert_eq!(board.sheets.sheet_of("U1"), Some("main.kicad_sch"));

        let mut failing = context_with_board(dir.path(), "main.kicad_sch").with_exporter(FailingExporter);
        assert!(matches!(
            failing.load_board("main", false),
            Err(KigraphError::Export(ExportError::Failed(_)))
        ));
    }

    #[test]
    fn test_disk_cache_is_used_until_forced() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("main.net");
        fs::write(&source, NETLIST).unwrap();
        let cache = GraphCache::new(dir.path().join("cache"), false);

        let mut first = context_with_board(dir.path(), "main.net").with_cache(Some(cache.clone()));
        first.load_board("main", false).unwrap();
        assert!(cache.entry_path(&source).exists());

        fs::write(&source, "(export (components) (nets))").unwrap();
        let mut second = context_with_board(dir.path(), "main.net").with_cache(Some(cache));
        assert!(second.load_board("main", false).unwrap().circuit.contains_component("U1"));
        assert!(!second.load_board("main", true).unwrap().circuit.contains_component("U1"));
    }

    #[test]
    fn test_cache_tracks_netlist_override() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.kicad_sch"), "(kicad_sch)").unwrap();
        let netlist = dir.path().join("main.net");
        fs::write(&netlist, NETLIST).unwrap();

        let mut board = BoardConfig::new("main.kicad_sch", "Main");
        board.netlist = Some(PathBuf::from("main.net"));
        let mut config = Config::empty(dir.path().join(".kigraph.yaml"));
        config.add_board("main", board).unwrap();
        let cache = GraphCache::new(dir.path().join("cache"), true);

        let mut first = LoadContext::new(config.clone())
            .with_cache(Some(cache.clone()))
            .with_exporter(FailingExporter);
        assert!(first.load_board("main", false).unwrap().circuit.contains_component("U1"));
        assert!(cache.entry_path(&netlist).exists());

        // re-exported after the entry was written
        fs::write(&netlist, NETLIST.replace("\"U1\"", "\"U2\"")).unwrap();
        fs::File::options()
            .write(true)
            .open(&netlist)
            .unwrap()
            .set_modified(SystemTime::now() + Duration::from_secs(60))
            .unwrap();

        let mut second = LoadContext::new(config)
            .with_cache(Some(cache))
            .with_exporter(FailingExporter);
        let board = second.load_board("main", false).unwrap();
        assert!(board.circuit.contains_component("U2"));
        assert!(!board.circuit.contains_component("U1"));
        assert_eq!(board.source, dir.path().join("main.kicad_sch"));
    }

    #[test]
    fn test_reload_config_drops_boards_and_rebuilds_cache() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.net"), NETLIST).unwrap();
        let config_path = dir.path().join(".kigraph.yaml");
        fs::write(&config_path, "boards:\n  main:\n    path: main.net\n").unwrap();

        let mut ctx = LoadContext::new(Config::load(&config_path).unwrap());
        ctx.load_board("main", false).unwrap();
        assert_eq!(ctx.loaded().collect::<Vec<_>>(), vec!["main"]);
        assert!(ctx.cache.is_none());

        fs::write(
            &config_path,
            "boards:\n  main:\n    path: main.net\ncache:\n  enabled: true\n  directory: graphs\n",
        )
        .unwrap();
        ctx.reload_config().unwrap();

        assert_eq!(ctx.loaded().count(), 0);
        assert_eq!(
            ctx.cache.as_ref().map(|c| c.directory().to_path_buf()),
            Some(dir.path().join("graphs"))
        );
        ctx.load_board("main", false).unwrap();
        assert!(dir.path().join("graphs").join(cache_key(&dir.path().join("main.net"))).exists());
    }

    #[test]
    fn test_configured_kicad_cli_is_used() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.kicad_sch"), "(kicad_sch)").unwrap();
        let config_path = dir.path().join(".kigraph.yaml");
        fs::write(
            &config_path,
            "boards:\n  main:\n    path: main.kicad_sch\nkicad_cli: bin/kicad-cli\n",
        )
        .unwrap();

        let mut ctx = LoadContext::new(Config::load(&config_path).unwrap());
        let expected = dir.path().join("bin/kicad-cli").display().to_string();
        assert!(matches!(
            ctx.load_board("main", false),
            Err(KigraphError::Export(ExportError::NotFound(tried))) if tried == expected
        ));
    }

    #[test]
    fn test_load_source_by_path_and_unknowns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loose.net");
        fs::write(&path, NETLIST).unwrap();
        let mut ctx = LoadContext::new(Config::empty(dir.path().join(".kigraph.yaml")));

        let source = path.to_string_lossy().into_owned();
        assert!(ctx.load_source(&source).unwrap().circuit.contains_net("/SDA"));
        assert!(matches!(ctx.load_source("nope"), Err(KigraphError::NotFound(_))));
        assert!(matches!(ctx.load_board("nope", false), Err(KigraphError::NotFound(_))));
        assert!(matches!(ctx.load_system("nope", false), Err(KigraphError::NotFound(_))));
    }

    #[test]
    fn test_board_sources_inference() {
        let dir = tempfile::tempdir().unwrap();
        let net = dir.path().join("a.net");
        fs::write(dir.path().join("a.kicad_sch"), "(kicad_sch)").unwrap();

        let inferred = BoardSources::infer(net.clone(), None, None);
        assert_eq!(inferred.netlist.as_ref(), Some(&net));
        assert_eq!(inferred.schematic, Some(dir.path().join("a.kicad_sch")));

        let sch = dir.path().join("b.kicad_sch");
        let inferred = BoardSources::infer(sch.clone(), None, None);
        assert_eq!(inferred.netlist, None);
        assert_eq!(inferred.schematic, Some(sch));
    }
}
