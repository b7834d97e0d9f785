//! Project configuration
//!
//! A YAML file naming boards, the systems built from them and the graph
//! cache settings:
//!
//! ```yaml
//! boards:
//!   main:
//!     path: boards/main.kicad_sch
//!     description: Controller
//!     ignore: [J9]
//! systems:
//!   full:
//!     boards: [main, sense]
//! cache:
//!   enabled: true
//!   directory: ~/.cache/kigraph
//!   check_mtime: true
//! kicad_cli: /opt/kicad/bin/kicad-cli
//! ```
//!
//! Relative paths resolve against the directory holding the file.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const CONFIG_ENV: &str = "KIGRAPH_CONFIG";
pub const LOCAL_CONFIG_NAMES: &[&str] = &[".kigraph.yaml", ".kigraph.yml"];
/// How many parent directories are searched for a local config.
const MAX_PARENT_DEPTH: usize = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Unknown board '{0}'")]
    UnknownBoard(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Schematic (`.kicad_sch`) or netlist (`.net`) of the board.
    pub path: PathBuf,
    #[serde(default)]
    pub description: String,
    /// References left out of multi-board systems.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore: Vec<String>,
    /// Pre-exported netlist, used instead of running the exporter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netlist: Option<PathBuf>,
    /// Top-level schematic for the sheet hierarchy when `path` is a netlist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schematic: Option<PathBuf>,
}

impl BoardConfig {
    pub fn new(path: impl Into<PathBuf>, description: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            description: description.into(),
            ignore: Vec::new(),
            netlist: None,
            schematic: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    pub boards: Vec<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_cache_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_true")]
    pub check_mtime: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: default_cache_directory(),
            check_mtime: true,
        }
    }
}

fn default_cache_directory() -> PathBuf {
    PathBuf::from("~/.cache/kigraph")
}

fn default_true() -> bool {
    true
}

/// On-disk shape of the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub boards: IndexMap<String, BoardConfig>,
    #[serde(default)]
    pub systems: IndexMap<String, SystemConfig>,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Explicit `kicad-cli` executable; probed for when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kicad_cli: Option<PathBuf>,
}

/// A config file together with where it lives.
#[derive(Debug, Clone)]
pub struct Config {
    path: PathBuf,
    file: ConfigFile,
}

impl Config {
    /// Locate and load the config for the current process.
    pub fn discover() -> Result<Self, ConfigError> {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let home = home_dir();
        match find_config(env.as_deref(), &cwd, home.as_deref()) {
            Some(path) => {
                info!("Using config {}", path.display());
                Self::load(path)
            }
            None => {
                debug!("No config found, using defaults");
                Ok(Self::empty(cwd.join(LOCAL_CONFIG_NAMES[0])))
            }
        }
    }

    /// Load `path`; a missing file yields an empty config that saves there.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self::empty(path));
        }
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let file = Self::parse(&content).map_err(|source| ConfigError::Yaml {
            path: path.clone(),
            source,
        })?;
        Ok(Self { path, file })
    }

    fn parse(content: &str) -> Result<ConfigFile, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(ConfigFile::default());
        }
        serde_yaml::from_str(content)
    }

    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: ConfigFile::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self) -> &ConfigFile {
        &self.file
    }

    pub fn cache(&self) -> &CacheConfig {
        &self.file.cache
    }

    /// Cache directory with `~` and relative paths resolved.
    pub fn cache_directory(&self) -> PathBuf {
        self.resolve(&self.file.cache.directory)
    }

    pub fn board(&self, name: &str) -> Option<&BoardConfig> {
        self.file.boards.get(name)
    }

    pub fn system(&self, name: &str) -> Option<&SystemConfig> {
        self.file.systems.get(name)
    }

    /// Resolved `kicad_cli` path, if one is configured.
    pub fn kicad_cli(&self) -> Option<PathBuf> {
        self.file.kicad_cli.as_deref().map(|p| self.resolve(p))
    }

    /// Resolved board path, if the board is configured.
    pub fn board_path(&self, name: &str) -> Option<PathBuf> {
        self.board(name).map(|b| self.resolve(&b.path))
    }

    pub fn ignore_list(&self, name: &str) -> &[String] {
        self.board(name).map(|b| b.ignore.as_slice()).unwrap_or_default()
    }

    /// Expand `~` and anchor relative paths at the config directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        let expanded = expand_home(path);
        if expanded.is_absolute() {
            return expanded;
        }
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.join(expanded),
            _ => expanded,
        }
    }

    /// `name: description` per board.
    pub fn list_boards(&self) -> Vec<String> {
        self.file
            .boards
            .iter()
            .map(|(name, b)| format!("{}: {}", name, describe(&b.description)))
            .collect()
    }

    /// `name: description [board, ...]` per system.
    pub fn list_systems(&self) -> Vec<String> {
        self.file
            .systems
            .iter()
            .map(|(name, s)| {
                format!("{}: {} [{}]", name, describe(&s.description), s.boards.join(", "))
            })
            .collect()
    }

    /// Add or replace a board and save.
    pub fn add_board(&mut self, name: &str, board: BoardConfig) -> Result<(), ConfigError> {
        self.file.boards.insert(name.to_string(), board);
        self.save()
    }

    /// Add or replace a system and save. Every board must already exist.
    pub fn add_system(&mut self, name: &str, system: SystemConfig) -> Result<(), ConfigError> {
        if let Some(missing) = system.boards.iter().find(|b| !self.file.boards.contains_key(*b)) {
            return Err(ConfigError::UnknownBoard(missing.clone()));
        }
        self.file.systems.insert(name.to_string(), system);
        self.save()
    }

    /// Returns `false` if no such board was configured.
    pub fn remove_board(&mut self, name: &str) -> Result<bool, ConfigError> {
        if self.file.boards.shift_remove(name).is_none() {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    pub fn remove_system(&mut self, name: &str) -> Result<bool, ConfigError> {
        if self.file.systems.shift_remove(name).is_none() {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let content = serde_yaml::to_string(&self.file).map_err(|source| ConfigError::Yaml {
            path: self.path.clone(),
            source,
        })?;
        std::fs::write(&self.path, content).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;
        debug!("Saved config {}", self.path.display());
        Ok(())
    }

    /// Re-read the file from disk.
    pub fn reload(&mut self) -> Result<(), ConfigError> {
        *self = Self::load(self.path.clone())?;
        info!("Reloaded config {}", self.path.display());
        Ok(())
    }
}

fn describe(description: &str) -> &str {
    if description.is_empty() {
        "No description"
    } else {
        description
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Env override, then local files up the tree, then the user config.
fn find_config(env: Option<&Path>, cwd: &Path, home: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = env {
        let path = expand_home(path);
        if path.exists() {
            return Some(path);
        }
        warn!(
            "{} points to missing file {}",
            CONFIG_ENV,
            path.display()
        );
    }

    let mut dir = Some(cwd);
    for _ in 0..=MAX_PARENT_DEPTH {
        let Some(current) = dir else { break };
        for name in LOCAL_CONFIG_NAMES {
            let candidate = current.join(name);
            if candidate.exists() {
                return Some(candidate);
            }
        }
        dir = current.parent();
    }

    home.map(|h| h.join(".config/kigraph/config.yaml"))
        .filter(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const SAMPLE: &str = r#"
boards:
  main:
    path: boards/main.net
    description: Controller
    ignore: [J9]
    schematic: boards/main.kicad_sch
  sense:
    path: /abs/sense.kicad_sch
systems:
  full:
    boards: [main, sense]
    description: Everything
cache:
  enabled: true
kicad_cli: tools/kicad-cli
"#;

    #[test]
    fn test_parse_with_defaults() {
        let file = Config::parse(SAMPLE).unwrap();
        assert_eq!(file.boards.len(), 2);
        assert_eq!(file.boards["main"].ignore, vec!["J9"]);
        assert_eq!(file.boards["sense"].description, "");
        assert!(file.cache.enabled);
        assert!(file.cache.check_mtime);
        assert_eq!(file.cache.directory, PathBuf::from("~/.cache/kigraph"));
        assert_eq!(file.kicad_cli, Some(PathBuf::from("tools/kicad-cli")));
        assert_eq!(Config::parse("").unwrap(), ConfigFile::default());
    }

    #[test]
    fn test_paths_resolve_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".kigraph.yaml");
        fs::write(&path, SAMPLE).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.board_path("main"), Some(dir.path().join("boards/main.net")));
        assert_eq!(config.board_path("sense"), Some(PathBuf::from("/abs/sense.kicad_sch")));
        assert_eq!(config.board_path("nope"), None);
        assert_eq!(config.kicad_cli(), Some(dir.path().join("tools/kicad-cli")));
        assert_eq!(config.ignore_list("main"), ["J9".to_string()]);
        assert!(config.ignore_list("sense").is_empty());
    }

    #[test]
    fn test_listings() {
        let config = Config {
            path: PathBuf::from("/tmp/.kigraph.yaml"),
            file: Config::parse(SAMPLE).unwrap(),
        };
        assert_eq!(config.list_boards(), vec!["main: Controller", "sense: No description"]);
        assert_eq!(config.list_systems(), vec!["full: Everything [main, sense]"]);
    }

    #[test]
    fn test_mutations_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kigraph.yaml");
        let mut config = Config::load(&path).unwrap();
        assert!(config.file().boards.is_empty());

        config.add_board("a", BoardConfig::new("a.net", "Board A")).unwrap();
        config
            .add_system("s", SystemConfig { boards: vec!["a".into()], description: String::new() })
            .unwrap();
        let err = config
            .add_system("bad", SystemConfig { boards: vec!["zz".into()], description: String::new() })
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownBoard(name) if name == "zz"));

        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded.board("a").unwrap().description, "Board A");
        assert_eq!(reloaded.system("s").unwrap().boards, vec!["a"]);

        assert!(config.remove_system("s").unwrap());
        assert!(config.remove_board("a").unwrap());
        assert!(!config.remove_board("a").unwrap());
        config.reload().unwrap();
        assert!(config.file().boards.is_empty());
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        fs::write(&path, "boards: [unterminated").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Yaml { .. })));
    }

    #[test]
    fn test_discovery_order() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();
        let home = root.path().join("home");
        fs::create_dir_all(home.join(".config/kigraph")).unwrap();
        let user = home.join(".config/kigraph/config.yaml");
        fs::write(&user, "").unwrap();

        // nothing local yet: user config
        assert_eq!(find_config(None, &nested, Some(home.as_path())), Some(user.clone()));

        let local = root.path().join(".kigraph.yml");
        fs::write(&local, "").unwrap();
        assert_eq!(find_config(None, &nested, Some(home.as_path())), Some(local.clone()));

        let explicit = root.path().join("explicit.yaml");
        fs::write(&explicit, "").unwrap();
        assert_eq!(find_config(Some(explicit.as_path()), &nested, Some(home.as_path())), Some(explicit));

        // a dangling override falls through
        let dangling = root.path().join("missing.yaml");
        assert_eq!(find_config(Some(dangling.as_path()), &nested, None), Some(local));
    }
}
