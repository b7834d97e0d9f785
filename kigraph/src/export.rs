//! Schematic to netlist export through `kicad-cli`.

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("kicad-cli not found (tried {0})")]
    NotFound(String),
    #[error("Schematic not found: {0}")]
    MissingSchematic(PathBuf),
    #[error("Netlist export failed: {0}")]
    Failed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Locations probed for `kicad-cli`, in order.
pub const KICAD_CLI_CANDIDATES: &[&str] = &[
    "/Applications/KiCad/KiCad.app/Contents/MacOS/kicad-cli",
    "/usr/bin/kicad-cli",
    "kicad-cli",
];

/// Something that can turn a schematic into a `kicadsexpr` netlist file.
pub trait NetlistExporter {
    fn export(&self, schematic: &Path, output: &Path) -> Result<(), ExportError>;

    /// Export into a fresh temporary file and return its contents. The
    /// temporary file is removed when it goes out of scope.
    fn export_to_string(&self, schematic: &Path) -> Result<String, ExportError> {
        let output = tempfile::Builder::new()
            .prefix("kigraph-")
            .suffix(".net")
            .tempfile()?;
        self.export(schematic, output.path())?;
        Ok(std::fs::read_to_string(output.path())?)
    }
}

#[derive(Debug, Clone)]
pub struct KicadCli {
    program: PathBuf,
}

impl KicadCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// First candidate that answers `--version`.
    pub fn locate() -> Result<Self, ExportError> {
        KICAD_CLI_CANDIDATES
            .iter()
            .find(|candidate| responds_to_version(Path::new(candidate)))
            .map(|found| {
                debug!("Using kicad-cli at {}", found);
                Self::new(found)
            })
            .ok_or_else(|| ExportError::NotFound(KICAD_CLI_CANDIDATES.join(", ")))
    }

    /// Explicit path if given, otherwise [`KicadCli::locate`].
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ExportError> {
        match explicit {
            Some(path) if responds_to_version(path) => Ok(Self::new(path)),
            Some(path) => Err(ExportError::NotFound(path.display().to_string())),
            None => Self::locate(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl NetlistExporter for KicadCli {
    fn export(&self, schematic: &Path, output: &Path) -> Result<(), ExportError> {
        if !schematic.exists() {
            return Err(ExportError::MissingSchematic(schematic.to_path_buf()));
        }

        info!("Exporting netlist from {}", schematic.display());
        let result = Command::new(&self.program)
            .args(["sch", "export", "netlist", "--format", "kicadsexpr", "-o"])
            .arg(output)
            .arg(schematic)
            .output()?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
            return Err(ExportError::Failed(if stderr.is_empty() {
                format!("kicad-cli exited with {}", result.status)
            } else {
                stderr
            }));
        }
        Ok(())
    }
}

fn responds_to_version(program: &Path) -> bool {
    Command::new(program)
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
