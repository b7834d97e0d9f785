//! Schematic hierarchy mapping
//!
//! Walks a top-level `.kicad_sch` and every sub-sheet it references, and
//! records for each component reference the file name of the first sheet
//! that declares it. The multi-board composer uses this sheet-of-origin as
//! evidence that two boards share an interface sheet.
//!
//! A reference declared in several sheets keeps its first sighting
//! (pre-order, source order). That is a known limitation for sheets
//! instantiated more than once.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::parser::sexp::{parse_str, ParseError, SExp};

#[derive(Debug, Error)]
pub enum HierarchyError {
    #[error("Cannot read schematic {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot parse schematic {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
}

/// Sheet-file property names across KiCad 6 and 7+.
const SHEET_FILE_PROPERTIES: &[&str] = &["Sheetfile", "Sheet file"];

/// What one schematic file declares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetScan {
    /// Sub-sheet paths as written, relative to the declaring file.
    pub sheet_files: Vec<String>,
    /// Instantiated component references (containing a digit).
    pub references: Vec<String>,
}

/// Scan one schematic document for sub-sheet and reference properties.
pub fn scan_schematic(content: &str) -> Result<SheetScan, ParseError> {
    let root = parse_str(content)?;
    let mut scan = SheetScan::default();

    for node in root.walk() {
        if node.head() != Some("property") {
            continue;
        }
        let mut args = node.args().iter().filter_map(SExp::as_atom);
        let (Some(key), Some(value)) = (args.next(), args.next()) else {
            continue;
        };

        if key == "Reference" {
            // "R" / "U" in lib_symbols are templates, not instances
            if value.chars().any(|c| c.is_ascii_digit()) {
                scan.references.push(value.to_string());
            }
        } else if SHEET_FILE_PROPERTIES.contains(&key) && !value.is_empty() {
            scan.sheet_files.push(value.to_string());
        }
    }

    Ok(scan)
}

/// reference -> originating sheet file name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetMap {
    origins: IndexMap<String, String>,
    sheets: Vec<PathBuf>,
}

impl SheetMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discover the full hierarchy under `top_level`.
    ///
    /// The top-level file must be readable; unreadable or unparsable
    /// sub-sheets are logged and skipped.
    pub fn discover(top_level: &Path) -> Result<Self, HierarchyError> {
        let mut map = SheetMap::new();
        let mut visited: HashSet<PathBuf> = HashSet::new();
        let mut stack = vec![top_level.to_path_buf()];

        while let Some(path) = stack.pop() {
            let key = path.canonicalize().unwrap_or_else(|_| path.clone());
            if !visited.insert(key) {
                continue;
            }

            let is_top = map.sheets.is_empty();
            let scan = match read_and_scan(&path) {
                Ok(scan) => scan,
                Err(e) if is_top => return Err(e),
                Err(e) => {
                    warn!("Skipping sub-sheet: {}", e);
                    continue;
                }
            };

            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            for reference in scan.references {
                map.record(reference, &file_name);
            }

            let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
            // reversed so the first declared sub-sheet is visited next
            for sheet in scan.sheet_files.iter().rev() {
                stack.push(dir.join(sheet));
            }
            map.sheets.push(path);
        }

        debug!(
            "Mapped {} references across {} sheets under {}",
            map.origins.len(),
            map.sheets.len(),
            top_level.display()
        );
        Ok(map)
    }

    /// Record a sighting; later sightings of the same reference are ignored.
    pub fn record(&mut self, reference: impl Into<String>, sheet: &str) {
        self.origins
            .entry(reference.into())
            .or_insert_with(|| sheet.to_string());
    }

    pub fn sheet_of(&self, reference: &str) -> Option<&str> {
        self.origins.get(reference).map(String::as_str)
    }

    /// Sheet files visited, top level first.
    pub fn sheets(&self) -> &[PathBuf] {
        &self.sheets
    }

    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }
}

impl<R: Into<String>, S: AsRef<str>> FromIterator<(R, S)> for SheetMap {
    fn from_iter<T: IntoIterator<Item = (R, S)>>(iter: T) -> Self {
        let mut map = SheetMap::new();
        for (reference, sheet) in iter {
            map.record(reference, sheet.as_ref());
        }
        map
    }
}

fn read_and_scan(path: &Path) -> Result<SheetScan, HierarchyError> {
    let content = std::fs::read_to_string(path).map_err(|source| HierarchyError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    scan_schematic(&content).map_err(|source| HierarchyError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
