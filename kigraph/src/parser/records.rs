//! Positional part/net records.
//!
//! This is the narrow contract between the netlist reader and the model
//! extractor: a part-record is `[ref, value, footprint, datasheet?, (name value)...]`
//! and a net-record is `[code, name, unused, [(ref pin pin_name?)...]]`.
//! The reader below produces these from a KiCad `kicadsexpr` export.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::sexp::{parse_str, ParseError, SExp};

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("S-expression error: {0}")]
    Parse(#[from] ParseError),
    #[error("Not a KiCad netlist: root is '{0}'")]
    NotANetlist(String),
}

/// One positional entry of a record: plain text or a nested sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Field {
    Text(String),
    List(Vec<Field>),
}

impl Field {
    pub fn text(s: impl Into<String>) -> Self {
        Field::Text(s.into())
    }

    pub fn list<I, F>(items: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Field>,
    {
        Field::List(items.into_iter().map(Into::into).collect())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Field::Text(s) => Some(s),
            Field::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Field]> {
        match self {
            Field::List(items) => Some(items),
            Field::Text(_) => None,
        }
    }
}

impl From<&str> for Field {
    fn from(s: &str) -> Self {
        Field::Text(s.to_string())
    }
}

impl From<String> for Field {
    fn from(s: String) -> Self {
        Field::Text(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartRecord {
    pub fields: Vec<Field>,
}

impl PartRecord {
    pub fn new<I, F>(fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Field>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetRecord {
    pub fields: Vec<Field>,
}

impl NetRecord {
    pub fn new<I, F>(fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Field>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Record {
    Part(PartRecord),
    Net(NetRecord),
}

/// Read a `.net` file into records.
pub fn read_netlist(path: &Path) -> Result<Vec<Record>, ReadError> {
    let content = std::fs::read_to_string(path)?;
    let records = records_from_str(&content)?;
    debug!("Read {} records from {}", records.len(), path.display());
    Ok(records)
}

pub fn records_from_str(content: &str) -> Result<Vec<Record>, ReadError> {
    let root = parse_str(content)?;
    match root.head() {
        Some("export") => Ok(records_from_sexp(&root)),
        other => Err(ReadError::NotANetlist(other.unwrap_or("").to_string())),
    }
}

/// Flatten an `(export ...)` tree into part-records followed by net-records.
pub fn records_from_sexp(root: &SExp) -> Vec<Record> {
    let mut records = Vec::new();

    if let Some(components) = root.child("components") {
        records.extend(components.children("comp").map(|c| Record::Part(part_record(c))));
    }

    if let Some(nets) = root.child("nets") {
        records.extend(nets.children("net").map(|n| Record::Net(net_record(n))));
    }

    records
}

fn part_record(comp: &SExp) -> PartRecord {
    let mut fields = Vec::new();

    // Positional prefix stops at the first missing mandatory entry so the
    // extractor sees a short (malformed) record instead of an invented one.
    let Some(reference) = comp.value("ref") else {
        return PartRecord { fields };
    };
    fields.push(Field::text(reference));
    let Some(value) = comp.value("value") else {
        return PartRecord { fields };
    };
    fields.push(Field::text(value));
    fields.push(Field::text(comp.value("footprint").unwrap_or("")));
    fields.push(Field::text(comp.value("datasheet").unwrap_or("")));

    let mut has_description = false;
    if let Some(extra) = comp.child("fields") {
        for field in extra.children("field") {
            let Some(name) = field.value("name") else {
                continue;
            };
            // (field (name "MPN") "value") - the value is the trailing atom
            let value = field
                .args()
                .iter()
                .filter_map(SExp::as_atom)
                .last()
                .unwrap_or("");
            has_description |= name.eq_ignore_ascii_case("description");
            fields.push(Field::list([name, value]));
        }
    }

    if !has_description {
        let description = comp
            .value("description")
            .or_else(|| comp.child("libsource").and_then(|l| l.value("description")));
        if let Some(description) = description {
            fields.push(Field::list(["Description", description]));
        }
    }

    PartRecord { fields }
}

fn net_record(net: &SExp) -> NetRecord {
    let Some(code) = net.value("code") else {
        return NetRecord::default();
    };

    let connections = net
        .children("node")
        .map(|node| {
            let mut conn = Vec::new();
            if let Some(reference) = node.value("ref") {
                conn.push(Field::text(reference));
                if let Some(pin) = node.value("pin") {
                    conn.push(Field::text(pin));
                    if let Some(function) = node.value("pinfunction").filter(|f| !f.is_empty()) {
                        conn.push(Field::text(function));
                    }
                }
            }
            Field::List(conn)
        })
        .collect();

    NetRecord {
        fields: vec![
            Field::text(code),
            Field::text(net.value("name").unwrap_or("")),
            Field::text(""),
            Field::List(connections),
        ],
    }
}
