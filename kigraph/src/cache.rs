//! On-disk cache of built circuit graphs.
//!
//! Entries are JSON envelopes named `<stem>_<hash>.cache`, where the hash is
//! the first 16 hex characters of the SHA-256 of the source's absolute path.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;
use crate::graph::CircuitGraph;

const KEY_HASH_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cache serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEnvelope {
    source: PathBuf,
    cached_at: DateTime<Utc>,
    graph: CircuitGraph,
}

#[derive(Debug, Clone)]
pub struct GraphCache {
    directory: PathBuf,
    check_mtime: bool,
}

impl GraphCache {
    pub fn new(directory: impl Into<PathBuf>, check_mtime: bool) -> Self {
        Self {
            directory: directory.into(),
            check_mtime,
        }
    }

    /// `None` when caching is disabled.
    pub fn from_config(config: &Config) -> Option<Self> {
        let settings = config.cache();
        settings
            .enabled
            .then(|| Self::new(config.cache_directory(), settings.check_mtime))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn entry_path(&self, source: &Path) -> PathBuf {
        self.directory.join(cache_key(source))
    }

    /// Cached graph for `source`, if present and still fresh. Unreadable,
    /// corrupt or stale entries count as a miss.
    pub fn load(&self, source: &Path) -> Option<CircuitGraph> {
        let entry = self.entry_path(source);
        if !entry.exists() {
            debug!("Cache miss for {}", source.display());
            return None;
        }

        let envelope: CacheEnvelope = match std::fs::read(&entry)
            .map_err(CacheError::from)
            .and_then(|bytes| Ok(serde_json::from_slice(&bytes)?))
        {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Ignoring unreadable cache entry {}: {}", entry.display(), e);
                return None;
            }
        };

        if self.check_mtime && !is_fresh(source, envelope.cached_at) {
            warn!("Cache entry for {} is stale", source.display());
            return None;
        }

        debug!("Cache hit for {}", source.display());
        Some(envelope.graph)
    }

    pub fn store(&self, source: &Path, graph: &CircuitGraph) -> Result<PathBuf, CacheError> {
        std::fs::create_dir_all(&self.directory)?;
        let entry = self.entry_path(source);
        let envelope = CacheEnvelope {
            source: absolute(source),
            cached_at: Utc::now(),
            graph: graph.clone(),
        };
        std::fs::write(&entry, serde_json::to_vec(&envelope)?)?;
        debug!("Cached {} at {}", source.display(), entry.display());
        Ok(entry)
    }

    /// Remove the entry for `source`; `false` if there was none.
    pub fn invalidate(&self, source: &Path) -> Result<bool, CacheError> {
        let entry = self.entry_path(source);
        if !entry.exists() {
            return Ok(false);
        }
        std::fs::remove_file(entry)?;
        Ok(true)
    }
}

/// `<stem>_<hash>.cache`
pub fn cache_key(source: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(absolute(source).to_string_lossy().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}_{}.cache", stem, &digest[..KEY_HASH_LEN])
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Source not modified after `cached_at`. A missing source is never fresh.
fn is_fresh(source: &Path, cached_at: DateTime<Utc>) -> bool {
    std::fs::metadata(source)
        .and_then(|m| m.modified())
        .map(|modified| DateTime::<Utc>::from(modified) <= cached_at)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_support::sample_records;
    use chrono::TimeZone;

    #[test]
    fn test_cache_key_shape() {
        let key = cache_key(Path::new("/projects/main.net"));
        assert!(key.starts_with("main_"));
        assert!(key.ends_with(".cache"));
        assert_eq!(key.len(), "main_".len() + KEY_HASH_LEN + ".cache".len());
        assert_ne!(key, cache_key(Path::new("/other/main.net")));
    }

    #[test]
    fn test_store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("board.net");
        std::fs::write(&source, "(export)").unwrap();

        let cache = GraphCache::new(dir.path().join("cache"), true);
        assert!(cache.load(&source).is_none());

        let graph = CircuitGraph::from_records(&sample_records());
        cache.store(&source, &graph).unwrap();
        let restored = cache.load(&source).unwrap();
        assert_eq!(restored.node_count(), graph.node_count());
        assert_eq!(restored.netlist(), graph.netlist());

        assert!(cache.invalidate(&source).unwrap());
        assert!(!cache.invalidate(&source).unwrap());
    }

    #[test]
    fn test_stale_entry_is_a_miss_unless_mtime_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("board.net");
        std::fs::write(&source, "(export)").unwrap();

        let checking = GraphCache::new(dir.path(), true);
        let envelope = CacheEnvelope {
            source: source.clone(),
            cached_at: Utc.timestamp_opt(0, 0).unwrap(),
            graph: CircuitGraph::from_records(&sample_records()),
        };
        std::fs::write(checking.entry_path(&source), serde_json::to_vec(&envelope).unwrap()).unwrap();

        assert!(checking.load(&source).is_none());
        assert!(GraphCache::new(dir.path(), false).load(&source).is_some());
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("board.net");
        let cache = GraphCache::new(dir.path(), false);
        std::fs::write(cache.entry_path(&source), b"not json").unwrap();
        assert!(cache.load(&source).is_none());
    }
}
