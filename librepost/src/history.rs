//! Persisted record of posts that have already been reposted
//!
//! The history is a plain value: load it once, pass it around explicitly,
//! save it back. On disk it is a JSON array of post ids in the order they
//! were reposted.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::HistoryError;

/// Ordered, duplicate-free set of reposted post ids
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryStore {
    ids: Vec<String>,
    index: HashSet<String>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a history from ids, keeping the first occurrence of each
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut store = Self::new();
        for id in ids {
            store.mark(id);
        }
        store
    }

    /// Load the history file strictly.
    ///
    /// A missing file is an empty history. Duplicate ids in the file are
    /// collapsed so the in-memory invariant holds from the start.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Read` if the file exists but cannot be read and
    /// `HistoryError::Parse` if it is not a JSON array of strings.
    pub fn load(path: &Path) -> Result<Self, HistoryError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No history file at {}, starting empty", path.display());
                return Ok(Self::new());
            }
            Err(source) => {
                return Err(HistoryError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        if content.trim().is_empty() {
            return Ok(Self::new());
        }

        let raw: Vec<String> = serde_json::from_str(&content).map_err(|source| HistoryError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let total = raw.len();
        let store = Self::from_ids(raw);
        if store.len() < total {
            warn!(
                "History file {} contained {} duplicate id(s); they were collapsed",
                path.display(),
                total - store.len()
            );
        }

        Ok(store)
    }

    /// Load the history, falling back to an empty one on any error.
    ///
    /// Errors are logged as warnings and never returned.
    pub fn load_or_empty(path: &Path) -> Self {
        if !path.exists() {
            warn!(
                "History file {} not found; treating history as empty",
                path.display()
            );
            return Self::new();
        }

        match Self::load(path) {
            Ok(store) => store,
            Err(e) => {
                warn!("{}; treating history as empty", e);
                Self::new()
            }
        }
    }

    /// Write the history back to disk atomically (temp file + rename).
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Write` if the directory cannot be created or the
    /// file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), HistoryError> {
        write_json_atomic(path, &self.ids)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    /// Append an id. Returns `false` if it was already present.
    pub fn mark(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if self.index.contains(&id) {
            return false;
        }
        self.index.insert(id.clone());
        self.ids.push(id);
        true
    }

    /// Ids in the order they were reposted
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Serialize `value` as pretty JSON next to `path` and rename it into place.
pub(crate) fn write_json_atomic<T: serde::Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), HistoryError> {
    let write_err = |source: std::io::Error| HistoryError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }

    let json = serde_json::to_string_pretty(value)
        .map_err(|e| write_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

    let tmp_path = temp_path_for(path);
    std::fs::write(&tmp_path, json).map_err(write_err)?;
    std::fs::rename(&tmp_path, path).map_err(write_err)?;
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
