//! Per-account fetch cursors (`since_id`)
//!
//! Remembers the newest post id that was fully processed for each source
//! account so the next run only asks for newer posts.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;

use tracing::warn;

use crate::error::HistoryError;
use crate::history::write_json_atomic;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CursorStore {
    cursors: BTreeMap<String, String>,
}

impl CursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load cursors from a JSON object of `handle -> id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, HistoryError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
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

        let cursors = serde_json::from_str(&content).map_err(|source| HistoryError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { cursors })
    }

    /// Load cursors, falling back to none (fetch everything) on error
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(store) => store,
            Err(e) => {
                warn!("{}; ignoring saved fetch cursors", e);
                Self::new()
            }
        }
    }

    /// # Errors
    ///
    /// Returns `HistoryError::Write` if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), HistoryError> {
        write_json_atomic(path, &self.cursors)
    }

    pub fn get(&self, handle: &str) -> Option<&str> {
        self.cursors.get(handle).map(String::as_str)
    }

    /// Move the cursor for `handle` forward to `id`. Never moves it back.
    ///
    /// Returns `true` if the cursor changed.
    pub fn advance(&mut self, handle: &str, id: &str) -> bool {
        match self.cursors.get(handle) {
            Some(current) if compare_ids(id, current) != Ordering::Greater => false,
            _ => {
                self.cursors.insert(handle.to_string(), id.to_string());
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }
}

/// Order post ids: numerically when both are integers, otherwise by length
/// and then lexicographically (which matches numeric order for ids without
/// leading zeros).
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
    }
}

/// Highest id in the iterator according to [`compare_ids`]
pub fn max_id<'a, I>(ids: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    ids.into_iter().max_by(|a, b| compare_ids(a, b))
}
