use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{CacheError, Result};
use crate::paths::OutputMode;

/// Cached status of one (source file, output mode) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// MD5 of the source text at the last successful compile
    #[serde(rename = "sourceMD5")]
    pub source_digest: String,

    /// Modification time of the written output, in epoch milliseconds
    #[serde(rename = "targetMilliseconds")]
    pub target_modified_ms: u64,
}

/// Status key: `"<absolutePath>@<mode>"`
pub fn status_key(path: &Path, mode: OutputMode) -> String {
    format!("{}@{}", path.to_string_lossy(), mode.as_str())
}

/// Persisted mapping from (path, mode) to [`CacheEntry`]
///
/// Every mutation is flushed to disk immediately so an interrupted process
/// loses at most one entry.
#[derive(Debug)]
pub struct StatusStore {
    /// Backing file; `None` for the in-memory variant
    path: Option<PathBuf>,
    entries: IndexMap<String, CacheEntry>,
}

impl StatusStore {
    /// Load the store from `path`, starting clean if the file is missing or
    /// unparseable. A clean start is written back immediately.
    pub fn load(path: &Path) -> Result<Self> {
        let entries = match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str::<IndexMap<String, CacheEntry>>(&text) {
                Ok(entries) => {
                    info!("Loaded status cache with {} entries", entries.len());
                    Some(entries)
                }
                Err(e) => {
                    warn!("Couldn't parse status cache, making a clean one: {}", e);
                    None
                }
            },
            Err(e) => {
                debug!("No status cache at {:?}: {}", path, e);
                None
            }
        };

        let mut store = Self {
            path: Some(path.to_path_buf()),
            entries: IndexMap::new(),
        };
        match entries {
            Some(entries) => store.entries = entries,
            None => store.flush()?,
        }
        Ok(store)
    }

    /// A store with no backing file
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: IndexMap::new(),
        }
    }

    /// Drop every entry and persist the empty store
    pub fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        self.flush()?;
        info!("Status cache cleared");
        Ok(())
    }

    pub fn get(&self, path: &Path, mode: OutputMode) -> Option<&CacheEntry> {
        self.entries.get(&status_key(path, mode))
    }

    /// Whether the stored entry still describes the current source and output
    ///
    /// `current_target_ms` is `None` when the output file does not exist.
    pub fn is_valid(
        &self,
        path: &Path,
        mode: OutputMode,
        current_digest: &str,
        current_target_ms: Option<u64>,
    ) -> bool {
        match (self.get(path, mode), current_target_ms) {
            (Some(entry), Some(target_ms)) => {
                entry.source_digest == current_digest && entry.target_modified_ms == target_ms
            }
            _ => false,
        }
    }

    /// Upsert an entry and flush
    pub fn record(
        &mut self,
        path: &Path,
        mode: OutputMode,
        digest: &str,
        target_modified_ms: u64,
    ) -> Result<()> {
        self.entries.insert(
            status_key(path, mode),
            CacheEntry {
                source_digest: digest.to_string(),
                target_modified_ms,
            },
        );
        self.flush()
    }

    /// Remove an entry, flushing only if something was removed
    pub fn remove(&mut self, path: &Path, mode: OutputMode) -> Result<bool> {
        let removed = self
            .entries
            .shift_remove(&status_key(path, mode))
            .is_some();
        if removed {
            self.flush()?;
        }
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the store to its backing file
    pub fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(path, json).map_err(|e| CacheError::io(path, e))?;
        Ok(())
    }
}

/// Modification time of a file in epoch milliseconds, `None` if it is missing
pub fn modified_ms(path: &Path) -> Option<u64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let since_epoch = modified.duration_since(std::time::UNIX_EPOCH).ok()?;
    u64::try_from(since_epoch.as_millis()).ok()
}
