use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use super::{CacheError, Result};

/// On-disk shape of the marker file
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerState {
    #[serde(
        rename = "latestChangeTimestamp",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub latest_change: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<BTreeMap<String, u64>>,
}

/// Last-changed marker shared with downstream cache layers
///
/// A downstream key is safe to skip only when its recorded success is
/// strictly newer than the last observed change. With no marker at all
/// (nobody watching) nothing is safe.
///
/// The file is re-read on every operation because other processes consume it.
#[derive(Debug, Clone)]
pub struct ChangeMarker {
    path: PathBuf,
}

impl ChangeMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current state; unreadable or corrupt files read as empty
    pub fn read(&self) -> MarkerState {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default()
    }

    fn write(&self, state: &MarkerState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(state)?;
        std::fs::write(&self.path, json).map_err(|e| CacheError::io(&self.path, e))
    }

    /// Forget the last-changed timestamp; nothing is safe until the next bump
    pub fn clear_last_changed(&self) -> Result<()> {
        let mut state = self.read();
        state.latest_change = None;
        debug!("Cleared last-changed marker");
        self.write(&state)
    }

    /// Record that something relevant changed now
    pub fn bump(&self) -> Result<()> {
        self.bump_at(now_ms())
    }

    pub fn bump_at(&self, timestamp_ms: u64) -> Result<()> {
        let mut state = self.read();
        state.latest_change = Some(timestamp_ms);
        self.write(&state)
    }

    /// Record that the process identified by `key` succeeded now
    pub fn on_success(&self, key: &str) -> Result<()> {
        self.on_success_at(key, now_ms())
    }

    pub fn on_success_at(&self, key: &str, timestamp_ms: u64) -> Result<()> {
        let mut state = self.read();
        state
            .cache
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), timestamp_ms);
        self.write(&state)
    }

    /// Whether the process identified by `key` can be skipped
    pub fn is_cache_safe(&self, key: &str) -> bool {
        let state = self.read();
        let success = state.cache.as_ref().and_then(|c| c.get(key)).copied();
        match (success, state.latest_change) {
            (Some(success), Some(changed)) => changed < success,
            _ => false,
        }
    }

    pub fn is_cache_stale(&self, key: &str) -> bool {
        !self.is_cache_safe(key)
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
