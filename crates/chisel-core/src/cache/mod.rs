//! Persistent transpile status and the downstream last-changed marker
//!
//! The status store remembers, per source file and output mode, the digest of
//! the source that was compiled and the mtime of the output that was written.
//! A file is recompiled only when either of those no longer matches.

mod error;
mod hash;
mod marker;
mod status;

pub use error::{CacheError, Result};
pub use hash::{digest, digest_file};
pub use marker::{ChangeMarker, MarkerState};
pub use status::{modified_ms, status_key, CacheEntry, StatusStore};

/// Default status file name, inside the dist directory
pub const STATUS_FILE_NAME: &str = "js-cache-status.json";

/// Default marker file name, inside the dist directory
pub const MARKER_FILE_NAME: &str = "cache-layer.json";
