use std::path::PathBuf;
use thiserror::Error;

use crate::cache::CacheError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors that abort a transpile or watch run
///
/// Per-file compile failures never surface here; they are logged and the
/// file is retried on the next pass.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

impl BuildError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BuildError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type BuildResult<T> = std::result::Result<T, BuildError>;
