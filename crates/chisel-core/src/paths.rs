//! Path classification and source/output path mapping
//!
//! The same predicates gate both the initial full-tree scan and the watch
//! path, so a file the scan would compile is never missed by the watcher.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Source extensions eligible for transpilation
pub const SOURCE_EXTENSIONS: &[&str] = &["js", "ts", "tsx", "mts", "mjs", "wgsl"];

/// Extensions whose output is normalized to `.js`
const NORMALIZED_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "mjs", "wgsl"];

/// Suffix of lint cache files
pub const LINT_CACHE_SUFFIX: &str = ".eslintcache";

/// Output flavor of a transpiled file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputMode {
    #[serde(rename = "js")]
    Module,
    #[serde(rename = "commonjs")]
    CommonJs,
}

impl OutputMode {
    pub const ALL: [OutputMode; 2] = [OutputMode::Module, OutputMode::CommonJs];

    /// Key used in the status file and as the output subdirectory name
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputMode::Module => "js",
            OutputMode::CommonJs => "commonjs",
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decides which paths are eligible for transpilation and where their
/// output lands
#[derive(Debug, Clone)]
pub struct PathClassifier {
    root: PathBuf,
    dist_dir: PathBuf,
    protected_files: Vec<String>,
}

impl PathClassifier {
    /// Create a classifier for the given root and output directory
    ///
    /// `dist_dir` may be relative to `root`. `protected_files` are file names
    /// (status file, marker file) that are never treated as sources.
    pub fn new(root: &Path, dist_dir: &Path, protected_files: Vec<String>) -> Self {
        let dist_dir = if dist_dir.is_absolute() {
            dist_dir.to_path_buf()
        } else {
            root.join(dist_dir)
        };
        Self {
            root: root.to_path_buf(),
            dist_dir,
            protected_files,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dist_dir(&self) -> &Path {
        &self.dist_dir
    }

    /// Output root for one mode, e.g. `<dist>/js`
    pub fn mode_root(&self, mode: OutputMode) -> PathBuf {
        self.dist_dir.join(mode.as_str())
    }

    /// Resolve a root-relative path to an absolute one
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Path relative to the root, keeping only normal components
    pub fn relative(&self, path: &Path) -> PathBuf {
        let stripped = path.strip_prefix(&self.root).unwrap_or(path);
        stripped
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part),
                _ => None,
            })
            .collect()
    }

    /// Whether a path must never be transpiled or watched
    pub fn is_ignored(&self, path: &Path) -> bool {
        let absolute = self.resolve(path);
        if absolute.starts_with(&self.dist_dir) {
            return true;
        }

        let relative = self.relative(&absolute);
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let Some((file_name, dirs)) = parts.split_last() else {
            return true;
        };

        if parts.iter().any(|p| p == "node_modules" || p == ".git") {
            return true;
        }
        if dirs.iter().any(|p| p == "build") {
            return true;
        }
        if file_name.ends_with('~') || file_name.ends_with(LINT_CACHE_SUFFIX) {
            return true;
        }
        if self.protected_files.iter().any(|f| f == file_name) {
            return true;
        }

        absolute.is_dir()
    }

    /// Whether the extension is on the allow-list
    pub fn is_eligible_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
    }

    /// Combined gate used by the scan and the watcher
    pub fn is_transpilable(&self, path: &Path) -> bool {
        self.is_eligible_extension(path) && !self.is_ignored(path)
    }

    /// Deterministic output path for a source file and mode
    pub fn output_path(&self, source: &Path, mode: OutputMode) -> PathBuf {
        let relative = self.relative(&self.resolve(source));
        let target = self.mode_root(mode).join(relative);
        let normalize = target
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| NORMALIZED_EXTENSIONS.contains(&ext));
        if normalize {
            target.with_extension("js")
        } else {
            target
        }
    }

    /// Source files that could have produced an output file
    ///
    /// Returns an empty list for paths outside the mode's output root.
    pub fn candidate_sources(&self, output: &Path, mode: OutputMode) -> Vec<PathBuf> {
        let Ok(relative) = output.strip_prefix(self.mode_root(mode)) else {
            return Vec::new();
        };
        let source = self.root.join(relative);

        if source.extension().and_then(|e| e.to_str()) == Some("js") {
            SOURCE_EXTENSIONS
                .iter()
                .map(|ext| source.with_extension(ext))
                .collect()
        } else {
            vec![source]
        }
    }
}

/// Split a root-relative path into forward-slash separated segments
pub fn segments(relative: &Path) -> Vec<String> {
    relative
        .to_string_lossy()
        .replace('\\', "/")
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .map(str::to_string)
        .collect()
}
