//! Temporary multi-repository workspaces

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

use chisel_core::config::{LintConfig, TranspileConfig};
use chisel_core::OutputMode;

/// Source text the mock compiler rejects
pub const SYNTAX_ERROR: &str = "SYNTAX ERROR";

pub fn valid_source(name: &str) -> String {
    format!("export const {} = 1;\n", name)
}

pub fn broken_source() -> String {
    format!("const = ; // {}\n", SYNTAX_ERROR)
}

/// A checkout root with repositories, backed by a temporary directory
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        Self { dir }
    }

    /// Canonical root, so status keys match the paths the classifier produces
    pub fn root(&self) -> PathBuf {
        self.dir
            .path()
            .canonicalize()
            .unwrap_or_else(|_| self.dir.path().to_path_buf())
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }

    /// Write a file, creating parent directories
    pub fn write(&self, relative: &str, text: &str) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent dir");
        }
        fs::write(&path, text).expect("failed to write fixture");
        path
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.path(relative)).expect("failed to read fixture")
    }

    pub fn remove(&self, relative: &str) {
        fs::remove_file(self.path(relative)).expect("failed to remove fixture");
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.path(relative).exists()
    }

    pub fn mkdir(&self, relative: &str) -> PathBuf {
        let path = self.path(relative);
        fs::create_dir_all(&path).expect("failed to create dir");
        path
    }

    /// Write the active repository list
    pub fn set_active_repos(&self, repos: &[&str]) {
        let mut text = repos.join("\n");
        text.push('\n');
        self.write("data/active-repos", &text);
    }

    /// Output path of `source` in the default dist directory
    pub fn output(&self, source: &str, mode: OutputMode) -> PathBuf {
        let js = match source.rsplit_once('.') {
            Some((stem, _)) => format!("{}.js", stem),
            None => source.to_string(),
        };
        self.root().join("dist").join(mode.as_str()).join(js)
    }

    pub fn transpile_config(&self) -> TranspileConfig {
        TranspileConfig {
            root: self.root(),
            ..Default::default()
        }
    }

    pub fn lint_config(&self) -> LintConfig {
        LintConfig {
            show_progress_bar: false,
            ..Default::default()
        }
    }

    /// Create an empty lint cache file for `repo`
    pub fn touch_lint_cache(&self, repo: &str) -> PathBuf {
        let path = self.lint_config().cache_file(&self.root(), repo);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create cache dir");
        }
        fs::write(&path, "{}").expect("failed to write lint cache");
        path
    }

    pub fn status_json(&self) -> String {
        fs::read_to_string(self.transpile_config().status_path(&self.root()))
            .expect("failed to read status file")
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

