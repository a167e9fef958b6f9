use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::cache::{MARKER_FILE_NAME, STATUS_FILE_NAME};
use crate::errors::ConfigError;

/// Default number of concurrent lint workers
pub const DEFAULT_LINT_WORKERS: usize = 8;

/// Extra paths transpiled for one repository beyond the common subdirectories
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoExtras {
    /// Additional subdirectories, visited recursively
    #[serde(default)]
    pub subdirs: Vec<String>,

    /// Individual files, relative to the repository
    #[serde(default)]
    pub files: Vec<String>,
}

/// Options controlling transpilation and watching
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranspileConfig {
    /// Directory holding all checked-out repositories (default: ..)
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Output directory, relative to root (default: dist)
    #[serde(default = "default_dist_dir")]
    pub dist_dir: PathBuf,

    /// Status cache file name inside the dist directory
    #[serde(default = "default_status_file")]
    pub status_file: String,

    /// Last-changed marker file name inside the dist directory
    #[serde(default = "default_marker_file")]
    pub marker_file: String,

    /// Newline-separated list of active repositories, relative to root
    #[serde(default = "default_active_repos_file")]
    pub active_repos_file: PathBuf,

    /// Subdirectories of every repository that may contain sources
    #[serde(default = "default_subdirs")]
    pub subdirs: Vec<String>,

    /// Per-repository extra subdirectories and files
    #[serde(default = "default_repo_extras")]
    pub repo_extras: BTreeMap<String, RepoExtras>,

    /// Repository whose brand folders are transpiled
    #[serde(default = "default_brand_repo")]
    pub brand_repo: String,

    /// Extra brand folders inside the brand repository
    #[serde(default)]
    pub brands: Vec<String>,

    /// Repositories that are also emitted as CommonJS
    #[serde(default = "default_commonjs_repos")]
    pub commonjs_repos: Vec<String>,

    /// Clear the status cache on startup (default: false)
    #[serde(default)]
    pub clean: bool,

    /// Log the reason for every recompilation (default: false)
    #[serde(default)]
    pub verbose: bool,

    /// Transpile every active repository (default: false)
    #[serde(default)]
    pub all: bool,

    /// Repositories to transpile in addition to the active list
    #[serde(default)]
    pub repos: Vec<String>,

    /// Minify shader sources (default: false)
    #[serde(default)]
    pub minify_wgsl: bool,

    /// External compiler for module output; `{file}` is replaced by the source path
    #[serde(default = "default_compiler_command")]
    pub compiler_command: Vec<String>,

    /// External compiler for CommonJS output
    #[serde(default = "default_commonjs_compiler_command")]
    pub commonjs_compiler_command: Vec<String>,
}

fn default_root() -> PathBuf {
    PathBuf::from("..")
}

fn default_dist_dir() -> PathBuf {
    PathBuf::from("dist")
}

fn default_status_file() -> String {
    STATUS_FILE_NAME.to_string()
}

fn default_marker_file() -> String {
    MARKER_FILE_NAME.to_string()
}

fn default_active_repos_file() -> PathBuf {
    PathBuf::from("data/active-repos")
}

fn default_subdirs() -> Vec<String> {
    ["js", "images", "mipmaps", "sounds"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_repo_extras() -> BTreeMap<String, RepoExtras> {
    let subdirs = |dirs: &[&str]| RepoExtras {
        subdirs: dirs.iter().map(|s| s.to_string()).collect(),
        files: Vec::new(),
    };

    let mut extras = BTreeMap::new();
    extras.insert("phet-io-wrappers".to_string(), subdirs(&["common"]));
    extras.insert("phet-io-sim-specific".to_string(), subdirs(&["repos"]));
    extras.insert("my-solar-system".to_string(), subdirs(&["shaders"]));
    extras.insert("alpenglow".to_string(), subdirs(&["wgsl"]));
    extras.insert(
        "brand".to_string(),
        subdirs(&["phet", "phet-io", "adapted-from-phet"]),
    );
    extras.insert(
        "sherpa".to_string(),
        RepoExtras {
            subdirs: Vec::new(),
            files: vec!["lib/game-up-camera-1.0.0.js".to_string()],
        },
    );
    extras
}

fn default_brand_repo() -> String {
    "brand".to_string()
}

fn default_commonjs_repos() -> Vec<String> {
    ["chipper", "perennial", "perennial-alias"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_compiler_command() -> Vec<String> {
    [
        "npx",
        "babel",
        "--no-babelrc",
        "--presets",
        "@babel/preset-typescript",
        "--source-maps",
        "inline",
        "--filename",
        "{file}",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_commonjs_compiler_command() -> Vec<String> {
    let mut command = default_compiler_command();
    command.extend(
        ["--plugins", "@babel/plugin-transform-modules-commonjs"]
            .iter()
            .map(|s| s.to_string()),
    );
    command
}

impl Default for TranspileConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            dist_dir: default_dist_dir(),
            status_file: default_status_file(),
            marker_file: default_marker_file(),
            active_repos_file: default_active_repos_file(),
            subdirs: default_subdirs(),
            repo_extras: default_repo_extras(),
            brand_repo: default_brand_repo(),
            brands: Vec::new(),
            commonjs_repos: default_commonjs_repos(),
            clean: false,
            verbose: false,
            all: false,
            repos: Vec::new(),
            minify_wgsl: false,
            compiler_command: default_compiler_command(),
            commonjs_compiler_command: default_commonjs_compiler_command(),
        }
    }
}

impl TranspileConfig {
    /// Absolute dist directory under the given root
    pub fn dist_path(&self, root: &Path) -> PathBuf {
        root.join(&self.dist_dir)
    }

    pub fn status_path(&self, root: &Path) -> PathBuf {
        self.dist_path(root).join(&self.status_file)
    }

    pub fn marker_path(&self, root: &Path) -> PathBuf {
        self.dist_path(root).join(&self.marker_file)
    }
}

/// Options controlling lint dispatch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LintConfig {
    /// Number of concurrent workers (default: 8)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Directory of per-repository lint caches, relative to root
    #[serde(default = "default_lint_cache_dir")]
    pub cache_dir: PathBuf,

    /// Use the lint cache (default: true)
    #[serde(default = "default_true")]
    pub cache: bool,

    /// Write autofixes to disk (default: false)
    #[serde(default)]
    pub fix: bool,

    /// Print a developer assignment list for failing repos (default: false)
    #[serde(default)]
    pub chip_away: bool,

    /// Show a progress bar while linting (default: true)
    #[serde(default = "default_true")]
    pub show_progress_bar: bool,

    /// Repositories that are never linted
    #[serde(default = "default_skip_repos")]
    pub skip_repos: Vec<String>,

    /// JSON map of repo -> { responsibleDevs: [...] }, relative to root
    #[serde(default = "default_responsible_devs_file")]
    pub responsible_devs_file: PathBuf,

    /// Lint engine command; paths and options are appended
    #[serde(default = "default_engine_command")]
    pub engine_command: Vec<String>,

    /// Command used for uncached repositories; `{repo}` is replaced by the
    /// repository name. Defaults to re-invoking this binary.
    #[serde(default)]
    pub spawn_command: Option<Vec<String>>,
}

fn default_true() -> bool {
    true
}

fn default_workers() -> usize {
    DEFAULT_LINT_WORKERS
}

fn default_lint_cache_dir() -> PathBuf {
    PathBuf::from("dist/eslint/cache")
}

fn default_skip_repos() -> Vec<String> {
    ["babel", "phet-info", "sherpa", "smithers", "tasks"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_responsible_devs_file() -> PathBuf {
    PathBuf::from("data/responsible-devs.json")
}

fn default_engine_command() -> Vec<String> {
    vec!["npx".to_string(), "eslint".to_string()]
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            cache_dir: default_lint_cache_dir(),
            cache: true,
            fix: false,
            chip_away: false,
            show_progress_bar: true,
            skip_repos: default_skip_repos(),
            responsible_devs_file: default_responsible_devs_file(),
            engine_command: default_engine_command(),
            spawn_command: None,
        }
    }
}

impl LintConfig {
    /// Lint cache file for one repository
    pub fn cache_file(&self, root: &Path, repo: &str) -> PathBuf {
        crate::lint::cache_file(&root.join(&self.cache_dir), repo)
    }
}

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChiselConfig {
    #[serde(default)]
    pub transpile: TranspileConfig,

    #[serde(default)]
    pub lint: LintConfig,
}

/// Command-line values that take precedence over the config file
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub root: Option<PathBuf>,
    pub clean: Option<bool>,
    pub verbose: Option<bool>,
    pub all: Option<bool>,
    pub repos: Option<Vec<String>>,
    pub brands: Option<Vec<String>>,
    pub minify_wgsl: Option<bool>,
    pub workers: Option<usize>,
    pub lint_cache: Option<bool>,
    pub fix: Option<bool>,
    pub chip_away: Option<bool>,
    pub show_progress_bar: Option<bool>,
}

impl ChiselConfig {
    /// Load configuration from a YAML (`.yaml`/`.yml`) or JSON file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let config: ChiselConfig = if is_yaml {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Write a default configuration file
    pub fn init_file(path: &Path) -> Result<(), ConfigError> {
        let config = ChiselConfig::default();
        let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
        let text = if is_json {
            serde_json::to_string_pretty(&config)?
        } else {
            serde_yaml::to_string(&config)?
        };
        std::fs::write(path, text).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lint.workers == 0 {
            return Err(ConfigError::Invalid(
                "lint.workers must be at least 1".to_string(),
            ));
        }
        if self.transpile.compiler_command.is_empty()
            || self.transpile.commonjs_compiler_command.is_empty()
        {
            return Err(ConfigError::Invalid(
                "compiler commands must not be empty".to_string(),
            ));
        }
        if self.lint.engine_command.is_empty() {
            return Err(ConfigError::Invalid(
                "lint.engineCommand must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply command-line overrides
    pub fn merge(&mut self, overrides: &CliOverrides) {
        let transpile = &mut self.transpile;
        if let Some(root) = &overrides.root {
            transpile.root = root.clone();
        }
        if let Some(clean) = overrides.clean {
            transpile.clean = clean;
        }
        if let Some(verbose) = overrides.verbose {
            transpile.verbose = verbose;
        }
        if let Some(all) = overrides.all {
            transpile.all = all;
        }
        if let Some(repos) = &overrides.repos {
            transpile.repos = repos.clone();
        }
        if let Some(brands) = &overrides.brands {
            transpile.brands = brands.clone();
        }
        if let Some(minify) = overrides.minify_wgsl {
            transpile.minify_wgsl = minify;
        }

        let lint = &mut self.lint;
        if let Some(workers) = overrides.workers {
            lint.workers = workers.max(1);
        }
        if let Some(cache) = overrides.lint_cache {
            lint.cache = cache;
        }
        if let Some(fix) = overrides.fix {
            lint.fix = fix;
        }
        if let Some(chip_away) = overrides.chip_away {
            lint.chip_away = chip_away;
        }
        if let Some(progress) = overrides.show_progress_bar {
            lint.show_progress_bar = progress;
        }
    }
}

/// Resolve a possibly relative root against the working directory
pub fn absolute_root(root: &Path) -> std::io::Result<PathBuf> {
    let joined = if root.is_absolute() {
        root.to_path_buf()
    } else {
        std::env::current_dir()?.join(root)
    };
    Ok(joined.canonicalize().unwrap_or(joined))
}

/// Parse the active repository list: one name per line, blanks skipped
pub fn parse_repo_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
