use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};
use tracing::{debug, error};

use super::cache_file;
use super::engine::{LintEngine, LintFileResult, LintOptions};

/// Lint outcome for one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOutcome {
    pub repo: String,
    /// 0 when clean
    pub exit_code: i32,
    /// Per-file results, when the unit could report them
    pub results: Vec<LintFileResult>,
}

impl UnitOutcome {
    pub fn failed(repo: &str) -> Self {
        Self {
            repo: repo.to_string(),
            exit_code: 1,
            results: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.exit_code == 0
    }
}

/// Lints one repository. Implementations never panic on lint failures;
/// problems are reported through the exit code.
pub trait LintUnit: Send + Sync {
    fn run(&self, repo: &str, options: &LintOptions) -> UnitOutcome;
}

/// Exit code for a set of results: any error fails the repository
pub fn exit_code_for(results: &[LintFileResult]) -> i32 {
    if results.iter().any(|r| r.error_count > 0) {
        1
    } else {
        0
    }
}

/// Lints through a shared, long-lived engine in this process
pub struct InProcessLint {
    engine: Arc<dyn LintEngine>,
    root: PathBuf,
    cache_dir: PathBuf,
}

impl InProcessLint {
    pub fn new(engine: Arc<dyn LintEngine>, root: &Path, cache_dir: &Path) -> Self {
        Self {
            engine,
            root: root.to_path_buf(),
            cache_dir: cache_dir.to_path_buf(),
        }
    }
}

impl LintUnit for InProcessLint {
    fn run(&self, repo: &str, options: &LintOptions) -> UnitOutcome {
        let options = LintOptions {
            cache_file: options.cache.then(|| cache_file(&self.cache_dir, repo)),
            ..options.clone()
        };
        match self.engine.lint_files(&[self.root.join(repo)], &options) {
            Ok(results) => UnitOutcome {
                repo: repo.to_string(),
                exit_code: exit_code_for(&results),
                results,
            },
            Err(e) => {
                error!("Lint of {} failed: {}", repo, e);
                UnitOutcome::failed(repo)
            }
        }
    }
}

/// Lints in a child process; `{repo}` in the command is replaced by the
/// repository name. The child may print its results as JSON on stdout.
#[derive(Debug, Clone)]
pub struct SpawnedLint {
    command: Vec<String>,
    forward_options: bool,
}

impl SpawnedLint {
    /// Run an arbitrary command as-is
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            forward_options: false,
        }
    }

    /// Run a command that understands `--disable-cache` and `--fix`
    pub fn forwarding(command: Vec<String>) -> Self {
        Self {
            command,
            forward_options: true,
        }
    }

    fn args_for(&self, repo: &str, options: &LintOptions) -> Vec<String> {
        let mut args: Vec<String> = self
            .command
            .iter()
            .map(|arg| arg.replace("{repo}", repo))
            .collect();
        if self.forward_options {
            if !options.cache {
                args.push("--disable-cache".to_string());
            }
            if options.fix {
                args.push("--fix".to_string());
            }
        }
        args
    }
}

impl LintUnit for SpawnedLint {
    fn run(&self, repo: &str, options: &LintOptions) -> UnitOutcome {
        let args = self.args_for(repo, options);
        let Some((program, rest)) = args.split_first() else {
            error!("Empty spawn command for {}", repo);
            return UnitOutcome::failed(repo);
        };

        debug!("Spawning {} {}", program, rest.join(" "));
        let output = match Command::new(program).args(rest).output() {
            Ok(output) => output,
            Err(e) => {
                error!("Failed to spawn lint for {}: {}", repo, e);
                return UnitOutcome::failed(repo);
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            if !stderr.is_empty() {
                error!("Lint of {} exited with {}: {}", repo, output.status, stderr);
            }
        }

        let results = serde_json::from_slice::<Vec<LintFileResult>>(&output.stdout)
            .unwrap_or_else(|e| {
                debug!("No structured results from {}: {}", repo, e);
                Vec::new()
            });
        UnitOutcome {
            repo: repo.to_string(),
            // killed by a signal counts as a failure
            exit_code: output.status.code().unwrap_or(1),
            results,
        }
    }
}

/// Which path a repository took
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// A lint cache exists; lint in-process
    Cached,
    /// No cache yet; lint in a child process
    Uncached,
}

/// Sends repositories with an existing lint cache to the in-process unit and
/// everything else to the spawned one
pub struct LintCacheRouter {
    cache_dir: PathBuf,
    cached: Arc<dyn LintUnit>,
    uncached: Arc<dyn LintUnit>,
    routes: Mutex<FxHashMap<String, Route>>,
}

impl LintCacheRouter {
    pub fn new(cache_dir: &Path, cached: Arc<dyn LintUnit>, uncached: Arc<dyn LintUnit>) -> Self {
        Self {
            cache_dir: cache_dir.to_path_buf(),
            cached,
            uncached,
            routes: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn route(&self, repo: &str) -> Route {
        if cache_file(&self.cache_dir, repo).is_file() {
            Route::Cached
        } else {
            Route::Uncached
        }
    }

    /// Routes taken so far
    pub fn routes(&self) -> FxHashMap<String, Route> {
        self.routes
            .lock()
            .map(|routes| routes.clone())
            .unwrap_or_default()
    }
}

impl LintUnit for LintCacheRouter {
    fn run(&self, repo: &str, options: &LintOptions) -> UnitOutcome {
        let route = self.route(repo);
        if let Ok(mut routes) = self.routes.lock() {
            routes.insert(repo.to_string(), route);
        }
        debug!("Linting {} via {:?} path", repo, route);
        match route {
            Route::Cached => self.cached.run(repo, options),
            Route::Uncached => self.uncached.run(repo, options),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lint::engine::LintError;
    use tempfile::TempDir;

    struct FixedEngine {
        errors: usize,
    }

    impl LintEngine for FixedEngine {
        fn lint_files(
            &self,
            paths: &[PathBuf],
            options: &LintOptions,
        ) -> Result<Vec<LintFileResult>, LintError> {
            if self.errors == usize::MAX {
                return Err(LintError::EmptyCommand);
            }
            assert!(options.cache_file.is_some() == options.cache);
            Ok(vec![LintFileResult {
                file_path: paths[0].join("js/A.ts"),
                error_count: self.errors,
                ..Default::default()
            }])
        }
    }

    struct Named(&'static str);

    impl LintUnit for Named {
        fn run(&self, repo: &str, _: &LintOptions) -> UnitOutcome {
            UnitOutcome {
                repo: format!("{}:{}", self.0, repo),
                exit_code: 0,
                results: Vec::new(),
            }
        }
    }

    #[test]
    fn test_in_process_exit_codes() {
        let root = Path::new("/work");
        let cache = Path::new("/work/dist/eslint/cache");
        let options = LintOptions {
            cache: true,
            ..Default::default()
        };

        let clean = InProcessLint::new(Arc::new(FixedEngine { errors: 0 }), root, cache);
        let outcome = clean.run("foo", &options);
        assert!(outcome.is_ok());
        assert_eq!(outcome.results[0].file_path, PathBuf::from("/work/foo/js/A.ts"));

        let dirty = InProcessLint::new(Arc::new(FixedEngine { errors: 2 }), root, cache);
        assert_eq!(dirty.run("foo", &LintOptions::default()).exit_code, 1);

        let broken = InProcessLint::new(Arc::new(FixedEngine { errors: usize::MAX }), root, cache);
        assert_eq!(broken.run("foo", &options), UnitOutcome::failed("foo"));
    }

    #[test]
    fn test_router_follows_cache_files() {
        let temp = TempDir::new().unwrap();
        let cache_dir = temp.path().join("cache");
        std::fs::create_dir_all(&cache_dir).unwrap();
        std::fs::write(cache_file(&cache_dir, "b"), "{}").unwrap();

        let router = LintCacheRouter::new(&cache_dir, Arc::new(Named("cached")), Arc::new(Named("spawned")));

        assert_eq!(router.run("a", &LintOptions::default()).repo, "spawned:a");
        assert_eq!(router.run("b", &LintOptions::default()).repo, "cached:b");
        let routes = router.routes();
        assert_eq!(routes["a"], Route::Uncached);
        assert_eq!(routes["b"], Route::Cached);
    }

    #[test]
    fn test_spawned_args() {
        let unit = SpawnedLint::forwarding(vec![
            "chisel".to_string(),
            "lint-unit".to_string(),
            "{repo}".to_string(),
        ]);
        let options = LintOptions {
            cache: false,
            fix: true,
            cache_file: None,
        };
        assert_eq!(
            unit.args_for("foo", &options),
            vec!["chisel", "lint-unit", "foo", "--disable-cache", "--fix"]
        );

        let plain = SpawnedLint::new(vec!["lint.sh".to_string(), "{repo}".to_string()]);
        assert_eq!(plain.args_for("foo", &options), vec!["lint.sh", "foo"]);
    }

    #[test]
    fn test_spawn_failure_is_nonzero() {
        let unit = SpawnedLint::new(vec!["definitely-not-a-real-linter".to_string()]);
        assert_eq!(unit.run("foo", &LintOptions::default()).exit_code, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_spawned_exit_code_and_results() {
        let unit = SpawnedLint::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            r#"echo '[{"filePath":"/w/{repo}/a.js","errorCount":1}]'; exit 3"#.to_string(),
        ]);
        let outcome = unit.run("foo", &LintOptions::default());
        assert_eq!(outcome.exit_code, 3);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].file_path, PathBuf::from("/w/foo/a.js"));
    }
}
