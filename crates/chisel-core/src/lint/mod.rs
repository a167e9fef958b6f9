//! Parallel lint dispatch
//!
//! Repositories are linted by a fixed pool of workers. A repository whose lint
//! cache already exists is linted in-process through a shared engine; the
//! rest are linted in child processes so that their first, expensive run does
//! not contend for the shared engine.

pub mod aggregate;
pub mod engine;
pub mod pool;
pub mod router;

pub use aggregate::{chip_away, LintAggregator, LintReport};
pub use engine::{EslintEngine, LintEngine, LintError, LintFileResult, LintMessage, LintOptions};
pub use pool::{lint_with_workers, WorkerPool};
pub use router::{
    exit_code_for, InProcessLint, LintCacheRouter, LintUnit, Route, SpawnedLint, UnitOutcome,
};

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::LintConfig;
use crate::errors::{BuildError, BuildResult};
use crate::paths::LINT_CACHE_SUFFIX;

/// Cache file of one repository inside `cache_dir`
pub fn cache_file(cache_dir: &Path, repo: &str) -> PathBuf {
    cache_dir.join(format!("{}{}", repo, LINT_CACHE_SUFFIX))
}

/// Drop skipped and missing repositories, and duplicates
pub fn filter_repos(repos: &[String], root: &Path, skip_repos: &[String]) -> Vec<String> {
    let mut kept: Vec<String> = Vec::new();
    for repo in repos {
        if skip_repos.contains(repo) {
            debug!("Skipping {} (never linted)", repo);
        } else if !root.join(repo).is_dir() {
            debug!("Skipping {} (not checked out)", repo);
        } else if !kept.contains(repo) {
            kept.push(repo.clone());
        }
    }
    kept
}

/// Delete the cache files of `repos` so their next lint starts from scratch
pub fn reset_caches(cache_dir: &Path, repos: &[String]) -> BuildResult<usize> {
    let mut removed = 0;
    for repo in repos {
        let file = cache_file(cache_dir, repo);
        if file.is_file() {
            std::fs::remove_file(&file).map_err(|e| BuildError::io(&file, e))?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Lint `repos` under `root` through `unit` and aggregate the outcome
///
/// Honors `skipRepos`, and with the cache disabled, deletes existing cache
/// files first.
pub fn lint_repos<P>(
    root: &Path,
    config: &LintConfig,
    repos: &[String],
    unit: &dyn LintUnit,
    progress: P,
) -> BuildResult<LintReport>
where
    P: Fn(usize, usize) + Sync,
{
    let repos = filter_repos(repos, root, &config.skip_repos);
    let cache_dir = root.join(&config.cache_dir);
    if !config.cache {
        let removed = reset_caches(&cache_dir, &repos)?;
        debug!("Removed {} lint cache files", removed);
    }

    let options = LintOptions {
        cache: config.cache,
        fix: config.fix,
        cache_file: None,
    };
    info!("Linting {} repos with {} workers", repos.len(), config.workers);
    let outcomes = lint_with_workers(&repos, config.workers, unit, &options, progress);

    Ok(LintAggregator::new(root, &config.responsible_devs_file).aggregate(outcomes))
}
