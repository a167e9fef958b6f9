//! Incremental transpilation of repository sources into the dist tree

use std::collections::BTreeMap;
use std::fmt;
use std::ops::AddAssign;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::cache::{digest_file, modified_ms, StatusStore};
use crate::compiler::{CommandCompiler, Compiler, ExtensionDispatch, ShaderCompiler};
use crate::config::{parse_repo_list, RepoExtras, TranspileConfig};
use crate::errors::{BuildError, BuildResult, ConfigError};
use crate::paths::{OutputMode, PathClassifier};

/// Which directories and files of each repository hold sources
#[derive(Debug, Clone)]
pub struct RepoLayout {
    subdirs: Vec<String>,
    extras: BTreeMap<String, RepoExtras>,
    brand_repo: String,
    brands: Vec<String>,
    commonjs_repos: Vec<String>,
}

impl RepoLayout {
    pub fn from_config(config: &TranspileConfig) -> Self {
        Self {
            subdirs: config.subdirs.clone(),
            extras: config.repo_extras.clone(),
            brand_repo: config.brand_repo.clone(),
            brands: config.brands.clone(),
            commonjs_repos: config.commonjs_repos.clone(),
        }
    }

    /// Subdirectories visited for `repo`: the common set, then per-repo extras,
    /// then any requested brands for the brand repository
    pub fn subdirs_for(&self, repo: &str) -> Vec<String> {
        let extras = self.extras.get(repo).map(|e| e.subdirs.as_slice()).unwrap_or(&[]);
        let brands: &[String] = if repo == self.brand_repo { &self.brands } else { &[] };

        let mut subdirs: Vec<String> = Vec::new();
        for subdir in self.subdirs.iter().chain(extras).chain(brands) {
            if !subdirs.contains(subdir) {
                subdirs.push(subdir.clone());
            }
        }
        subdirs
    }

    /// Individual files transpiled for `repo`, relative to the repository
    pub fn extra_files(&self, repo: &str) -> &[String] {
        self.extras
            .get(repo)
            .map(|e| e.files.as_slice())
            .unwrap_or(&[])
    }

    pub fn modes_for(&self, repo: &str) -> &'static [OutputMode] {
        if self.commonjs_repos.iter().any(|r| r == repo) {
            &OutputMode::ALL
        } else {
            &[OutputMode::Module]
        }
    }

    /// Whether a path inside `repo` (given as its remaining segments) belongs
    /// to a transpiled location
    pub fn covers(&self, repo: &str, rest: &[String]) -> bool {
        let Some(first) = rest.first() else {
            return false;
        };
        if self.subdirs_for(repo).iter().any(|s| s == first) {
            return true;
        }
        let joined = rest.join("/");
        self.extra_files(repo).iter().any(|f| *f == joined)
    }
}

/// Why a file is being recompiled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    NotCached,
    Changed,
    NoTarget,
    TargetModified,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StaleReason::NotCached => "not cached",
            StaleReason::Changed => "changed",
            StaleReason::NoTarget => "no target",
            StaleReason::TargetModified => "target modified",
        })
    }
}

/// Result of one `compile_if_needed` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileOutcome {
    /// Excluded by the path classifier
    Ignored,
    /// Cache hit, nothing written
    Fresh,
    Compiled(StaleReason),
    /// Source unreadable or rejected by the compiler; nothing recorded
    Failed,
}

/// Counters for a batch of transpile work
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TranspileStats {
    pub compiled: usize,
    pub fresh: usize,
    pub failed: usize,
    pub removed: usize,
}

impl TranspileStats {
    pub fn record(&mut self, outcome: CompileOutcome) {
        match outcome {
            CompileOutcome::Ignored => {}
            CompileOutcome::Fresh => self.fresh += 1,
            CompileOutcome::Compiled(_) => self.compiled += 1,
            CompileOutcome::Failed => self.failed += 1,
        }
    }
}

impl AddAssign for TranspileStats {
    fn add_assign(&mut self, other: Self) {
        self.compiled += other.compiled;
        self.fresh += other.fresh;
        self.failed += other.failed;
        self.removed += other.removed;
    }
}

/// The default compiler chain: shaders are wrapped in-process, everything
/// else goes through the configured external command
pub fn default_compiler(root: &Path, config: &TranspileConfig) -> Box<dyn Compiler> {
    Box::new(ExtensionDispatch::new(
        Box::new(CommandCompiler::new(
            config.compiler_command.clone(),
            config.commonjs_compiler_command.clone(),
            root,
        )),
        Box::new(ShaderCompiler::new(config.minify_wgsl)),
    ))
}

/// Owns the status store and drives the compiler over repositories
pub struct Transpiler {
    classifier: PathClassifier,
    layout: RepoLayout,
    status: StatusStore,
    compiler: Box<dyn Compiler>,
    verbose: bool,
    active_repos_path: PathBuf,
    active_repos: Vec<String>,
    /// Requested on the command line but not in the active list
    extra_repos: Vec<String>,
}

impl Transpiler {
    /// Load the status store under `root` (clearing it when configured to)
    /// and read the active repository list
    pub fn new(root: &Path, config: &TranspileConfig, compiler: Box<dyn Compiler>) -> BuildResult<Self> {
        let mut status = StatusStore::load(&config.status_path(root))?;
        if config.clean {
            status.clear()?;
        }
        Ok(Self::with_store(root, config, status, compiler))
    }

    /// Build a transpiler around an already loaded store
    pub fn with_store(
        root: &Path,
        config: &TranspileConfig,
        status: StatusStore,
        compiler: Box<dyn Compiler>,
    ) -> Self {
        let classifier = PathClassifier::new(
            root,
            &config.dist_dir,
            vec![config.status_file.clone(), config.marker_file.clone()],
        );
        let active_repos_path = classifier.resolve(&config.active_repos_file);
        let active_repos = read_active_repos(&active_repos_path);
        Self {
            classifier,
            layout: RepoLayout::from_config(config),
            status,
            compiler,
            verbose: config.verbose,
            active_repos_path,
            active_repos,
            extra_repos: Vec::new(),
        }
    }

    pub fn classifier(&self) -> &PathClassifier {
        &self.classifier
    }

    pub fn layout(&self) -> &RepoLayout {
        &self.layout
    }

    pub fn status(&self) -> &StatusStore {
        &self.status
    }

    pub fn active_repos(&self) -> &[String] {
        &self.active_repos
    }

    pub fn active_repos_path(&self) -> &Path {
        &self.active_repos_path
    }

    pub fn is_active(&self, repo: &str) -> bool {
        self.active_repos.iter().any(|r| r == repo)
    }

    /// Whether changes under `repo` should be picked up while watching
    pub fn is_tracked(&self, repo: &str) -> bool {
        self.is_active(repo) || self.extra_repos.iter().any(|r| r == repo)
    }

    pub fn track_repos(&mut self, repos: &[String]) {
        for repo in repos {
            if !self.is_tracked(repo) {
                self.extra_repos.push(repo.clone());
            }
        }
    }

    /// Re-read the active repository list, returning repos that were not
    /// tracked before
    pub fn reload_active_repos(&mut self) -> Vec<String> {
        let reloaded = read_active_repos(&self.active_repos_path);
        let added = reloaded
            .iter()
            .filter(|repo| !self.is_active(repo))
            .cloned()
            .collect();
        self.active_repos = reloaded;
        added
    }

    /// Compile `path` for `mode` unless the cached output is still valid
    ///
    /// Read and compile failures are logged and reported as
    /// [`CompileOutcome::Failed`]; only disk failures on the output or status
    /// file are returned as errors.
    pub fn compile_if_needed(&mut self, path: &Path, mode: OutputMode) -> BuildResult<CompileOutcome> {
        let source = self.classifier.resolve(path);
        if !self.classifier.is_transpilable(&source) {
            return Ok(CompileOutcome::Ignored);
        }

        let start = Instant::now();
        let (text, source_digest) = match digest_file(&source) {
            Ok(read) => read,
            Err(e) => {
                error!("Failed to read {}: {}", source.display(), e);
                return Ok(CompileOutcome::Failed);
            }
        };
        let target = self.classifier.output_path(&source, mode);
        let target_ms = modified_ms(&target);

        let Some(reason) = self.stale_reason(&source, mode, &source_digest, target_ms) else {
            return Ok(CompileOutcome::Fresh);
        };

        let output = match self.compiler.compile(&text, &source, mode) {
            Ok(output) => output,
            Err(e) => {
                error!("Failed to compile {} ({}): {}", source.display(), mode, e);
                return Ok(CompileOutcome::Failed);
            }
        };

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
        }
        std::fs::write(&target, output).map_err(|e| BuildError::io(&target, e))?;
        let written_ms = modified_ms(&target).ok_or_else(|| {
            BuildError::io(
                &target,
                std::io::Error::new(std::io::ErrorKind::NotFound, "output missing after write"),
            )
        })?;
        self.status.record(&source, mode, &source_digest, written_ms)?;

        let elapsed = start.elapsed().as_millis();
        if self.verbose {
            info!("{} ms: {} ({})", elapsed, source.display(), reason);
        } else {
            info!("{} ms: {}", elapsed, source.display());
        }
        Ok(CompileOutcome::Compiled(reason))
    }

    fn stale_reason(
        &self,
        source: &Path,
        mode: OutputMode,
        current_digest: &str,
        target_ms: Option<u64>,
    ) -> Option<StaleReason> {
        let Some(entry) = self.status.get(source, mode) else {
            return Some(StaleReason::NotCached);
        };
        if entry.source_digest != current_digest {
            return Some(StaleReason::Changed);
        }
        match target_ms {
            None => Some(StaleReason::NoTarget),
            Some(ms) if ms != entry.target_modified_ms => Some(StaleReason::TargetModified),
            Some(_) => None,
        }
    }

    /// Compile one file for each of `modes`
    pub fn visit_file(&mut self, path: &Path, modes: &[OutputMode]) -> BuildResult<TranspileStats> {
        let mut stats = TranspileStats::default();
        for &mode in modes {
            stats.record(self.compile_if_needed(path, mode)?);
        }
        Ok(stats)
    }

    /// Recursively compile every file below `dir`; a missing directory is a no-op
    pub fn visit_directory(&mut self, dir: &Path, modes: &[OutputMode]) -> BuildResult<TranspileStats> {
        let mut stats = TranspileStats::default();
        if !dir.is_dir() {
            return Ok(stats);
        }
        let files = walk_files(WalkDir::new(dir).follow_links(false).sort_by_file_name());
        for file in files {
            stats += self.visit_file(&file, modes)?;
        }
        Ok(stats)
    }

    /// Visit every known location of one repository
    pub fn transpile_repo(&mut self, repo: &str) -> BuildResult<TranspileStats> {
        let modes = self.layout.modes_for(repo);
        let repo_dir = self.classifier.root().join(repo);
        let mut stats = TranspileStats::default();

        for subdir in self.layout.subdirs_for(repo) {
            stats += self.visit_directory(&repo_dir.join(subdir), modes)?;
        }
        let files: Vec<PathBuf> = self
            .layout
            .extra_files(repo)
            .iter()
            .map(|f| repo_dir.join(f))
            .collect();
        for file in files {
            if file.is_file() {
                stats += self.visit_file(&file, modes)?;
            }
        }

        debug!("Transpiled {}: {:?}", repo, stats);
        Ok(stats)
    }

    pub fn transpile_repos(&mut self, repos: &[String]) -> BuildResult<TranspileStats> {
        let mut stats = TranspileStats::default();
        for repo in repos {
            stats += self.transpile_repo(repo)?;
        }
        Ok(stats)
    }

    /// Transpile every active repository
    pub fn transpile_all(&mut self) -> BuildResult<TranspileStats> {
        let repos = self.active_repos.clone();
        self.transpile_repos(&repos)
    }

    /// Initial pass for a run: with `all`, prune stale outputs and transpile
    /// the active list plus `repos`; otherwise transpile just `repos`
    pub fn transpile_selected(&mut self, all: bool, repos: &[String]) -> BuildResult<TranspileStats> {
        if !all && repos.is_empty() {
            return Err(ConfigError::Invalid("must include repos or --all".to_string()).into());
        }

        let mut stats = TranspileStats::default();
        let mut selected: Vec<String> = Vec::new();
        if all {
            for mode in OutputMode::ALL {
                stats.removed += self.prune_stale_outputs(mode)?;
            }
            selected.extend(self.active_repos.iter().cloned());
        }
        for repo in repos {
            if !selected.contains(repo) {
                selected.push(repo.clone());
            }
        }
        self.track_repos(repos);
        stats += self.transpile_repos(&selected)?;
        Ok(stats)
    }

    /// Delete outputs of `mode` whose source no longer exists, returning the
    /// number of files removed
    pub fn prune_stale_outputs(&mut self, mode: OutputMode) -> BuildResult<usize> {
        let start = Instant::now();
        let mode_root = self.classifier.mode_root(mode);
        if !mode_root.is_dir() {
            return Ok(0);
        }

        let outputs = walk_files(WalkDir::new(&mode_root).follow_links(false));

        let mut removed = 0;
        for output in outputs {
            let candidates = self.classifier.candidate_sources(&output, mode);
            if candidates.iter().any(|c| c.exists()) {
                continue;
            }
            std::fs::remove_file(&output).map_err(|e| BuildError::io(&output, e))?;
            for candidate in &candidates {
                self.status.remove(candidate, mode)?;
            }
            debug!("Removed stale output {}", output.display());
            removed += 1;
        }

        info!(
            "Clean stale dist/{} files finished in {}ms ({} removed)",
            mode,
            start.elapsed().as_millis(),
            removed
        );
        Ok(removed)
    }

    /// Remove the outputs and status entries of a deleted source, in every mode
    pub fn remove_outputs(&mut self, path: &Path) -> BuildResult<usize> {
        let start = Instant::now();
        let source = self.classifier.resolve(path);
        let mut removed = 0;
        for mode in OutputMode::ALL {
            let target = self.classifier.output_path(&source, mode);
            if !target.is_file() {
                continue;
            }
            let candidates = self.classifier.candidate_sources(&target, mode);
            if candidates.iter().any(|c| c.exists()) {
                // a sibling source still owns this output
                self.status.remove(&source, mode)?;
                continue;
            }
            std::fs::remove_file(&target).map_err(|e| BuildError::io(&target, e))?;
            self.status.remove(&source, mode)?;
            removed += 1;
        }
        if removed > 0 {
            info!("{} ms: {} (deleted)", start.elapsed().as_millis(), source.display());
        }
        Ok(removed)
    }
}

/// Files below a walk root; unreadable entries are skipped with a warning
fn walk_files(walk: WalkDir) -> Vec<PathBuf> {
    walk.into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable path: {}", e);
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect()
}

/// Read the active repository list; a missing file means no active repos
fn read_active_repos(path: &Path) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => parse_repo_list(&text),
        Err(e) => {
            warn!("Couldn't read active repos from {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CompileError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Prefixes output with the mode and rejects sources containing "SYNTAX ERROR"
    struct CountingCompiler {
        calls: Arc<AtomicUsize>,
    }

    impl Compiler for CountingCompiler {
        fn compile(&self, source: &str, _: &Path, mode: OutputMode) -> Result<String, CompileError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if source.contains("SYNTAX ERROR") {
                return Err(CompileError::Rejected("unexpected token".to_string()));
            }
            Ok(format!("// {}\n{}", mode, source))
        }
    }

    fn write(root: &Path, relative: &str, text: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, text).unwrap();
    }

    fn setup() -> (TempDir, TranspileConfig) {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "data/active-repos", "foo\nbar\n");
        let config = TranspileConfig {
            root: temp.path().to_path_buf(),
            ..Default::default()
        };
        (temp, config)
    }

    fn transpiler(temp: &TempDir, config: &TranspileConfig) -> (Transpiler, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let compiler = CountingCompiler {
            calls: Arc::clone(&calls),
        };
        let t = Transpiler::new(temp.path(), config, Box::new(compiler)).unwrap();
        (t, calls)
    }

    #[test]
    fn test_transpile_repo_is_idempotent() {
        let (temp, config) = setup();
        write(temp.path(), "foo/js/A.ts", "const a = 1;");
        write(temp.path(), "foo/js/nested/B.js", "const b = 2;");
        let (mut t, calls) = transpiler(&temp, &config);

        let first = t.transpile_repo("foo").unwrap();
        assert_eq!(first.compiled, 2);
        assert_eq!(t.status().len(), 2);
        assert!(temp.path().join("dist/js/foo/js/A.js").is_file());
        assert!(temp.path().join("dist/js/foo/js/nested/B.js").is_file());

        let status_before = std::fs::read_to_string(config.status_path(temp.path())).unwrap();
        let second = t.transpile_repo("foo").unwrap();
        assert_eq!(second.compiled, 0);
        assert_eq!(second.fresh, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let status_after = std::fs::read_to_string(config.status_path(temp.path())).unwrap();
        assert_eq!(status_before, status_after);
    }

    #[test]
    fn test_cache_survives_restart() {
        let (temp, config) = setup();
        write(temp.path(), "foo/js/A.ts", "const a = 1;");
        {
            let (mut t, _) = transpiler(&temp, &config);
            t.transpile_repo("foo").unwrap();
        }
        let (mut t, calls) = transpiler(&temp, &config);
        let stats = t.transpile_repo("foo").unwrap();
        assert_eq!(stats.fresh, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_content_change_and_missing_target_recompile() {
        let (temp, config) = setup();
        write(temp.path(), "foo/js/A.ts", "const a = 1;");
        let (mut t, _) = transpiler(&temp, &config);
        let source = temp.path().join("foo/js/A.ts");

        assert_eq!(
            t.compile_if_needed(&source, OutputMode::Module).unwrap(),
            CompileOutcome::Compiled(StaleReason::NotCached)
        );

        write(temp.path(), "foo/js/A.ts", "const a = 2;");
        assert_eq!(
            t.compile_if_needed(&source, OutputMode::Module).unwrap(),
            CompileOutcome::Compiled(StaleReason::Changed)
        );
        let output = std::fs::read_to_string(temp.path().join("dist/js/foo/js/A.js")).unwrap();
        assert!(output.contains("const a = 2;"));

        std::fs::remove_file(temp.path().join("dist/js/foo/js/A.js")).unwrap();
        assert_eq!(
            t.compile_if_needed(&source, OutputMode::Module).unwrap(),
            CompileOutcome::Compiled(StaleReason::NoTarget)
        );
        assert_eq!(
            t.compile_if_needed(&source, OutputMode::Module).unwrap(),
            CompileOutcome::Fresh
        );
    }

    #[test]
    fn test_failure_is_isolated() {
        let (temp, config) = setup();
        write(temp.path(), "foo/js/A.ts", "const a = 1;");
        write(temp.path(), "foo/js/B.ts", "SYNTAX ERROR");
        write(temp.path(), "foo/js/C.ts", "const c = 3;");
        let (mut t, _) = transpiler(&temp, &config);

        let stats = t.transpile_repo("foo").unwrap();

        assert_eq!(stats.compiled, 2);
        assert_eq!(stats.failed, 1);
        let broken = temp.path().join("foo/js/B.ts");
        assert!(t.status().get(&broken, OutputMode::Module).is_none());
        assert!(!temp.path().join("dist/js/foo/js/B.js").exists());

        // a failed file is retried on the next pass
        let stats = t.transpile_repo("foo").unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.fresh, 2);
    }

    #[test]
    fn test_ignored_paths_are_not_compiled() {
        let (temp, config) = setup();
        write(temp.path(), "foo/js/node_modules/x.js", "x");
        write(temp.path(), "foo/js/README.md", "docs");
        let (mut t, calls) = transpiler(&temp, &config);

        let stats = t.transpile_repo("foo").unwrap();

        assert_eq!(stats, TranspileStats::default());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_commonjs_repos_emit_both_modes() {
        let (temp, config) = setup();
        write(temp.path(), "chipper/js/tool.ts", "export const x = 1;");
        let (mut t, _) = transpiler(&temp, &config);

        let stats = t.transpile_repo("chipper").unwrap();

        assert_eq!(stats.compiled, 2);
        let module = std::fs::read_to_string(temp.path().join("dist/js/chipper/js/tool.js")).unwrap();
        let commonjs =
            std::fs::read_to_string(temp.path().join("dist/commonjs/chipper/js/tool.js")).unwrap();
        assert!(module.starts_with("// js"));
        assert!(commonjs.starts_with("// commonjs"));
    }

    #[test]
    fn test_layout_extras_and_brands() {
        let (temp, mut config) = setup();
        config.brands = vec!["acme".to_string()];
        write(temp.path(), "sherpa/lib/game-up-camera-1.0.0.js", "camera");
        write(temp.path(), "sherpa/lib/other.js", "skipped");
        write(temp.path(), "brand/phet/js/Brand.ts", "phet");
        write(temp.path(), "brand/acme/js/Brand.ts", "acme");
        let (mut t, _) = transpiler(&temp, &config);

        assert_eq!(t.transpile_repo("sherpa").unwrap().compiled, 1);
        assert_eq!(t.transpile_repo("brand").unwrap().compiled, 2);
        assert!(temp.path().join("dist/js/brand/acme/js/Brand.js").is_file());

        let layout = t.layout();
        let segs = |parts: &[&str]| parts.iter().map(|p| p.to_string()).collect::<Vec<_>>();
        assert!(layout.covers("sherpa", &segs(&["lib", "game-up-camera-1.0.0.js"])));
        assert!(!layout.covers("sherpa", &segs(&["lib", "other.js"])));
        assert!(layout.covers("foo", &segs(&["js", "A.ts"])));
        assert!(!layout.covers("foo", &segs(&["doc", "A.ts"])));
    }

    #[test]
    fn test_prune_keeps_outputs_with_sibling_sources() {
        let (temp, config) = setup();
        write(temp.path(), "foo/js/A.ts", "const a = 1;");
        write(temp.path(), "foo/js/B.ts", "const b = 1;");
        let (mut t, _) = transpiler(&temp, &config);
        t.transpile_repo("foo").unwrap();

        // A.ts renamed to A.js: the output is still produced by a live source
        std::fs::rename(temp.path().join("foo/js/A.ts"), temp.path().join("foo/js/A.js")).unwrap();
        std::fs::remove_file(temp.path().join("foo/js/B.ts")).unwrap();

        let removed = t.prune_stale_outputs(OutputMode::Module).unwrap();

        assert_eq!(removed, 1);
        assert!(temp.path().join("dist/js/foo/js/A.js").exists());
        assert!(!temp.path().join("dist/js/foo/js/B.js").exists());
        let b = temp.path().join("foo/js/B.ts");
        assert!(t.status().get(&b, OutputMode::Module).is_none());
        assert_eq!(t.prune_stale_outputs(OutputMode::CommonJs).unwrap(), 0);
    }

    #[test]
    fn test_remove_outputs_in_every_mode() {
        let (temp, config) = setup();
        write(temp.path(), "chipper/js/C.ts", "c");
        let (mut t, _) = transpiler(&temp, &config);
        t.transpile_repo("chipper").unwrap();
        std::fs::remove_file(temp.path().join("chipper/js/C.ts")).unwrap();

        let removed = t.remove_outputs(Path::new("chipper/js/C.ts")).unwrap();

        assert_eq!(removed, 2);
        assert!(t.status().is_empty());
        assert!(!temp.path().join("dist/js/chipper/js/C.js").exists());
        assert!(!temp.path().join("dist/commonjs/chipper/js/C.js").exists());
    }

    #[test]
    fn test_remove_outputs_keeps_output_of_live_sibling() {
        let (temp, config) = setup();
        write(temp.path(), "foo/js/A.ts", "a");
        let (mut t, _) = transpiler(&temp, &config);
        t.transpile_repo("foo").unwrap();

        // A.js appears before A.ts is deleted
        write(temp.path(), "foo/js/A.js", "a");
        std::fs::remove_file(temp.path().join("foo/js/A.ts")).unwrap();

        let removed = t.remove_outputs(Path::new("foo/js/A.ts")).unwrap();

        assert_eq!(removed, 0);
        assert!(temp.path().join("dist/js/foo/js/A.js").is_file());
        let a = temp.path().join("foo/js/A.ts");
        assert!(t.status().get(&a, OutputMode::Module).is_none());
    }

    #[test]
    fn test_subdirs_are_deduplicated() {
        let (temp, mut config) = setup();
        config.brands = vec!["phet".to_string(), "acme".to_string(), "phet".to_string()];
        write(temp.path(), "brand/phet/js/Brand.ts", "phet");
        let (mut t, _) = transpiler(&temp, &config);

        let subdirs = t.layout().subdirs_for("brand");
        let phet = subdirs.iter().filter(|s| s.as_str() == "phet").count();
        assert_eq!(phet, 1);
        assert_eq!(subdirs.last().map(String::as_str), Some("acme"));

        let stats = t.transpile_repo("brand").unwrap();
        assert_eq!(stats.compiled, 1);
        assert_eq!(t.transpile_repo("brand").unwrap().fresh, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_subtree_does_not_stop_the_walk() {
        use std::os::unix::fs::PermissionsExt;

        let (temp, config) = setup();
        write(temp.path(), "foo/js/A.ts", "a");
        write(temp.path(), "foo/js/locked/B.ts", "b");
        let locked = temp.path().join("foo/js/locked");
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();
        let (mut t, _) = transpiler(&temp, &config);

        let result = t.transpile_repo("foo");
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert!(result.unwrap().compiled >= 1);
        assert!(temp.path().join("dist/js/foo/js/A.js").is_file());
    }

    #[test]
    fn test_transpile_selected() {
        let (temp, config) = setup();
        write(temp.path(), "foo/js/A.ts", "a");
        write(temp.path(), "bar/js/B.ts", "b");
        write(temp.path(), "baz/js/C.ts", "c");
        write(temp.path(), "dist/js/gone/js/Old.js", "orphan");
        let (mut t, _) = transpiler(&temp, &config);

        assert!(t.transpile_selected(false, &[]).is_err());

        let stats = t
            .transpile_selected(true, &["baz".to_string(), "foo".to_string()])
            .unwrap();
        assert_eq!(stats.compiled, 3);
        assert_eq!(stats.removed, 1);
        assert!(t.is_tracked("baz"));
        assert!(!t.is_active("baz"));
    }

    #[test]
    fn test_clean_clears_status() {
        let (temp, mut config) = setup();
        write(temp.path(), "foo/js/A.ts", "a");
        {
            let (mut t, _) = transpiler(&temp, &config);
            t.transpile_repo("foo").unwrap();
        }
        config.clean = true;
        let (t, _) = transpiler(&temp, &config);
        assert!(t.status().is_empty());
    }

    #[test]
    fn test_reload_active_repos() {
        let (temp, config) = setup();
        let (mut t, _) = transpiler(&temp, &config);
        assert_eq!(t.active_repos(), ["foo", "bar"]);

        write(temp.path(), "data/active-repos", "foo\nbar\nqux\n");
        assert_eq!(t.reload_active_repos(), vec!["qux".to_string()]);
        assert!(t.is_active("qux"));
    }
}
