//! In-memory stand-ins for the compiler and lint collaborators

use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chisel_core::lint::{LintError, LintFileResult, LintOptions, UnitOutcome};
use chisel_core::{CompileError, Compiler, LintEngine, LintUnit, OutputMode};

use crate::fixtures::SYNTAX_ERROR;

pub type CompileLog = Arc<Mutex<Vec<(PathBuf, OutputMode)>>>;

/// Prefixes the source with a mode banner; rejects anything containing
/// [`SYNTAX_ERROR`]
#[derive(Debug, Clone, Default)]
pub struct MockCompiler {
    calls: CompileLog,
}

impl MockCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the call log, usable after the compiler is boxed
    pub fn calls(&self) -> CompileLog {
        Arc::clone(&self.calls)
    }
}

impl Compiler for MockCompiler {
    fn compile(&self, source: &str, path: &Path, mode: OutputMode) -> Result<String, CompileError> {
        self.calls.lock().unwrap().push((path.to_path_buf(), mode));
        if source.contains(SYNTAX_ERROR) {
            return Err(CompileError::Rejected(format!(
                "{}: unexpected token",
                path.display()
            )));
        }
        Ok(format!("// compiled ({})\n{}", mode.as_str(), source))
    }
}

/// Lint unit that records every repository it is asked to lint
#[derive(Debug, Default)]
pub struct MockLintUnit {
    label: &'static str,
    exit_codes: FxHashMap<String, i32>,
    calls: Mutex<Vec<String>>,
}

impl MockLintUnit {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            ..Default::default()
        }
    }

    /// Make `repo` fail with `code`
    pub fn failing(mut self, repo: &str, code: i32) -> Self {
        self.exit_codes.insert(repo.to_string(), code);
        self
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Repositories linted so far, sorted
    pub fn calls(&self) -> Vec<String> {
        let mut calls = self.calls.lock().unwrap().clone();
        calls.sort();
        calls
    }
}

impl LintUnit for MockLintUnit {
    fn run(&self, repo: &str, _options: &LintOptions) -> UnitOutcome {
        self.calls.lock().unwrap().push(repo.to_string());
        UnitOutcome {
            repo: repo.to_string(),
            exit_code: self.exit_codes.get(repo).copied().unwrap_or(0),
            results: Vec::new(),
        }
    }
}

/// Lint engine returning canned results for whichever paths it is given
#[derive(Debug, Default)]
pub struct MockLintEngine {
    results: Vec<LintFileResult>,
    calls: Mutex<Vec<(Vec<PathBuf>, LintOptions)>>,
}

impl MockLintEngine {
    pub fn new(results: Vec<LintFileResult>) -> Self {
        Self {
            results,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(Vec<PathBuf>, LintOptions)> {
        self.calls.lock().unwrap().clone()
    }
}

impl LintEngine for MockLintEngine {
    fn lint_files(
        &self,
        paths: &[PathBuf],
        options: &LintOptions,
    ) -> Result<Vec<LintFileResult>, LintError> {
        self.calls
            .lock()
            .unwrap()
            .push((paths.to_vec(), options.clone()));
        Ok(self.results.clone())
    }
}

/// A result for `file` with the given error and warning counts
pub fn file_result(file: PathBuf, errors: usize, warnings: usize) -> LintFileResult {
    LintFileResult {
        file_path: file,
        error_count: errors,
        warning_count: warnings,
        messages: Vec::new(),
    }
}
