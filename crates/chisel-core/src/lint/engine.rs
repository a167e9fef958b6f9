use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum LintError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("lint engine exited with code {code:?}: {stderr}")]
    Engine { code: Option<i32>, stderr: String },

    #[error("could not parse lint output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("empty lint engine command")]
    EmptyCommand,
}

/// One diagnostic inside a linted file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LintMessage {
    #[serde(default)]
    pub rule_id: Option<String>,
    /// 1 = warning, 2 = error
    #[serde(default)]
    pub severity: u8,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub column: Option<u32>,
}

/// Lint results for one file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LintFileResult {
    pub file_path: PathBuf,
    #[serde(default)]
    pub error_count: usize,
    #[serde(default)]
    pub warning_count: usize,
    #[serde(default)]
    pub messages: Vec<LintMessage>,
}

impl LintFileResult {
    pub fn problem_count(&self) -> usize {
        self.error_count + self.warning_count
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LintOptions {
    pub cache: bool,
    pub fix: bool,
    /// Where the engine keeps its cache for this run
    pub cache_file: Option<PathBuf>,
}

/// The external linter, invoked on whole paths
pub trait LintEngine: Send + Sync {
    fn lint_files(
        &self,
        paths: &[PathBuf],
        options: &LintOptions,
    ) -> Result<Vec<LintFileResult>, LintError>;
}

/// ESLint driven through its CLI with the JSON formatter
#[derive(Debug, Clone)]
pub struct EslintEngine {
    command: Vec<String>,
    cwd: PathBuf,
}

impl EslintEngine {
    pub fn new(command: Vec<String>, cwd: &Path) -> Self {
        Self {
            command,
            cwd: cwd.to_path_buf(),
        }
    }

    fn args(&self, paths: &[PathBuf], options: &LintOptions) -> Vec<String> {
        let mut args: Vec<String> = vec!["--format".to_string(), "json".to_string()];
        if options.cache {
            args.push("--cache".to_string());
            if let Some(cache_file) = &options.cache_file {
                args.push("--cache-location".to_string());
                args.push(cache_file.to_string_lossy().into_owned());
            }
        }
        if options.fix {
            args.push("--fix".to_string());
        }
        args.extend(paths.iter().map(|p| p.to_string_lossy().into_owned()));
        args
    }
}

impl LintEngine for EslintEngine {
    fn lint_files(
        &self,
        paths: &[PathBuf],
        options: &LintOptions,
    ) -> Result<Vec<LintFileResult>, LintError> {
        let (program, base_args) = self.command.split_first().ok_or(LintError::EmptyCommand)?;
        if let Some(parent) = options.cache_file.as_ref().and_then(|f| f.parent()) {
            let _ = std::fs::create_dir_all(parent);
        }

        let args = self.args(paths, options);
        debug!("Running {} {} {}", program, base_args.join(" "), args.join(" "));
        let output = Command::new(program)
            .args(base_args)
            .args(&args)
            .current_dir(&self.cwd)
            .output()
            .map_err(|source| LintError::Spawn {
                program: program.clone(),
                source,
            })?;

        // 0 = clean, 1 = lint problems found, anything else is a crash
        match output.status.code() {
            Some(0) | Some(1) => Ok(serde_json::from_slice(&output.stdout)?),
            code => Err(LintError::Engine {
                code,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }
}
