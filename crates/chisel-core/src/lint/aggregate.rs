use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::engine::LintFileResult;
use super::router::UnitOutcome;

/// Repos never listed in the chip-away report
const CHIP_AWAY_EXCLUDED: &[&str] = &["perennial-alias"];

/// Combined result of a lint run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LintReport {
    /// Every repository exited cleanly
    pub ok: bool,
    pub outcomes: Vec<UnitOutcome>,
    pub results: Vec<LintFileResult>,
}

impl LintReport {
    pub fn failed_repos(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_ok())
            .map(|o| o.repo.as_str())
            .collect()
    }

    pub fn error_count(&self) -> usize {
        self.results.iter().map(|r| r.error_count).sum()
    }

    pub fn warning_count(&self) -> usize {
        self.results.iter().map(|r| r.warning_count).sum()
    }

    /// Per-file listing of problems, empty when there are none
    pub fn format(&self) -> String {
        let mut out = String::new();
        for result in self.results.iter().filter(|r| r.problem_count() > 0) {
            let _ = writeln!(out, "\n{}", result.file_path.display());
            for message in &result.messages {
                let severity = if message.severity >= 2 { "error" } else { "warning" };
                let _ = writeln!(
                    out,
                    "  {}:{}  {}  {}  {}",
                    message.line.unwrap_or(0),
                    message.column.unwrap_or(0),
                    severity,
                    message.message,
                    message.rule_id.as_deref().unwrap_or("")
                );
            }
        }
        let problems = self.error_count() + self.warning_count();
        if problems > 0 {
            let _ = writeln!(
                out,
                "\n{} problems ({} errors, {} warnings)",
                problems,
                self.error_count(),
                self.warning_count()
            );
        }
        out
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsibleDevEntry {
    #[serde(default)]
    responsible_devs: Vec<String>,
}

/// Merges per-repository outcomes into one report
#[derive(Debug, Clone)]
pub struct LintAggregator {
    root: PathBuf,
    responsible_devs_file: PathBuf,
}

impl LintAggregator {
    pub fn new(root: &Path, responsible_devs_file: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            responsible_devs_file: root.join(responsible_devs_file),
        }
    }

    pub fn aggregate(&self, outcomes: Vec<UnitOutcome>) -> LintReport {
        let ok = outcomes.iter().all(UnitOutcome::is_ok);
        let results = outcomes
            .iter()
            .flat_map(|o| o.results.iter().cloned())
            .collect();
        LintReport {
            ok,
            outcomes,
            results,
        }
    }

    /// Responsible developers per repo; a missing or unreadable file yields
    /// an empty map
    pub fn responsible_devs(&self) -> BTreeMap<String, Vec<String>> {
        let parsed = std::fs::read_to_string(&self.responsible_devs_file)
            .ok()
            .and_then(|text| {
                serde_json::from_str::<BTreeMap<String, ResponsibleDevEntry>>(&text).ok()
            });
        match parsed {
            Some(entries) => entries
                .into_iter()
                .map(|(repo, entry)| (repo, entry.responsible_devs))
                .collect(),
            None => {
                debug!(
                    "No responsible devs from {}",
                    self.responsible_devs_file.display()
                );
                BTreeMap::new()
            }
        }
    }

    /// Markdown checklist assigning failing repos to their developers
    pub fn chip_away(&self, report: &LintReport) -> String {
        chip_away(&report.results, &self.root, &self.responsible_devs())
    }
}

/// One line per repo with problems:
/// ` - [ ] repo: devs N errors in M files.`
pub fn chip_away(
    results: &[LintFileResult],
    root: &Path,
    responsible_devs: &BTreeMap<String, Vec<String>>,
) -> String {
    // repo -> (problems, files with problems), in first-seen order
    let mut per_repo: IndexMap<String, (usize, usize)> = IndexMap::new();
    for result in results {
        let relative = result.file_path.strip_prefix(root).unwrap_or(&result.file_path);
        let Some(repo) = relative
            .components()
            .next()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
        else {
            continue;
        };
        let entry = per_repo.entry(repo).or_default();
        entry.0 += result.problem_count();
        if result.problem_count() > 0 {
            entry.1 += 1;
        }
    }

    per_repo
        .into_iter()
        .filter(|(repo, (problems, _))| *problems > 0 && !CHIP_AWAY_EXCLUDED.contains(&repo.as_str()))
        .map(|(repo, (problems, files))| {
            let devs = responsible_devs
                .get(&repo)
                .map(|devs| devs.join(", "))
                .unwrap_or_default();
            format!(" - [ ] {}: {} {} errors in {} files.", repo, devs, problems, files)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
