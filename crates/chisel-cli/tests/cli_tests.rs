#![cfg(unix)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn chisel_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("chisel"))
}

fn write(root: &Path, relative: &str, text: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

/// Compiler stand-in: echoes its input, fails on "SYNTAX ERROR"
const FAKE_COMPILER: &str =
    r#"input=$(cat); case "$input" in *"SYNTAX ERROR"*) echo "bad syntax" >&2; exit 1;; esac; printf '%s' "$input""#;

fn workspace() -> TempDir {
    let temp = TempDir::new().unwrap();
    let config = serde_json::json!({
        "transpile": {
            "compilerCommand": ["sh", "-c", FAKE_COMPILER],
            "commonjsCompilerCommand": ["sh", "-c", FAKE_COMPILER]
        }
    });
    write(temp.path(), "chisel.json", &config.to_string());
    write(temp.path(), "data/active-repos", "foo\n");
    temp
}

fn transpile(temp: &TempDir) -> Command {
    let mut cmd = chisel_cmd();
    cmd.arg("--project")
        .arg(temp.path().join("chisel.json"))
        .arg("--root")
        .arg(temp.path())
        .arg("transpile");
    cmd
}

fn read_status(temp: &TempDir) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(temp.path().join("dist/js-cache-status.json")).unwrap())
        .unwrap()
}

#[test]
fn test_transpile_repos_writes_outputs_and_status() {
    let temp = workspace();
    write(temp.path(), "foo/js/A.ts", "const a = 1;");
    write(temp.path(), "bar/js/B.ts", "const b = 2;");

    transpile(&temp).arg("--repos=foo,bar").assert().success();

    assert_eq!(
        fs::read_to_string(temp.path().join("dist/js/foo/js/A.js")).unwrap(),
        "const a = 1;"
    );
    assert!(temp.path().join("dist/js/bar/js/B.js").is_file());
    let status = read_status(&temp);
    let key = format!("{}@js", temp.path().join("foo/js/A.ts").display());
    assert!(status[&key]["sourceMD5"].is_string());
    assert!(status[&key]["targetMilliseconds"].is_u64());
}

#[test]
fn test_syntax_error_is_isolated() {
    let temp = workspace();
    write(temp.path(), "foo/js/A.ts", "const a = 1;");
    write(temp.path(), "foo/js/B.ts", "SYNTAX ERROR");
    write(temp.path(), "foo/js/C.ts", "const c = 3;");

    transpile(&temp)
        .arg("--all")
        .assert()
        .success()
        .stderr(predicate::str::contains("B.ts"));

    assert!(temp.path().join("dist/js/foo/js/A.js").is_file());
    assert!(temp.path().join("dist/js/foo/js/C.js").is_file());
    assert!(!temp.path().join("dist/js/foo/js/B.js").exists());
    let status = read_status(&temp);
    assert_eq!(status.as_object().unwrap().len(), 2);
}

#[test]
fn test_corrupt_status_file_heals() {
    let temp = workspace();
    write(temp.path(), "dist/js-cache-status.json", "{not json");

    transpile(&temp).arg("--repos=foo").assert().success();

    assert_eq!(read_status(&temp), serde_json::json!({}));
}

#[test]
fn test_second_run_is_cached_and_clean_recompiles() {
    let temp = workspace();
    write(temp.path(), "foo/js/A.ts", "const a = 1;");

    transpile(&temp).arg("--all").assert().success();
    transpile(&temp)
        .arg("--all")
        .assert()
        .success()
        .stderr(predicate::str::contains("0 compiled, 1 up to date"));
    transpile(&temp)
        .args(["--all", "--clean"])
        .assert()
        .success()
        .stderr(predicate::str::contains("1 compiled"));
}

#[test]
fn test_verbose_logs_reason() {
    let temp = workspace();
    write(temp.path(), "foo/js/A.ts", "const a = 1;");

    transpile(&temp)
        .args(["--all", "--verbose"])
        .assert()
        .success()
        .stderr(predicate::str::contains("(not cached)"));
}

#[test]
fn test_transpile_requires_repos_or_all() {
    let temp = workspace();

    transpile(&temp)
        .assert()
        .failure()
        .stderr(predicate::str::contains("must include repos or --all"));
}

#[test]
fn test_wgsl_becomes_module() {
    let temp = workspace();
    write(temp.path(), "foo/js/blur.wgsl", "fn main() {}");

    transpile(&temp).arg("--repos=foo").assert().success();

    assert_eq!(
        fs::read_to_string(temp.path().join("dist/js/foo/js/blur.js")).unwrap(),
        "export default \"fn main() {}\";\n"
    );
}

#[test]
fn test_cache_status_and_success() {
    let temp = workspace();
    let marker_cmd = |sub: &str| {
        let mut cmd = chisel_cmd();
        cmd.arg("--root").arg(temp.path()).arg(sub).arg("lint#foo");
        cmd
    };

    marker_cmd("cache-status")
        .assert()
        .failure()
        .stdout(predicate::str::contains("stale"));

    write(temp.path(), "dist/cache-layer.json", r#"{ "latestChangeTimestamp": 1 }"#);
    marker_cmd("cache-success").assert().success();

    marker_cmd("cache-status")
        .assert()
        .success()
        .stdout(predicate::str::contains("fresh"));
}

#[test]
fn test_init_writes_config() {
    let temp = TempDir::new().unwrap();

    chisel_cmd()
        .current_dir(temp.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created chisel.yaml"));

    let text = fs::read_to_string(temp.path().join("chisel.yaml")).unwrap();
    assert!(text.contains("transpile:"));
    assert!(text.contains("workers: 8"));
}

fn lint_workspace(spawn_script: &str, engine_script: &str) -> TempDir {
    let temp = TempDir::new().unwrap();
    for repo in ["alpha", "beta", "gamma"] {
        fs::create_dir_all(temp.path().join(repo)).unwrap();
    }
    let config = serde_json::json!({
        "lint": {
            "workers": 2,
            "showProgressBar": false,
            "spawnCommand": ["sh", "-c", spawn_script],
            "engineCommand": ["sh", "-c", engine_script]
        }
    });
    write(temp.path(), "chisel.json", &config.to_string());
    temp
}

fn lint(temp: &TempDir) -> Command {
    let mut cmd = chisel_cmd();
    cmd.arg("--project")
        .arg(temp.path().join("chisel.json"))
        .arg("--root")
        .arg(temp.path())
        .arg("lint");
    cmd
}

#[test]
fn test_lint_all_clean() {
    let temp = lint_workspace("exit 0", "echo '[]'");

    lint(&temp)
        .args(["alpha", "beta", "gamma"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Linting completed successfully."));
}

#[test]
fn test_lint_failure_exits_nonzero() {
    let temp = lint_workspace("test {repo} != beta", "echo '[]'");

    lint(&temp)
        .arg("--repos=alpha,beta,gamma")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Lint failed: beta"));
}

#[test]
fn test_lint_routes_cached_repos_in_process() {
    let temp = lint_workspace("exit 0", "");
    let report = format!(
        r#"echo '[{{"filePath":"{}/beta/js/A.ts","errorCount":2,"warningCount":1}}]'"#,
        temp.path().display()
    );
    let config = serde_json::json!({
        "lint": {
            "showProgressBar": false,
            "spawnCommand": ["sh", "-c", "exit 0"],
            "engineCommand": ["sh", "-c", report]
        }
    });
    write(temp.path(), "chisel.json", &config.to_string());
    write(temp.path(), "dist/eslint/cache/beta.eslintcache", "{}");

    lint(&temp)
        .args(["alpha", "beta", "--chip-away"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("beta:  3 errors in 1 files."))
        .stderr(predicate::str::contains("Lint failed: beta"));
}

#[test]
fn test_lint_disable_cache_removes_cache_files() {
    let temp = lint_workspace("exit 0", "exit 2");
    write(temp.path(), "dist/eslint/cache/alpha.eslintcache", "{}");

    lint(&temp)
        .args(["alpha", "--disable-cache"])
        .assert()
        .success();

    assert!(!temp.path().join("dist/eslint/cache/alpha.eslintcache").exists());
}

#[test]
fn test_lint_skips_missing_and_excluded_repos() {
    let temp = lint_workspace("exit 1", "echo '[]'");
    fs::create_dir_all(temp.path().join("sherpa")).unwrap();

    // every linted repo would fail, so success means nothing was linted
    lint(&temp)
        .args(["sherpa", "not-checked-out"])
        .assert()
        .success();
}

#[test]
fn test_lint_child_stderr_reaches_parent() {
    let temp = lint_workspace("echo cfg-broken >&2; exit 2", "echo '[]'");

    lint(&temp)
        .arg("alpha")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("cfg-broken"))
        .stderr(predicate::str::contains("Lint failed: alpha"));
}
