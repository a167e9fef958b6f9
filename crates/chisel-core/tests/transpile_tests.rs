use chisel_core::cache::status_key;
use chisel_core::{CompileOutcome, OutputMode, StatusStore};
use chisel_test_helpers::{broken_source, transpiler, transpiler_with, valid_source, Workspace};

#[test]
fn test_initial_pass_then_cached_pass() {
    let ws = Workspace::new();
    ws.set_active_repos(&["foo", "bar"]);
    ws.write("foo/js/A.ts", &valid_source("a"));
    ws.write("foo/js/nested/B.ts", &valid_source("b"));
    ws.write("bar/images/icon.ts", &valid_source("icon"));

    let (mut t, calls) = transpiler(&ws);
    let stats = t.transpile_all().unwrap();
    assert_eq!(stats.compiled, 3);
    assert!(ws.output("foo/js/nested/B.ts", OutputMode::Module).is_file());
    assert!(ws.output("bar/images/icon.ts", OutputMode::Module).is_file());
    drop(t);

    // a fresh process sees the persisted store and compiles nothing
    let (mut t, calls_again) = transpiler(&ws);
    let stats = t.transpile_all().unwrap();
    assert_eq!(stats.compiled, 0);
    assert_eq!(stats.fresh, 3);
    assert_eq!(calls.lock().unwrap().len(), 3);
    assert!(calls_again.lock().unwrap().is_empty());
}

#[test]
fn test_syntax_error_leaves_siblings_intact() {
    let ws = Workspace::new();
    ws.set_active_repos(&["foo"]);
    ws.write("foo/js/A.ts", &valid_source("a"));
    ws.write("foo/js/B.ts", &broken_source());
    ws.write("foo/js/C.ts", &valid_source("c"));

    let (mut t, _) = transpiler(&ws);
    let stats = t.transpile_all().unwrap();

    assert_eq!(stats.compiled, 2);
    assert_eq!(stats.failed, 1);
    assert!(!ws.output("foo/js/B.ts", OutputMode::Module).exists());
    let store = StatusStore::load(&ws.transpile_config().status_path(&ws.root())).unwrap();
    assert_eq!(store.len(), 2);
    assert!(store.get(&ws.path("foo/js/B.ts"), OutputMode::Module).is_none());
}

#[test]
fn test_fixing_the_error_compiles_on_next_pass() {
    let ws = Workspace::new();
    ws.set_active_repos(&["foo"]);
    ws.write("foo/js/B.ts", &broken_source());

    let (mut t, _) = transpiler(&ws);
    assert_eq!(t.transpile_all().unwrap().failed, 1);

    ws.write("foo/js/B.ts", &valid_source("b"));
    let outcome = t
        .compile_if_needed(&ws.path("foo/js/B.ts"), OutputMode::Module)
        .unwrap();
    assert!(matches!(outcome, CompileOutcome::Compiled(_)));
}

#[test]
fn test_corrupt_status_file_reads_as_empty() {
    let ws = Workspace::new();
    ws.set_active_repos(&["foo"]);
    ws.write("dist/js-cache-status.json", "{\"half\": ");
    ws.write("foo/js/A.ts", &valid_source("a"));

    let (mut t, _) = transpiler(&ws);
    assert!(t.status().is_empty());
    assert_eq!(t.transpile_all().unwrap().compiled, 1);

    let status: serde_json::Value = serde_json::from_str(&ws.status_json()).unwrap();
    let key = status_key(&ws.path("foo/js/A.ts"), OutputMode::Module);
    assert!(status[&key]["sourceMD5"].is_string());
}

#[test]
fn test_edited_output_is_recompiled() {
    let ws = Workspace::new();
    ws.set_active_repos(&["foo"]);
    ws.write("foo/js/A.ts", &valid_source("a"));

    let (mut t, _) = transpiler(&ws);
    t.transpile_all().unwrap();

    let output = ws.output("foo/js/A.ts", OutputMode::Module);
    std::thread::sleep(std::time::Duration::from_millis(20));
    std::fs::write(&output, "tampered").unwrap();

    let stats = t.transpile_all().unwrap();
    assert_eq!(stats.compiled, 1);
    assert!(std::fs::read_to_string(output).unwrap().starts_with("// compiled (js)"));
}

#[test]
fn test_clean_forces_full_recompile() {
    let ws = Workspace::new();
    ws.set_active_repos(&["foo"]);
    ws.write("foo/js/A.ts", &valid_source("a"));

    let (mut t, _) = transpiler(&ws);
    t.transpile_all().unwrap();
    drop(t);

    let mut config = ws.transpile_config();
    config.clean = true;
    let (mut t, calls) = transpiler_with(&ws, &config);
    assert_eq!(t.transpile_all().unwrap().compiled, 1);
    assert_eq!(calls.lock().unwrap().len(), 1);
}

#[test]
fn test_all_prunes_outputs_of_deleted_sources() {
    let ws = Workspace::new();
    ws.set_active_repos(&["foo"]);
    ws.write("foo/js/A.ts", &valid_source("a"));
    ws.write("foo/js/Gone.ts", &valid_source("gone"));

    let (mut t, _) = transpiler(&ws);
    t.transpile_all().unwrap();
    drop(t);

    ws.remove("foo/js/Gone.ts");
    let (mut t, _) = transpiler(&ws);
    let stats = t.transpile_selected(true, &[]).unwrap();

    assert_eq!(stats.removed, 1);
    assert!(!ws.output("foo/js/Gone.ts", OutputMode::Module).exists());
    assert!(ws.output("foo/js/A.ts", OutputMode::Module).exists());
}
