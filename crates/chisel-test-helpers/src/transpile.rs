//! Transpilers wired to the mock compiler

use chisel_core::config::TranspileConfig;
use chisel_core::{StatusStore, Transpiler};

use crate::fixtures::Workspace;
use crate::mocks::{CompileLog, MockCompiler};

/// Transpiler over `workspace` with its default layout
pub fn transpiler(workspace: &Workspace) -> (Transpiler, CompileLog) {
    transpiler_with(workspace, &workspace.transpile_config())
}

/// Transpiler over `workspace` with a custom config; loads the on-disk store
pub fn transpiler_with(workspace: &Workspace, config: &TranspileConfig) -> (Transpiler, CompileLog) {
    let compiler = MockCompiler::new();
    let calls = compiler.calls();
    let transpiler = Transpiler::new(&workspace.root(), config, Box::new(compiler))
        .expect("failed to create transpiler");
    (transpiler, calls)
}

/// Transpiler whose status never touches disk
pub fn in_memory_transpiler(workspace: &Workspace) -> (Transpiler, CompileLog) {
    let compiler = MockCompiler::new();
    let calls = compiler.calls();
    let transpiler = Transpiler::with_store(
        &workspace.root(),
        &workspace.transpile_config(),
        StatusStore::in_memory(),
        Box::new(compiler),
    );
    (transpiler, calls)
}
