//! Test utilities and fixtures for chisel
//!
//! Shared by the integration tests of the workspace crates (tests/ directories).

pub mod fixtures;
pub mod mocks;
pub mod transpile;

pub use fixtures::{broken_source, valid_source, Workspace, SYNTAX_ERROR};
pub use mocks::{file_result, MockCompiler, MockLintEngine, MockLintUnit};
pub use transpile::{in_memory_transpiler, transpiler, transpiler_with};
