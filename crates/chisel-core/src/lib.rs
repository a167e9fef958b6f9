pub mod cache;
pub mod compiler;
pub mod config;
pub mod errors;
pub mod lint;
pub mod paths;
pub mod transpiler;
pub mod watch;

pub use cache::{digest, CacheEntry, CacheError, ChangeMarker, StatusStore};
pub use compiler::{CommandCompiler, CompileError, Compiler, ExtensionDispatch, ShaderCompiler};
pub use config::{ChiselConfig, CliOverrides, LintConfig, TranspileConfig};
pub use errors::{BuildError, BuildResult, ConfigError};
pub use lint::{
    lint_with_workers, LintAggregator, LintCacheRouter, LintEngine, LintReport, LintUnit,
    WorkerPool,
};
pub use paths::{OutputMode, PathClassifier};
pub use transpiler::{default_compiler, CompileOutcome, RepoLayout, TranspileStats, Transpiler};
pub use watch::{EventAction, WatchEvent, WatchLoop};
