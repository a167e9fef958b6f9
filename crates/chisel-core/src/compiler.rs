//! Source-to-output transforms used by the transpiler
//!
//! The transpiler only depends on the [`Compiler`] trait. Script sources go
//! through an external compiler process; shader sources are wrapped into a
//! JavaScript module that exports the shader text.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::debug;

use crate::paths::OutputMode;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with code {code:?}: {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("compiler output is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("{0}")]
    Rejected(String),
}

/// Pure transform from source text to output text
pub trait Compiler: Send {
    fn compile(&self, source: &str, path: &Path, mode: OutputMode) -> Result<String, CompileError>;
}

/// Runs an external compiler, feeding the source on stdin and reading the
/// output from stdout
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    module_command: Vec<String>,
    commonjs_command: Vec<String>,
    cwd: PathBuf,
}

impl CommandCompiler {
    pub fn new(module_command: Vec<String>, commonjs_command: Vec<String>, cwd: &Path) -> Self {
        Self {
            module_command,
            commonjs_command,
            cwd: cwd.to_path_buf(),
        }
    }

    fn command_for(&self, mode: OutputMode) -> &[String] {
        match mode {
            OutputMode::Module => &self.module_command,
            OutputMode::CommonJs => &self.commonjs_command,
        }
    }
}

impl Compiler for CommandCompiler {
    fn compile(&self, source: &str, path: &Path, mode: OutputMode) -> Result<String, CompileError> {
        let Some((program, args)) = self.command_for(mode).split_first() else {
            return Err(CompileError::Rejected("empty compiler command".to_string()));
        };
        let file = path.to_string_lossy();
        let args: Vec<String> = args.iter().map(|a| a.replace("{file}", &file)).collect();
        debug!("Running {} {}", program, args.join(" "));

        let mut child = Command::new(program)
            .args(&args)
            .current_dir(&self.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CompileError::Spawn {
                program: program.clone(),
                source,
            })?;

        // Feed stdin from a separate thread so a chatty child can't deadlock us
        let writer = child.stdin.take().map(|mut stdin| {
            let text = source.to_string();
            std::thread::spawn(move || stdin.write_all(text.as_bytes()))
        });

        let output = child
            .wait_with_output()
            .map_err(|source| CompileError::Spawn {
                program: program.clone(),
                source,
            })?;
        if let Some(writer) = writer {
            let _ = writer.join();
        }

        if !output.status.success() {
            return Err(CompileError::Failed {
                program: program.clone(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8(output.stdout)?)
    }
}

/// Wraps shader text into a module exporting it as a string
#[derive(Debug, Clone, Default)]
pub struct ShaderCompiler {
    minify: bool,
}

impl ShaderCompiler {
    pub fn new(minify: bool) -> Self {
        Self { minify }
    }
}

impl Compiler for ShaderCompiler {
    fn compile(&self, source: &str, _path: &Path, mode: OutputMode) -> Result<String, CompileError> {
        let text = if self.minify {
            minify_wgsl(source)
        } else {
            source.to_string()
        };
        let literal = serde_json::to_string(&text)
            .map_err(|e| CompileError::Rejected(e.to_string()))?;
        Ok(match mode {
            OutputMode::Module => format!("export default {};\n", literal),
            OutputMode::CommonJs => format!("module.exports = {};\n", literal),
        })
    }
}

/// Strip comments and blank lines, and trim indentation
pub fn minify_wgsl(source: &str) -> String {
    let mut without_blocks = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(start) = rest.find("/*") {
        without_blocks.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => {
                rest = "";
                break;
            }
        }
    }
    without_blocks.push_str(rest);

    without_blocks
        .lines()
        .map(|line| match line.find("//") {
            Some(i) => &line[..i],
            None => line,
        })
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Routes shader sources to one compiler and everything else to another
pub struct ExtensionDispatch {
    script: Box<dyn Compiler>,
    shader: Box<dyn Compiler>,
}

impl ExtensionDispatch {
    pub fn new(script: Box<dyn Compiler>, shader: Box<dyn Compiler>) -> Self {
        Self { script, shader }
    }
}

impl Compiler for ExtensionDispatch {
    fn compile(&self, source: &str, path: &Path, mode: OutputMode) -> Result<String, CompileError> {
        if path.extension().and_then(|e| e.to_str()) == Some("wgsl") {
            self.shader.compile(source, path, mode)
        } else {
            self.script.compile(source, path, mode)
        }
    }
}
