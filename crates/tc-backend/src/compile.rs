//! Optional syntax check of an assembled test file.
//!
//! Runs a compiler in syntax-only mode over the rendered source before it is
//! written. A failing check is terminal for the unit and never retried.

use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::debug;

use crate::BackendError;

/// Default compiler invocation.
pub const DEFAULT_COMPILE_COMMAND: &str = "g++ -std=c++17 -fsyntax-only";

/// Outcome of a compile check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOutcome {
    Passed { elapsed: Duration },
    Failed { message: String, elapsed: Duration },
}

impl CompileOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, CompileOutcome::Passed { .. })
    }
}

/// Compiler command plus include directories.
#[derive(Debug, Clone)]
pub struct CompileCheck {
    program: String,
    args: Vec<String>,
    include_dirs: Vec<PathBuf>,
    timeout: Duration,
}

impl CompileCheck {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            include_dirs: Vec::new(),
            timeout,
        }
    }

    /// Parse a whitespace-separated command such as `clang++ -fsyntax-only`.
    pub fn from_command(command: &str, timeout: Duration) -> Result<Self, BackendError> {
        let mut words = command.split_whitespace().map(str::to_string);
        let program = words
            .next()
            .ok_or_else(|| BackendError::InvalidCommand(command.to_string()))?;
        Ok(Self::new(program, words.collect(), timeout))
    }

    /// Add `-I` directories, skipping ones already present.
    #[must_use]
    pub fn with_include_dirs(mut self, dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        for dir in dirs {
            if !self.include_dirs.contains(&dir) {
                self.include_dirs.push(dir);
            }
        }
        self
    }

    pub fn include_dirs(&self) -> &[PathBuf] {
        &self.include_dirs
    }

    /// Check `source`. The file name is kept so diagnostics read naturally.
    pub async fn check(&self, file_name: &str, source: &str) -> CompileOutcome {
        let start = Instant::now();

        let prefix = file_name.trim_end_matches(".cpp").to_string();
        let contents = source.to_string();
        let staged = tokio::task::spawn_blocking(move || {
            let mut file = tempfile::Builder::new().prefix(&prefix).suffix(".cpp").tempfile()?;
            file.write_all(contents.as_bytes())?;
            file.flush()?;
            Ok::<_, std::io::Error>(file)
        })
        .await
        .map_err(std::io::Error::other)
        .and_then(|staged| staged);
        let file = match staged {
            Ok(file) => file,
            Err(e) => {
                return CompileOutcome::Failed {
                    message: format!("cannot stage source for compilation: {e}"),
                    elapsed: start.elapsed(),
                }
            }
        };

        let mut command = Command::new(&self.program);
        command.args(&self.args);
        for dir in &self.include_dirs {
            command.arg("-I").arg(dir);
        }
        command.arg(file.path()).kill_on_drop(true);

        let result = tokio::time::timeout(self.timeout, command.output()).await;
        let elapsed = start.elapsed();

        match result {
            Ok(Ok(output)) if output.status.success() => {
                debug!(file = file_name, elapsed_ms = elapsed.as_millis() as u64, "compile check passed");
                CompileOutcome::Passed { elapsed }
            }
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                CompileOutcome::Failed {
                    message: extract_compiler_error(&stderr),
                    elapsed,
                }
            }
            Ok(Err(e)) => CompileOutcome::Failed {
                message: format!("failed to run `{}`: {}", self.program, e),
                elapsed,
            },
            Err(_) => CompileOutcome::Failed {
                message: format!("compile check timed out after {:?}", self.timeout),
                elapsed,
            },
        }
    }
}

/// First compiler error line, else the first non-empty line.
fn extract_compiler_error(stderr: &str) -> String {
    for line in stderr.lines() {
        if line.contains("error:") {
            return line.trim().to_string();
        }
    }

    stderr
        .lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("unknown error")
        .trim()
        .to_string()
}
