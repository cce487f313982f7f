//! Local model process backend.
//!
//! Runs the model as a child process (`ollama run <model>` by default), writes
//! the prompt to its stdin and reads the generated text from stdout. Each
//! invocation is a fresh process, so no conversation state survives between
//! units.

use std::env;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::invocation::{is_transient_message, Invocation};
use crate::{BackendError, GenerationBackend};

/// Placeholder replaced by the model name in command templates.
pub const MODEL_PLACEHOLDER: &str = "{model}";

/// Default timeout for the availability probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// A model runtime reached through a child process.
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    program: String,
    args: Vec<String>,
    /// Arguments for the readiness probe; `None` only checks the program exists
    probe_args: Option<Vec<String>>,
    probe_timeout: Duration,
    model: String,
}

impl ProcessBackend {
    /// Arbitrary program and arguments, no readiness probe.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            probe_args: None,
            probe_timeout: PROBE_TIMEOUT,
            model: String::new(),
        }
    }

    /// `ollama run <model>`, probed with `ollama list`.
    pub fn ollama(model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            program: "ollama".to_string(),
            args: vec!["run".to_string(), model.clone()],
            probe_args: Some(vec!["list".to_string()]),
            probe_timeout: PROBE_TIMEOUT,
            model,
        }
    }

    /// Parse a whitespace-separated command template such as
    /// `ollama run {model}`.
    pub fn from_command(command: &str, model: &str) -> Result<Self, BackendError> {
        let mut words = command
            .split_whitespace()
            .map(|w| w.replace(MODEL_PLACEHOLDER, model));
        let program = words
            .next()
            .ok_or_else(|| BackendError::InvalidCommand(command.to_string()))?;
        let args: Vec<String> = words.collect();

        let mut backend = Self::new(program, args);
        backend.model = model.to_string();
        if Path::new(&backend.program).file_name().is_some_and(|n| n == "ollama") {
            backend.probe_args = Some(vec!["list".to_string()]);
        }
        Ok(backend)
    }

    /// Set the readiness probe arguments.
    #[must_use]
    pub fn with_probe(mut self, args: Vec<String>) -> Self {
        self.probe_args = Some(args);
        self
    }

    /// Set the readiness probe timeout.
    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    async fn probe(&self, args: &[String]) -> Result<(), BackendError> {
        let result = tokio::time::timeout(
            self.probe_timeout,
            Command::new(&self.program)
                .args(args)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await;

        match result {
            Ok(Ok(output)) if output.status.success() => {
                if !self.model.is_empty() {
                    let listing = String::from_utf8_lossy(&output.stdout);
                    if !lists_model(&listing, &self.model) {
                        warn!(model = %self.model, "model not listed by the runtime; it may be pulled on first use");
                    }
                }
                Ok(())
            }
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(BackendError::Unavailable(format!(
                    "`{} {}` exited with {}: {}",
                    self.program,
                    args.join(" "),
                    output.status,
                    stderr.trim()
                )))
            }
            Ok(Err(e)) => Err(BackendError::Unavailable(format!(
                "cannot run `{}`: {}",
                self.program, e
            ))),
            Err(_) => Err(BackendError::Unavailable(format!(
                "`{} {}` did not answer within {:?}",
                self.program,
                args.join(" "),
                self.probe_timeout
            ))),
        }
    }
}

impl GenerationBackend for ProcessBackend {
    fn name(&self) -> String {
        format!("process:{}", self.program)
    }

    async fn check_available(&self) -> Result<(), BackendError> {
        match &self.probe_args {
            Some(args) => self.probe(args).await,
            None => resolve_program(&self.program).map(|_| ()).ok_or_else(|| {
                BackendError::Unavailable(format!("`{}` not found", self.program))
            }),
        }
    }

    async fn invoke(&self, prompt: &str, timeout: Duration) -> Invocation {
        let start = Instant::now();

        let spawned = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                return Invocation::ProcessError {
                    exit_code: None,
                    stderr: format!("failed to spawn `{}`: {}", self.program, e),
                    transient: e.kind() != ErrorKind::NotFound
                        && e.kind() != ErrorKind::PermissionDenied,
                    elapsed: start.elapsed(),
                };
            }
        };

        let stdin = child.stdin.take();
        let prompt = prompt.to_owned();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                // A child that exits without reading stdin surfaces through its exit status.
                if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                    debug!(error = %e, "prompt not fully written to stdin");
                }
            }
        };

        // Dropping the child on timeout kills it.
        let run = async move {
            let ((), output) = tokio::join!(feed, child.wait_with_output());
            output
        };

        match tokio::time::timeout(timeout, run).await {
            Ok(Ok(output)) => {
                let elapsed = start.elapsed();
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                if output.status.success() {
                    Invocation::Success {
                        output: stdout,
                        elapsed,
                    }
                } else {
                    Invocation::ProcessError {
                        exit_code: output.status.code(),
                        transient: is_transient_message(&stderr),
                        stderr,
                        elapsed,
                    }
                }
            }
            Ok(Err(e)) => Invocation::ProcessError {
                exit_code: None,
                stderr: format!("failed waiting for `{}`: {}", self.program, e),
                transient: true,
                elapsed: start.elapsed(),
            },
            Err(_) => Invocation::Timeout {
                elapsed: start.elapsed(),
            },
        }
    }
}

/// Whether an `ollama list` style listing names `model`.
fn lists_model(listing: &str, model: &str) -> bool {
    let latest = format!("{model}:latest");
    listing.lines().any(|line| {
        line.split_whitespace()
            .next()
            .is_some_and(|name| name == model || name == latest)
    })
}

/// Locate a program the way a shell would.
fn resolve_program(program: &str) -> Option<PathBuf> {
    let path = Path::new(program);
    if path.components().count() > 1 {
        return path.is_file().then(|| path.to_path_buf());
    }
    env::var_os("PATH").and_then(|paths| {
        env::split_paths(&paths)
            .map(|dir| dir.join(program))
            .find(|candidate| candidate.is_file())
    })
}
