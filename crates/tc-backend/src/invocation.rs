//! Outcome of one model invocation.

use std::time::Duration;

/// Result of a single call to the generation backend.
///
/// Invocations never fail by panicking or by `Err`; every outcome the
/// orchestrator has to distinguish is a variant here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// The backend produced output.
    Success { output: String, elapsed: Duration },

    /// The wall-clock budget ran out. Partial output is discarded.
    Timeout { elapsed: Duration },

    /// The process (or HTTP endpoint) reported failure.
    ProcessError {
        /// Exit code, or HTTP status for the HTTP backend
        exit_code: Option<i32>,
        /// Captured diagnostics
        stderr: String,
        /// Whether the failure looks like the transport not being ready
        /// rather than a model error
        transient: bool,
        elapsed: Duration,
    },
}

impl Invocation {
    pub fn elapsed(&self) -> Duration {
        match self {
            Invocation::Success { elapsed, .. }
            | Invocation::Timeout { elapsed }
            | Invocation::ProcessError { elapsed, .. } => *elapsed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Invocation::Success { .. })
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Invocation::Success { .. } => "success",
            Invocation::Timeout { .. } => "timeout",
            Invocation::ProcessError { .. } => "process_error",
        }
    }
}

/// Stderr fragments that indicate the model runtime was not ready.
const TRANSIENT_MARKERS: &[&str] = &[
    "connection refused",
    "could not connect",
    "connection reset",
    "not ready",
    "server not responding",
    "try again",
    "temporarily unavailable",
];

/// Whether process diagnostics point at the transport rather than the model.
pub fn is_transient_message(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    TRANSIENT_MARKERS.iter().any(|m| lower.contains(m))
}
