//! Generation results and failure reasons.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Why generation for a unit failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    #[error("invocation timed out after {timeout_ms} ms")]
    InvocationTimeout { timeout_ms: u64 },

    #[error("model process failed (exit code {exit_code:?}): {message}")]
    ProcessFailed {
        exit_code: Option<i32>,
        message: String,
    },

    #[error("no fenced code block found in model output")]
    NoCodeBlockFound,

    #[error("code block contains no recognizable test assertion")]
    UnrecognizedTestBody,

    #[error("compile check failed: {message}")]
    CompileCheckFailed { message: String },

    #[error("I/O error: {message}")]
    Io { message: String },

    /// Another unit earlier in the batch targets the same output file.
    #[error("{path} is already produced by {first_header}")]
    OutputCollision { path: String, first_header: String },
}

impl FailureReason {
    /// Short stable name for reports.
    pub fn name(&self) -> &'static str {
        match self {
            FailureReason::InvocationTimeout { .. } => "InvocationTimeout",
            FailureReason::ProcessFailed { .. } => "ProcessFailed",
            FailureReason::NoCodeBlockFound => "NoCodeBlockFound",
            FailureReason::UnrecognizedTestBody => "UnrecognizedTestBody",
            FailureReason::CompileCheckFailed { .. } => "CompileCheckFailed",
            FailureReason::Io { .. } => "Io",
            FailureReason::OutputCollision { .. } => "OutputCollision",
        }
    }
}

/// Outcome of driving the model once for a unit.
///
/// Raw output is always kept, including on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    /// Raw model output (empty when the process produced nothing usable)
    pub raw_output: String,
    /// Whether a usable response was obtained
    pub success: bool,
    /// Wall-clock time across all attempts
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
    /// Extracted code blocks (non-empty on success)
    pub code_blocks: Vec<String>,
    /// Failure reason (set on failure)
    pub failure: Option<FailureReason>,
    /// Invocation attempts made (1 or 2)
    pub attempts: u32,
}

impl GenerationResult {
    /// Create a successful result.
    pub fn success(raw_output: String, code_blocks: Vec<String>, elapsed: Duration, attempts: u32) -> Self {
        debug_assert!(!code_blocks.is_empty(), "Success requires at least one code block");
        debug_assert!(attempts > 0, "At least one attempt must have been made");

        Self {
            raw_output,
            success: true,
            elapsed,
            code_blocks,
            failure: None,
            attempts,
        }
    }

    /// Create a failed result.
    pub fn failure(raw_output: String, reason: FailureReason, elapsed: Duration, attempts: u32) -> Self {
        Self {
            raw_output,
            success: false,
            elapsed,
            code_blocks: Vec::new(),
            failure: Some(reason),
            attempts,
        }
    }
}

/// Serialize durations as integer milliseconds.
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
