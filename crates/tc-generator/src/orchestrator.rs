//! Generation orchestration: one independent model invocation per unit.
//!
//! The orchestrator owns the timeout and retry policy. It never assembles
//! test files; it only turns an [`Invocation`] into a [`GenerationResult`].

use std::time::{Duration, Instant};

use tc_backend::{BackendError, GenerationBackend, Invocation};
use tc_core::{FailureReason, GenerationContext, GenerationResult};
use tracing::{debug, info, warn};

use crate::assembler::extract_code_blocks;
use crate::prompt::PromptBuilder;

/// Retry policy for transient invocation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; capped at one
    pub max_retries: u32,
    /// Whether a timeout counts as transient
    pub retry_on_timeout: bool,
    /// Pause before a retry
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            retry_on_timeout: true,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    fn max_attempts(&self) -> u32 {
        1 + self.max_retries.min(1)
    }
}

/// Drives the generation backend once per unit.
pub struct GenerationOrchestrator<B> {
    backend: B,
    timeout: Duration,
    policy: RetryPolicy,
}

impl<B: GenerationBackend> GenerationOrchestrator<B> {
    pub fn new(backend: B, timeout: Duration) -> Self {
        Self {
            backend,
            timeout,
            policy: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Verify the runtime is reachable before a batch starts.
    pub async fn ensure_available(&self) -> Result<(), BackendError> {
        let start = Instant::now();
        self.backend.check_available().await?;
        info!(
            backend = %self.backend.name(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "model backend available"
        );
        Ok(())
    }

    /// Build a fresh prompt for `context` and run it.
    pub async fn generate(&self, context: &GenerationContext) -> GenerationResult {
        let prompt = PromptBuilder::build_generation_prompt(context);
        self.run_prompt(&context.unit.class_name, &prompt).await
    }

    /// Run one prompt with the timeout and retry policy.
    pub async fn run_prompt(&self, label: &str, prompt: &str) -> GenerationResult {
        let start = Instant::now();
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(class = label, attempt, prompt_bytes = prompt.len(), "invoking model");
            let invocation = self.backend.invoke(prompt, self.timeout).await;
            let can_retry = attempt < max_attempts;

            match invocation {
                Invocation::Success { output, elapsed } => {
                    let blocks = extract_code_blocks(&output);
                    debug!(
                        class = label,
                        elapsed_ms = elapsed.as_millis() as u64,
                        blocks = blocks.len(),
                        "model responded"
                    );
                    // Format failures are never retried.
                    return if blocks.is_empty() {
                        GenerationResult::failure(
                            output,
                            FailureReason::NoCodeBlockFound,
                            start.elapsed(),
                            attempt,
                        )
                    } else {
                        GenerationResult::success(output, blocks, start.elapsed(), attempt)
                    };
                }
                Invocation::Timeout { elapsed } => {
                    if can_retry && self.policy.retry_on_timeout {
                        warn!(class = label, elapsed_ms = elapsed.as_millis() as u64, "model timed out, retrying once");
                        self.pause().await;
                        continue;
                    }
                    return GenerationResult::failure(
                        String::new(),
                        FailureReason::InvocationTimeout {
                            timeout_ms: self.timeout.as_millis() as u64,
                        },
                        start.elapsed(),
                        attempt,
                    );
                }
                Invocation::ProcessError {
                    exit_code,
                    stderr,
                    transient,
                    ..
                } => {
                    if transient && can_retry {
                        warn!(class = label, ?exit_code, stderr = %stderr.trim(), "transient backend failure, retrying once");
                        self.pause().await;
                        continue;
                    }
                    return GenerationResult::failure(
                        stderr.clone(),
                        FailureReason::ProcessFailed {
                            exit_code,
                            message: first_line(&stderr),
                        },
                        start.elapsed(),
                        attempt,
                    );
                }
            }
        }
    }

    async fn pause(&self) {
        if !self.policy.backoff.is_zero() {
            tokio::time::sleep(self.policy.backoff).await;
        }
    }
}

fn first_line(stderr: &str) -> String {
    stderr
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("no diagnostics")
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Replays canned invocations and counts calls.
    struct Replay {
        script: Mutex<VecDeque<Invocation>>,
        calls: AtomicUsize,
        available: bool,
    }

    impl Replay {
        fn new(script: Vec<Invocation>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
                available: true,
            }
        }
    }

    impl GenerationBackend for Replay {
        fn name(&self) -> String {
            "replay".to_string()
        }

        async fn check_available(&self) -> Result<(), BackendError> {
            if self.available {
                Ok(())
            } else {
                Err(BackendError::Unavailable("replay offline".to_string()))
            }
        }

        async fn invoke(&self, _prompt: &str, _timeout: Duration) -> Invocation {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Invocation::Timeout {
                    elapsed: Duration::ZERO,
                })
        }
    }

    fn success(output: &str) -> Invocation {
        Invocation::Success {
            output: output.to_string(),
            elapsed: Duration::from_millis(5),
        }
    }

    fn process_error(transient: bool) -> Invocation {
        Invocation::ProcessError {
            exit_code: Some(1),
            stderr: "Error: could not connect to ollama app\n".to_string(),
            transient,
            elapsed: Duration::from_millis(1),
        }
    }

    fn timeout() -> Invocation {
        Invocation::Timeout {
            elapsed: Duration::from_secs(90),
        }
    }

    fn orchestrator(script: Vec<Invocation>) -> GenerationOrchestrator<Replay> {
        GenerationOrchestrator::new(Replay::new(script), Duration::from_secs(90)).with_retry_policy(
            RetryPolicy {
                backoff: Duration::ZERO,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_success_extracts_blocks() {
        let o = orchestrator(vec![success("```cpp\nEXPECT_TRUE(true);\n```")]);
        let result = o.run_prompt("Foo", "prompt").await;
        assert!(result.success);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.code_blocks, vec!["EXPECT_TRUE(true);"]);
    }

    #[tokio::test]
    async fn test_missing_block_is_not_retried() {
        let o = orchestrator(vec![
            success("Sorry, I can't."),
            success("```cpp\nEXPECT_TRUE(true);\n```"),
        ]);
        let result = o.run_prompt("Foo", "prompt").await;
        assert!(!result.success);
        assert_eq!(result.failure, Some(FailureReason::NoCodeBlockFound));
        assert_eq!(result.raw_output, "Sorry, I can't.");
        assert_eq!(o.backend().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_error_retried_once() {
        let o = orchestrator(vec![process_error(true), success("```cpp\nEXPECT_EQ(1, 1);\n```")]);
        let result = o.run_prompt("Foo", "prompt").await;
        assert!(result.success);
        assert_eq!(result.attempts, 2);

        let o = orchestrator(vec![process_error(true), process_error(true), process_error(true)]);
        let result = o.run_prompt("Foo", "prompt").await;
        assert_eq!(result.attempts, 2);
        assert_eq!(o.backend().calls.load(Ordering::SeqCst), 2);
        assert!(matches!(
            result.failure,
            Some(FailureReason::ProcessFailed { exit_code: Some(1), ref message }) if message == "Error: could not connect to ollama app"
        ));
    }

    #[tokio::test]
    async fn test_model_error_not_retried() {
        let o = orchestrator(vec![process_error(false), success("```cpp\nEXPECT_EQ(1, 1);\n```")]);
        let result = o.run_prompt("Foo", "prompt").await;
        assert!(!result.success);
        assert_eq!(result.attempts, 1);
    }

    #[tokio::test]
    async fn test_timeout_policy() {
        let o = orchestrator(vec![timeout(), timeout()]);
        let result = o.run_prompt("Foo", "prompt").await;
        assert_eq!(result.attempts, 2);
        assert_eq!(
            result.failure,
            Some(FailureReason::InvocationTimeout { timeout_ms: 90_000 })
        );

        let o = orchestrator(vec![timeout()]).with_retry_policy(RetryPolicy {
            retry_on_timeout: false,
            backoff: Duration::ZERO,
            ..Default::default()
        });
        assert_eq!(o.run_prompt("Foo", "prompt").await.attempts, 1);

        let o = orchestrator(vec![timeout()]).with_retry_policy(RetryPolicy::none());
        assert_eq!(o.run_prompt("Foo", "prompt").await.attempts, 1);
    }

    #[tokio::test]
    async fn test_retries_are_capped_at_one() {
        let o = orchestrator(vec![timeout(), timeout(), timeout()]).with_retry_policy(RetryPolicy {
            max_retries: 5,
            backoff: Duration::ZERO,
            ..Default::default()
        });
        assert_eq!(o.run_prompt("Foo", "prompt").await.attempts, 2);
    }

    #[tokio::test]
    async fn test_unavailable_backend() {
        let mut backend = Replay::new(Vec::new());
        backend.available = false;
        let o = GenerationOrchestrator::new(backend, Duration::from_secs(1));
        assert!(o.ensure_available().await.is_err());
        assert_eq!(o.backend().calls.load(Ordering::SeqCst), 0);
    }
}
