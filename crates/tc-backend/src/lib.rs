//! # tc-backend
//!
//! External generation backends and the compile syntax check.
//!
//! A backend is anything that takes a prompt and returns generated text. The
//! call has process-boundary semantics, so its outcome is modelled as an
//! [`Invocation`] value (`Success | Timeout | ProcessError`) rather than an
//! error that unwinds through the orchestrator.
//!
//! | Backend | Transport | Readiness probe |
//! |---------|-----------|-----------------|
//! | [`ProcessBackend`] | `ollama run <model>`, prompt on stdin | `ollama list` |
//! | [`OllamaHttpBackend`] | `POST /api/generate` (feature `http`) | `GET /api/tags` |

pub mod compile;
#[cfg(feature = "http")]
pub mod http;
pub mod invocation;
pub mod process;

use std::future::Future;
use std::time::Duration;

pub use compile::{CompileCheck, CompileOutcome, DEFAULT_COMPILE_COMMAND};
#[cfg(feature = "http")]
pub use http::{OllamaHttpBackend, DEFAULT_BASE_URL};
pub use invocation::{is_transient_message, Invocation};
pub use process::ProcessBackend;

/// Backend errors.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("model backend unavailable: {0}")]
    Unavailable(String),

    #[error("invalid backend command: {0:?}")]
    InvalidCommand(String),
}

/// A text-in, text-out model runtime.
pub trait GenerationBackend: Send + Sync {
    /// Name for logs and reports.
    fn name(&self) -> String;

    /// Readiness check, run once before a batch.
    fn check_available(&self) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Run one prompt under a wall-clock timeout.
    fn invoke(&self, prompt: &str, timeout: Duration) -> impl Future<Output = Invocation> + Send;
}

/// Which backend a run talks to.
#[derive(Debug, Clone)]
pub enum Backend {
    Process(ProcessBackend),
    #[cfg(feature = "http")]
    Http(OllamaHttpBackend),
}

impl GenerationBackend for Backend {
    fn name(&self) -> String {
        match self {
            Backend::Process(backend) => backend.name(),
            #[cfg(feature = "http")]
            Backend::Http(backend) => backend.name(),
        }
    }

    async fn check_available(&self) -> Result<(), BackendError> {
        match self {
            Backend::Process(backend) => backend.check_available().await,
            #[cfg(feature = "http")]
            Backend::Http(backend) => backend.check_available().await,
        }
    }

    async fn invoke(&self, prompt: &str, timeout: Duration) -> Invocation {
        match self {
            Backend::Process(backend) => backend.invoke(prompt, timeout).await,
            #[cfg(feature = "http")]
            Backend::Http(backend) => backend.invoke(prompt, timeout).await,
        }
    }
}

impl From<ProcessBackend> for Backend {
    fn from(backend: ProcessBackend) -> Self {
        Backend::Process(backend)
    }
}

#[cfg(feature = "http")]
impl From<OllamaHttpBackend> for Backend {
    fn from(backend: OllamaHttpBackend) -> Self {
        Backend::Http(backend)
    }
}
