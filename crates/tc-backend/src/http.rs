//! Ollama HTTP backend.
//!
//! `/api/tags` answers the readiness probe and `/api/generate` (non-streaming)
//! produces the completion. Every call is a stateless request, so no context
//! is carried between units.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::invocation::Invocation;
use crate::{BackendError, GenerationBackend};

/// Default Ollama endpoint.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

/// Ollama reached over its HTTP API.
#[derive(Debug, Clone)]
pub struct OllamaHttpBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaHttpBackend {
    /// `base_url` defaults to [`DEFAULT_BASE_URL`].
    pub fn new(model: impl Into<String>, base_url: Option<String>) -> Self {
        let base_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl GenerationBackend for OllamaHttpBackend {
    fn name(&self) -> String {
        format!("ollama-http:{}", self.base_url)
    }

    async fn check_available(&self) -> Result<(), BackendError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(format!("Ollama unreachable at {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(BackendError::Unavailable(format!(
                "Ollama returned {} for {url}",
                response.status()
            )));
        }

        match response.json::<TagsResponse>().await {
            Ok(tags) if !tags_include(&tags, &self.model) => {
                warn!(model = %self.model, "model not listed by Ollama; it may be pulled on first use");
            }
            Ok(_) => debug!(model = %self.model, "Ollama health check passed"),
            Err(e) => warn!(error = %e, "unexpected /api/tags payload"),
        }
        Ok(())
    }

    async fn invoke(&self, prompt: &str, timeout: Duration) -> Invocation {
        let start = Instant::now();
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let sent = self
            .client
            .post(&url)
            .json(&request)
            .timeout(timeout)
            .send()
            .await;

        let response = match sent {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return Invocation::Timeout {
                    elapsed: start.elapsed(),
                }
            }
            Err(e) => {
                return Invocation::ProcessError {
                    exit_code: None,
                    stderr: format!("Ollama HTTP error: {e}"),
                    transient: e.is_connect(),
                    elapsed: start.elapsed(),
                }
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Invocation::ProcessError {
                exit_code: Some(i32::from(status.as_u16())),
                stderr: format!("Ollama returned {status}: {body}"),
                transient: status.is_server_error(),
                elapsed: start.elapsed(),
            };
        }

        match response.json::<GenerateResponse>().await {
            Ok(body) => Invocation::Success {
                output: body.response,
                elapsed: start.elapsed(),
            },
            Err(e) if e.is_timeout() => Invocation::Timeout {
                elapsed: start.elapsed(),
            },
            Err(e) => Invocation::ProcessError {
                exit_code: Some(i32::from(status.as_u16())),
                stderr: format!("Ollama JSON parse error: {e}"),
                transient: false,
                elapsed: start.elapsed(),
            },
        }
    }
}

fn tags_include(tags: &TagsResponse, model: &str) -> bool {
    let latest = format!("{model}:latest");
    tags.models.iter().any(|m| m.name == model || m.name == latest)
}
