//! Generator configuration.
//!
//! Built from a preset (`default`, `quick`, `thorough`), optionally replaced
//! by a JSON file, then overridden field by field from the command line.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tc_backend::{Backend, BackendError, CompileCheck, OllamaHttpBackend, ProcessBackend};
use tc_core::{GenerationOptions, StyleDirective};

/// Default model command; `{model}` is substituted.
pub const DEFAULT_BACKEND_COMMAND: &str = "ollama run {model}";

/// Which transport reaches the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Child process, prompt on stdin
    #[default]
    Process,
    /// Ollama HTTP API
    Http,
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid setting `{field}`: {message}")]
    Invalid { field: &'static str, message: String },

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Generator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Model identifier passed to the backend
    pub model: String,
    /// Provenance tag echoed into generated code (defaults to the model)
    pub verifier_tag: Option<String>,
    /// Wall-clock budget per invocation, in seconds
    pub timeout_secs: u64,
    /// Retries for transient invocation failures (0 or 1)
    pub max_retries: u32,
    /// Whether a timed-out attempt counts as transient
    pub retry_on_timeout: bool,
    /// Where test files are written
    pub output_dir: PathBuf,
    /// Where contexts, raw failures and the batch summary are kept
    pub cache_dir: Option<PathBuf>,
    /// Mock search roots, in discovery order
    pub mock_roots: Vec<PathBuf>,
    pub include_protected: bool,
    pub include_private: bool,
    /// Style directives, e.g. `aaa`, `table`, `one-test-per-method`
    pub style: Vec<String>,
    pub backend: BackendKind,
    /// Process backend command template
    pub backend_command: String,
    /// Ollama base URL for the HTTP backend
    pub ollama_url: Option<String>,
    /// Units processed concurrently
    pub jobs: usize,
    /// Prefer the AST engine over the text-pattern fallback
    pub use_ast: bool,
    /// Compiler command for the syntax check; `None` disables it
    pub compile_check: Option<String>,
    pub compile_timeout_secs: u64,
    /// Extra `-I` directories for the syntax check
    pub include_dirs: Vec<PathBuf>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        let options = GenerationOptions::default();
        Self {
            model: options.model,
            verifier_tag: None,
            timeout_secs: 90,
            max_retries: 1,
            retry_on_timeout: true,
            output_dir: PathBuf::from("generated_tests"),
            cache_dir: None,
            mock_roots: Vec::new(),
            include_protected: false,
            include_private: false,
            style: vec!["arrange-act-assert".to_string()],
            backend: BackendKind::Process,
            backend_command: DEFAULT_BACKEND_COMMAND.to_string(),
            ollama_url: None,
            jobs: 1,
            use_ast: true,
            compile_check: None,
            compile_timeout_secs: 30,
            include_dirs: Vec::new(),
        }
    }
}

impl GeneratorConfig {
    /// Quick config for fast iteration.
    pub fn quick() -> Self {
        Self {
            timeout_secs: 60,
            max_retries: 0,
            retry_on_timeout: false,
            jobs: num_cpus::get().clamp(1, 4),
            ..Default::default()
        }
    }

    /// Thorough config for production.
    pub fn thorough() -> Self {
        Self {
            timeout_secs: 120,
            style: vec![
                "one-test-per-method".to_string(),
                "arrange-act-assert".to_string(),
            ],
            compile_check: Some(tc_backend::DEFAULT_COMPILE_COMMAND.to_string()),
            ..Default::default()
        }
    }

    /// Load a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(invalid("model", "must not be empty"));
        }
        if self.timeout_secs == 0 {
            return Err(invalid("timeout_secs", "must be at least 1"));
        }
        if self.max_retries > 1 {
            return Err(invalid(
                "max_retries",
                format!("at most one retry is allowed, got {}", self.max_retries),
            ));
        }
        if self.jobs == 0 {
            return Err(invalid("jobs", "must be at least 1"));
        }
        if self.backend == BackendKind::Process && self.backend_command.trim().is_empty() {
            return Err(invalid("backend_command", "must not be empty"));
        }
        if self.compile_check.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(invalid("compile_check", "must not be empty when set"));
        }
        if self.compile_check.is_some() && self.compile_timeout_secs == 0 {
            return Err(invalid("compile_timeout_secs", "must be at least 1"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Options carried into every generation context.
    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            model: self.model.clone(),
            verifier_tag: self.verifier_tag.clone(),
            style: self.style.iter().map(|s| StyleDirective::parse(s)).collect(),
            include_protected: self.include_protected,
            include_private: self.include_private,
        }
    }

    /// Construct the configured backend.
    pub fn build_backend(&self) -> Result<Backend, ConfigError> {
        let backend: Backend = match self.backend {
            BackendKind::Process => {
                ProcessBackend::from_command(&self.backend_command, &self.model)?.into()
            }
            BackendKind::Http => OllamaHttpBackend::new(&self.model, self.ollama_url.clone()).into(),
        };
        Ok(backend)
    }

    /// Construct the compile check, if enabled.
    pub fn build_compile_check(&self) -> Result<Option<CompileCheck>, ConfigError> {
        let Some(command) = &self.compile_check else {
            return Ok(None);
        };
        let check = CompileCheck::from_command(command, Duration::from_secs(self.compile_timeout_secs))?
            .with_include_dirs(self.include_dirs.iter().cloned());
        Ok(Some(check))
    }
}

fn invalid(field: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tc_backend::GenerationBackend;

    use super::*;

    #[test]
    fn test_presets_are_valid() {
        GeneratorConfig::default().validate().unwrap();
        GeneratorConfig::quick().validate().unwrap();
        GeneratorConfig::thorough().validate().unwrap();

        assert_eq!(GeneratorConfig::quick().max_retries, 0);
        assert!(GeneratorConfig::thorough().compile_check.is_some());
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let zero_timeout = GeneratorConfig {
            timeout_secs: 0,
            ..Default::default()
        };
        assert!(matches!(
            zero_timeout.validate(),
            Err(ConfigError::Invalid { field: "timeout_secs", .. })
        ));

        let retries = GeneratorConfig {
            max_retries: 3,
            ..Default::default()
        };
        assert!(matches!(
            retries.validate(),
            Err(ConfigError::Invalid { field: "max_retries", .. })
        ));

        let jobs = GeneratorConfig {
            jobs: 0,
            ..Default::default()
        };
        assert!(jobs.validate().is_err());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"model": "qwen2.5-coder:7b", "backend": "http", "style": ["table"], "jobs": 2}}"#
        )
        .unwrap();

        let config = GeneratorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.model, "qwen2.5-coder:7b");
        assert_eq!(config.backend, BackendKind::Http);
        assert_eq!(config.jobs, 2);
        assert_eq!(config.timeout_secs, 90);
        assert_eq!(
            config.generation_options().style,
            vec![StyleDirective::TableStyleCases]
        );
    }

    #[test]
    fn test_malformed_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            GeneratorConfig::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            GeneratorConfig::from_file(Path::new("/nonexistent/tc.json")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_build_backend() {
        let config = GeneratorConfig {
            model: "llama3".to_string(),
            ..Default::default()
        };
        assert_eq!(config.build_backend().unwrap().name(), "process:ollama");

        let http = GeneratorConfig {
            backend: BackendKind::Http,
            ollama_url: Some("http://gpu-box:11434".to_string()),
            ..Default::default()
        };
        assert_eq!(http.build_backend().unwrap().name(), "ollama-http:http://gpu-box:11434");

        let empty = GeneratorConfig {
            backend_command: " ".to_string(),
            ..Default::default()
        };
        assert!(empty.build_backend().is_err());
    }
}
