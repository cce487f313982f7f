//! CLI for generating Google Test suites from C++ headers.
//!
//! # Usage
//!
//! ```bash
//! # One header with its implementation
//! tc-generate src/OrderService.h --implementation src/OrderService.cpp --mocks test/mocks
//!
//! # A whole source tree, syntax-checked before writing
//! tc-generate --target-dir src --mocks test/mocks --compile-check -I include
//!
//! # Quick mode (no retries, parallel workers)
//! tc-generate --target-dir src --quick
//! ```
//!
//! Exit status is non-zero only when no generation could be attempted:
//! invalid configuration, no inputs, or an unreachable model backend.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tc_generator::{
    discover_units, pipeline_from_config, BackendKind, GeneratorConfig, PipelineError, UnitInput,
};
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = "tc-generate", version, about = "Generate Google Test suites for C++ classes with a local model")]
struct Cli {
    /// Header files to generate tests for.
    headers: Vec<PathBuf>,

    /// Paired implementation file (single header only).
    #[arg(long, value_name = "FILE")]
    implementation: Option<PathBuf>,

    /// Walk a directory for headers; `.cpp/.cc/.cxx` files with the same stem are paired.
    #[arg(long, value_name = "DIR")]
    target_dir: Option<PathBuf>,

    /// Mock search root (repeatable, searched in order).
    #[arg(long = "mocks", value_name = "DIR")]
    mock_roots: Vec<PathBuf>,

    /// Output directory for test files.
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Keep contexts, raw failures and the batch summary here.
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// JSON configuration file; flags override its values.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Model identifier.
    #[arg(short, long)]
    model: Option<String>,

    /// Provenance tag written into every test (default: the model).
    #[arg(long)]
    verifier: Option<String>,

    /// Per-invocation timeout in seconds.
    #[arg(short, long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Retries for transient failures (0 or 1).
    #[arg(long)]
    retries: Option<u32>,

    /// Do not retry timed-out invocations.
    #[arg(long)]
    no_retry_on_timeout: bool,

    /// Model transport.
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    /// Process backend command; `{model}` is substituted.
    #[arg(long, value_name = "CMD")]
    backend_command: Option<String>,

    /// Ollama base URL for the HTTP backend.
    #[arg(long, value_name = "URL")]
    ollama_url: Option<String>,

    /// Units processed concurrently.
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Style directive (repeatable): `aaa`, `table`, `one-test-per-method` or free text.
    #[arg(long)]
    style: Vec<String>,

    /// Include protected methods.
    #[arg(long)]
    include_protected: bool,

    /// Include private methods.
    #[arg(long)]
    include_private: bool,

    /// Use the text-pattern extractor even when the AST engine is available.
    #[arg(long)]
    no_ast: bool,

    /// Syntax-check generated files; optionally with a custom compiler command.
    #[arg(long, value_name = "CMD", num_args = 0..=1, require_equals = true, default_missing_value = tc_backend::DEFAULT_COMPILE_COMMAND)]
    compile_check: Option<String>,

    /// Include directory for the syntax check (repeatable).
    #[arg(short = 'I', long = "include-dir", value_name = "DIR")]
    include_dirs: Vec<PathBuf>,

    /// Quick preset (no retries, parallel workers).
    #[arg(long, conflicts_with = "thorough")]
    quick: bool,

    /// Thorough preset (longer timeout, compile check).
    #[arg(long)]
    thorough: bool,

    /// Print the batch report as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Debug logging.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Preset or config file, then flag overrides.
    fn config(&self) -> Result<GeneratorConfig, tc_generator::ConfigError> {
        let mut config = match &self.config {
            Some(path) => GeneratorConfig::from_file(path)?,
            None if self.quick => GeneratorConfig::quick(),
            None if self.thorough => GeneratorConfig::thorough(),
            None => GeneratorConfig::default(),
        };

        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(tag) = &self.verifier {
            config.verifier_tag = Some(tag.clone());
        }
        if let Some(secs) = self.timeout {
            config.timeout_secs = secs;
        }
        if let Some(retries) = self.retries {
            config.max_retries = retries;
        }
        if self.no_retry_on_timeout {
            config.retry_on_timeout = false;
        }
        if let Some(dir) = &self.output {
            config.output_dir = dir.clone();
        }
        if let Some(dir) = &self.cache_dir {
            config.cache_dir = Some(dir.clone());
        }
        config.mock_roots.extend(self.mock_roots.iter().cloned());
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(command) = &self.backend_command {
            config.backend_command = command.clone();
        }
        if let Some(url) = &self.ollama_url {
            config.ollama_url = Some(url.clone());
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        if !self.style.is_empty() {
            config.style = self.style.clone();
        }
        config.include_protected |= self.include_protected;
        config.include_private |= self.include_private;
        if self.no_ast {
            config.use_ast = false;
        }
        if let Some(command) = &self.compile_check {
            config.compile_check = Some(command.clone());
        }
        config.include_dirs.extend(self.include_dirs.iter().cloned());

        Ok(config)
    }

    fn inputs(&self) -> Result<Vec<UnitInput>, String> {
        if self.implementation.is_some() && self.headers.len() != 1 {
            return Err("--implementation needs exactly one header".to_string());
        }

        let mut inputs: Vec<UnitInput> = self
            .headers
            .iter()
            .map(|header| match &self.implementation {
                Some(implementation) => UnitInput::new(header).with_implementation(implementation),
                None => UnitInput::new(header).with_paired_implementation(),
            })
            .collect();

        if let Some(dir) = &self.target_dir {
            inputs.extend(discover_units(dir).map_err(|e| e.to_string())?);
        }

        if inputs.is_empty() {
            return Err("no input headers: pass header paths or --target-dir".to_string());
        }
        Ok(inputs)
    }
}

/// Initialize tracing to stderr; `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match cli.config() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let inputs = match cli.inputs() {
        Ok(inputs) => inputs,
        Err(message) => {
            error!("{}", message);
            return ExitCode::FAILURE;
        }
    };

    let pipeline = match pipeline_from_config(&config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match pipeline.run(inputs).await {
        Ok(report) => {
            if cli.json {
                match serde_json::to_string_pretty(&report) {
                    Ok(json) => println!("{}", json),
                    Err(e) => error!("cannot serialize report: {}", e),
                }
            } else {
                println!("{}", report.format_summary());
            }
            // Per-unit failures are reported, not fatal.
            ExitCode::SUCCESS
        }
        Err(e @ PipelineError::BackendUnavailable(_)) => {
            error!("{}", e);
            eprintln!("No tests were generated. Start the model runtime (e.g. `ollama serve`) and retry.");
            ExitCode::from(2)
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
