//! # tc-generator
//!
//! Model-driven generation of Google Test suites for C++ classes.
//!
//! # Usage
//!
//! ```bash
//! # One header, mocks discovered under test/mocks
//! cargo run -p tc-generator --bin tc-generate -- src/StringUtils.h --mocks test/mocks
//!
//! # Every header under src/, four at a time, through the Ollama HTTP API
//! cargo run -p tc-generator --bin tc-generate -- --target-dir src --backend http --jobs 4
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  C++ header  │ ──> │ SourceUnit   │ ──> │   Context    │ <── MockCatalog
//! │ (+ .cpp)     │     │ (AST/pattern)│     │   Builder    │
//! └──────────────┘     └──────────────┘     └──────┬───────┘
//!                                                  │ prompt
//!                                                  ▼
//!                                           ┌──────────────┐
//!                                           │ Orchestrator │ ── timeout, one retry
//!                                           └──────┬───────┘
//!                                                  │ raw output
//!                                                  ▼
//!                                           ┌──────────────┐     ┌──────────────┐
//!                                           │  Assembler   │ ──> │ <Class>Test  │
//!                                           └──────────────┘     │    .cpp      │
//!                                                                └──────────────┘
//! ```

pub mod assembler;
pub mod config;
pub mod context;
pub mod orchestrator;
pub mod pipeline;
pub mod prompt;
pub mod report;

pub use assembler::{extract_code_blocks, strip_reasoning, AssemblyError, ResponseAssembler};
pub use config::{BackendKind, ConfigError, GeneratorConfig};
pub use context::ContextBuilder;
pub use orchestrator::{GenerationOrchestrator, RetryPolicy};
pub use pipeline::{discover_units, Pipeline, PipelineError, PipelineSettings, UnitInput};
pub use prompt::PromptBuilder;
pub use report::{BatchReport, UnitOutcome, UnitReport};

use tc_analyzer::SourceAnalyzer;
use tc_backend::Backend;
use tc_mocks::MockCatalog;

/// Assemble a pipeline from a validated configuration.
pub fn pipeline_from_config(config: &GeneratorConfig) -> Result<Pipeline<Backend>, ConfigError> {
    config.validate()?;

    let backend = config.build_backend()?;
    let orchestrator = GenerationOrchestrator::new(backend, config.timeout()).with_retry_policy(RetryPolicy {
        max_retries: config.max_retries,
        retry_on_timeout: config.retry_on_timeout,
        ..Default::default()
    });

    let catalog = MockCatalog::discover(&config.mock_roots);
    let settings = PipelineSettings {
        output_dir: config.output_dir.clone(),
        cache_dir: config.cache_dir.clone(),
        jobs: config.jobs,
        compile_check: config.build_compile_check()?,
    };

    Ok(Pipeline::new(
        SourceAnalyzer::new(config.use_ast),
        catalog,
        orchestrator,
        config.generation_options(),
        settings,
    ))
}
