//! Batch pipeline: analyze, build context, generate, assemble, write.
//!
//! The backend is checked once before anything else; if it is unreachable
//! the batch fails as a whole and no unit is attempted. Past that point
//! every failure is per unit and recorded in the [`BatchReport`].

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tc_analyzer::{AnalyzeError, SourceAnalyzer};
use tc_backend::{CompileCheck, CompileOutcome, GenerationBackend};
use tc_core::{FailureReason, GenerationContext, GenerationOptions, SourceUnit, TestFile};
use tc_mocks::MockCatalog;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::assembler::ResponseAssembler;
use crate::context::ContextBuilder;
use crate::orchestrator::GenerationOrchestrator;
use crate::prompt::PromptBuilder;
use crate::report::{BatchReport, UnitOutcome, UnitReport};

const HEADER_EXTENSIONS: &[&str] = &["h", "hh", "hpp", "hxx"];
const IMPLEMENTATION_EXTENSIONS: &[&str] = &["cpp", "cc", "cxx"];

/// Batch-level errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("batch aborted: {0}")]
    BackendUnavailable(String),

    #[error("cannot scan {path}: {message}")]
    Discovery { path: PathBuf, message: String },

    #[error("worker task failed: {0}")]
    Worker(String),
}

/// One header to process, with its optional implementation file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitInput {
    pub header: PathBuf,
    pub implementation: Option<PathBuf>,
}

impl UnitInput {
    pub fn new(header: impl Into<PathBuf>) -> Self {
        Self {
            header: header.into(),
            implementation: None,
        }
    }

    #[must_use]
    pub fn with_implementation(mut self, implementation: impl Into<PathBuf>) -> Self {
        self.implementation = Some(implementation.into());
        self
    }

    /// Attach `<stem>.cpp|.cc|.cxx` from the header's directory, if present.
    #[must_use]
    pub fn with_paired_implementation(mut self) -> Self {
        if self.implementation.is_none() {
            self.implementation = paired_implementation(&self.header);
        }
        self
    }
}

fn paired_implementation(header: &Path) -> Option<PathBuf> {
    let stem = header.file_stem()?;
    let dir = header.parent().unwrap_or_else(|| Path::new(""));
    IMPLEMENTATION_EXTENSIONS.iter().find_map(|ext| {
        let mut name = stem.to_os_string();
        name.push(".");
        name.push(ext);
        let candidate = dir.join(name);
        candidate.is_file().then_some(candidate)
    })
}

/// Headers under `dir`, sorted, each with its paired implementation.
pub fn discover_units(dir: &Path) -> Result<Vec<UnitInput>, PipelineError> {
    if !dir.is_dir() {
        return Err(PipelineError::Discovery {
            path: dir.to_path_buf(),
            message: "not a directory".to_string(),
        });
    }

    let mut units = Vec::new();
    let walker = WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored_dir(e));

    for entry in walker {
        let entry = entry.map_err(|e| PipelineError::Discovery {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let is_header = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| HEADER_EXTENSIONS.contains(&e.to_lowercase().as_str()));
        if is_header && !is_mock_path(path.strip_prefix(dir).unwrap_or(path)) {
            units.push(UnitInput::new(path).with_paired_implementation());
        }
    }

    debug!(dir = %dir.display(), units = units.len(), "discovered headers");
    Ok(units)
}

fn is_ignored_dir(entry: &walkdir::DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.')
        || name == "build"
        || name.starts_with("cmake-build")
        || name == "target"
        || name == "node_modules"
}

/// Mocks and fakes are collaborators, not units under test.
fn is_mock_path(path: &Path) -> bool {
    path.iter().any(|part| {
        let part = part.to_string_lossy().to_lowercase();
        part.contains("mock") || part.contains("fake")
    })
}

/// Pipeline settings that are not part of the generation options.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub output_dir: PathBuf,
    pub cache_dir: Option<PathBuf>,
    pub jobs: usize,
    pub compile_check: Option<CompileCheck>,
}

impl PipelineSettings {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            cache_dir: None,
            jobs: 1,
            compile_check: None,
        }
    }
}

struct Shared<B> {
    analyzer: SourceAnalyzer,
    catalog: MockCatalog,
    orchestrator: GenerationOrchestrator<B>,
    options: GenerationOptions,
    settings: PipelineSettings,
}

/// The batch pipeline.
///
/// The catalog is read-only after construction and shared by all workers.
pub struct Pipeline<B> {
    shared: Arc<Shared<B>>,
}

impl<B: GenerationBackend + 'static> Pipeline<B> {
    pub fn new(
        analyzer: SourceAnalyzer,
        catalog: MockCatalog,
        orchestrator: GenerationOrchestrator<B>,
        options: GenerationOptions,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                analyzer,
                catalog,
                orchestrator,
                options,
                settings,
            }),
        }
    }

    pub fn catalog(&self) -> &MockCatalog {
        &self.shared.catalog
    }

    /// Run the batch. Report order equals input order.
    pub async fn run(&self, inputs: Vec<UnitInput>) -> Result<BatchReport, PipelineError> {
        let start = Instant::now();
        let shared = &self.shared;

        shared
            .orchestrator
            .ensure_available()
            .await
            .map_err(|e| PipelineError::BackendUnavailable(e.to_string()))?;

        let jobs = shared.settings.jobs.max(1);
        info!(
            units = inputs.len(),
            jobs,
            mocks = shared.catalog.len(),
            extractor = shared.analyzer.kind().name(),
            "starting test generation"
        );

        let analyzed = self.analyze_all(inputs).await?;
        let units = if jobs == 1 || analyzed.len() <= 1 {
            let mut units = Vec::with_capacity(analyzed.len());
            for unit in analyzed {
                units.push(shared.complete(unit).await);
            }
            units
        } else {
            self.run_parallel(analyzed, jobs).await?
        };

        let report = BatchReport::new(
            shared.options.model.clone(),
            shared.orchestrator.backend().name(),
            shared.analyzer.kind().name().to_string(),
            units,
            shared.catalog.warnings().iter().map(ToString::to_string).collect(),
            start.elapsed(),
        );

        if let Some(dir) = shared.settings.cache_dir.clone() {
            let summary = report.clone();
            match tokio::task::spawn_blocking(move || summary.write_summary(&dir)).await {
                Ok(Ok(path)) => debug!(path = %path.display(), "wrote batch summary"),
                Ok(Err(e)) => warn!(error = %e, "cannot write batch summary"),
                Err(e) => warn!(error = %e, "batch summary task failed"),
            }
        }

        info!(
            generated = report.generated,
            skipped = report.skipped,
            failed = report.failed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "test generation finished"
        );
        Ok(report)
    }

    /// Parse every header off the async workers, then claim output files in
    /// input order.
    async fn analyze_all(&self, inputs: Vec<UnitInput>) -> Result<Vec<Analyzed>, PipelineError> {
        let shared = Arc::clone(&self.shared);
        tokio::task::spawn_blocking(move || {
            let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();
            inputs
                .into_iter()
                .map(|input| match shared.analyze(input) {
                    Analyzed::Ready { unit, analysis } => {
                        let output = shared.output_path(&unit.class_name);
                        if let Some(first) = claimed.get(&output) {
                            return collision(&unit, &output, first);
                        }
                        claimed.insert(output, unit.header_path.clone());
                        Analyzed::Ready { unit, analysis }
                    }
                    done => done,
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| PipelineError::Worker(e.to_string()))
    }

    async fn run_parallel(&self, analyzed: Vec<Analyzed>, jobs: usize) -> Result<Vec<UnitReport>, PipelineError> {
        let permits = Arc::new(Semaphore::new(jobs));
        let mut set = JoinSet::new();
        let total = analyzed.len();

        for (index, unit) in analyzed.into_iter().enumerate() {
            let shared = Arc::clone(&self.shared);
            let permits = Arc::clone(&permits);
            set.spawn(async move {
                let _permit = permits.acquire_owned().await;
                (index, shared.complete(unit).await)
            });
        }

        let mut slots: Vec<Option<UnitReport>> = vec![None; total];
        while let Some(joined) = set.join_next().await {
            let (index, report) = joined.map_err(|e| {
                error!(error = %e, "worker task failed");
                PipelineError::Worker(e.to_string())
            })?;
            slots[index] = Some(report);
        }
        Ok(slots.into_iter().flatten().collect())
    }
}

/// A unit after analysis: ready for generation, or already decided.
enum Analyzed {
    Ready { unit: SourceUnit, analysis: Duration },
    Done(UnitReport),
}

fn collision(unit: &SourceUnit, output: &Path, first: &Path) -> Analyzed {
    let reason = FailureReason::OutputCollision {
        path: output.display().to_string(),
        first_header: first.display().to_string(),
    };
    warn!(header = %unit.header_path.display(), "{}", reason);
    let mut report = UnitReport::new(
        unit.header_path.clone(),
        UnitOutcome::Failed {
            reason,
            raw_output: String::new(),
        },
    );
    report.class_name = Some(unit.class_name.clone());
    report.degraded = unit.degraded;
    Analyzed::Done(report)
}

/// Context dump written to the cache for debugging.
#[derive(Serialize)]
struct CachedContext<'a> {
    context: &'a GenerationContext,
    prompt: &'a str,
}

impl<B: GenerationBackend> Shared<B> {
    fn output_path(&self, class: &str) -> PathBuf {
        self.settings.output_dir.join(format!("{class}Test.cpp"))
    }

    fn analyze(&self, input: UnitInput) -> Analyzed {
        let start = Instant::now();
        let header = input.header.clone();

        match self.analyzer.analyze(&input.header, input.implementation.as_deref()) {
            Ok(unit) => Analyzed::Ready {
                unit,
                analysis: start.elapsed(),
            },
            Err(e @ AnalyzeError::Parse { .. }) => {
                info!(header = %header.display(), "skipped: no class declaration");
                Analyzed::Done(UnitReport::new(header, UnitOutcome::Skipped { reason: e.to_string() }))
            }
            Err(e @ AnalyzeError::Io { .. }) => {
                warn!(header = %header.display(), error = %e, "cannot read input");
                Analyzed::Done(UnitReport::new(
                    header,
                    UnitOutcome::Failed {
                        reason: FailureReason::Io { message: e.to_string() },
                        raw_output: String::new(),
                    },
                ))
            }
        }
    }

    async fn complete(&self, analyzed: Analyzed) -> UnitReport {
        match analyzed {
            Analyzed::Ready { unit, analysis } => self.generate(unit, analysis).await,
            Analyzed::Done(report) => report,
        }
    }

    async fn generate(&self, unit: SourceUnit, analysis: Duration) -> UnitReport {
        let start = Instant::now();

        let context = ContextBuilder::build(&unit, &self.catalog, &self.options);
        let prompt = PromptBuilder::build_generation_prompt(&context);
        self.cache_context(&context, &prompt).await;

        let class = unit.class_name.clone();
        let result = self.orchestrator.run_prompt(&class, &prompt).await;

        let attempts = result.attempts;

        let outcome = match result.failure {
            Some(reason) => self.fail(&class, reason, result.raw_output).await,
            None => match ResponseAssembler::assemble(&result.raw_output, &context) {
                Ok(file) => self.finish(&context, &file, result.raw_output).await,
                Err(e) => self.fail(&class, e.reason(), result.raw_output).await,
            },
        };

        let mut report = UnitReport::new(unit.header_path, outcome);
        report.class_name = Some(class);
        report.attempts = attempts;
        report.degraded = unit.degraded;
        report.mocks = context.mocks.iter().map(|m| m.mock_class.clone()).collect();
        report.unmocked = context.unmocked;
        report.elapsed = analysis + start.elapsed();
        report
    }

    /// Optional compile check, then the atomic write.
    async fn finish(&self, context: &GenerationContext, file: &TestFile, raw_output: String) -> UnitOutcome {
        let class = context.unit.class_name.as_str();
        let source = file.render();

        if let Some(check) = &self.settings.compile_check {
            let check = check.clone().with_include_dirs(include_dirs(context));
            if let CompileOutcome::Failed { message, .. } = check.check(&file.file_name(), &source).await {
                return self.fail(class, FailureReason::CompileCheckFailed { message }, raw_output).await;
            }
        }

        let path = self.output_path(class);
        match write_file(path.clone(), source).await {
            Ok(()) => {
                info!(class, path = %path.display(), cases = file.cases.len(), "generated test file");
                UnitOutcome::Generated {
                    output: path,
                    cases: file.cases.len(),
                }
            }
            Err(e) => {
                self.fail(
                    class,
                    FailureReason::Io {
                        message: format!("cannot write {}: {}", path.display(), e),
                    },
                    raw_output,
                )
                .await
            }
        }
    }

    async fn fail(&self, class: &str, reason: FailureReason, raw_output: String) -> UnitOutcome {
        warn!(class, reason = reason.name(), "generation failed: {}", reason);
        if let Some(dir) = &self.settings.cache_dir {
            let path = dir.join(format!("{class}.raw.txt"));
            if let Err(e) = write_file(path.clone(), raw_output.clone()).await {
                warn!(path = %path.display(), error = %e, "cannot keep raw output");
            }
        }
        UnitOutcome::Failed { reason, raw_output }
    }

    async fn cache_context(&self, context: &GenerationContext, prompt: &str) {
        let Some(dir) = &self.settings.cache_dir else {
            return;
        };
        let path = dir.join(format!("{}_test_context.json", context.unit.class_name));
        let written = match serde_json::to_string_pretty(&CachedContext { context, prompt }) {
            Ok(json) => write_file(path.clone(), json).await,
            Err(e) => Err(std::io::Error::other(e)),
        };
        if let Err(e) = written {
            warn!(path = %path.display(), error = %e, "cannot cache generation context");
        }
    }
}

/// Directories the generated includes resolve against: the header's own
/// directory, then each mock's discovery root.
fn include_dirs(context: &GenerationContext) -> Vec<PathBuf> {
    let header_dir = match context.unit.header_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mock_roots = context.mocks.iter().filter_map(|mock| {
        let depth = Path::new(&mock.include_path).components().count();
        mock.path.ancestors().nth(depth).map(Path::to_path_buf)
    });
    std::iter::once(header_dir).chain(mock_roots).collect()
}

async fn write_file(path: PathBuf, contents: String) -> std::io::Result<()> {
    tokio::task::spawn_blocking(move || write_atomically(&path, &contents))
        .await
        .map_err(std::io::Error::other)?
}

/// Write through a temporary file in the target directory, then rename.
fn write_atomically(path: &Path, contents: &str) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
