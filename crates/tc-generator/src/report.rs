//! Batch reporting.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tc_core::result::duration_ms;
use tc_core::FailureReason;

/// Summary file written next to the cache.
pub const SUMMARY_FILE_NAME: &str = "test_generation_summary.json";

/// Outcome for one unit.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitOutcome {
    /// A test file was written
    Generated { output: PathBuf, cases: usize },
    /// No class declaration was found
    Skipped { reason: String },
    /// Generation or assembly failed
    Failed {
        reason: FailureReason,
        #[serde(skip_serializing_if = "String::is_empty")]
        raw_output: String,
    },
}

impl UnitOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            UnitOutcome::Generated { .. } => "generated",
            UnitOutcome::Skipped { .. } => "skipped",
            UnitOutcome::Failed { .. } => "failed",
        }
    }
}

/// Report for one input header.
#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    pub header: PathBuf,
    /// Primary class, once analyzed
    pub class_name: Option<String>,
    pub outcome: UnitOutcome,
    /// Model invocations made
    pub attempts: u32,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
    pub degraded: bool,
    pub mocks: Vec<String>,
    pub unmocked: Vec<String>,
}

impl UnitReport {
    pub fn new(header: PathBuf, outcome: UnitOutcome) -> Self {
        Self {
            header,
            class_name: None,
            outcome,
            attempts: 0,
            elapsed: Duration::ZERO,
            degraded: false,
            mocks: Vec::new(),
            unmocked: Vec::new(),
        }
    }
}

/// Per-unit outcomes in input order, plus aggregate counts.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub model: String,
    pub backend: String,
    pub extractor: String,
    pub units: Vec<UnitReport>,
    pub mock_warnings: Vec<String>,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
    pub generated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn new(
        model: String,
        backend: String,
        extractor: String,
        units: Vec<UnitReport>,
        mock_warnings: Vec<String>,
        elapsed: Duration,
    ) -> Self {
        let count = |label: &str| units.iter().filter(|u| u.outcome.label() == label).count();
        let (generated, skipped, failed) = (count("generated"), count("skipped"), count("failed"));
        Self {
            model,
            backend,
            extractor,
            units,
            mock_warnings,
            elapsed,
            generated,
            skipped,
            failed,
        }
    }

    pub fn total(&self) -> usize {
        self.units.len()
    }

    /// Write `test_generation_summary.json` into `dir`.
    pub fn write_summary(&self, dir: &Path) -> io::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(SUMMARY_FILE_NAME);
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        fs::write(&path, json)?;
        Ok(path)
    }

    /// Format as a summary string.
    pub fn format_summary(&self) -> String {
        let status = if self.failed == 0 { "OK" } else { "FAILURES" };
        let mut summary = format!(
            "[{}] {} header(s) processed in {:.2}s ({}, {} extractor)\n",
            status,
            self.total(),
            self.elapsed.as_secs_f64(),
            self.backend,
            self.extractor,
        );

        for unit in &self.units {
            let name = unit
                .class_name
                .clone()
                .unwrap_or_else(|| unit.header.display().to_string());
            let detail = match &unit.outcome {
                UnitOutcome::Generated { output, cases } => {
                    format!("{} case(s) -> {}", cases, output.display())
                }
                UnitOutcome::Skipped { reason } => reason.clone(),
                UnitOutcome::Failed { reason, .. } => format!("{}: {}", reason.name(), reason),
            };
            summary.push_str(&format!(
                "  {:<9} {} ({} attempt(s), {:.1}s){}: {}\n",
                unit.outcome.label(),
                name,
                unit.attempts,
                unit.elapsed.as_secs_f64(),
                if unit.degraded { " [degraded]" } else { "" },
                detail
            ));
        }

        for warning in &self.mock_warnings {
            summary.push_str(&format!("  warning: {}\n", warning));
        }

        summary.push_str(&format!(
            "\nGenerated: {}  Skipped: {}  Failed: {}  Total: {}\n",
            self.generated,
            self.skipped,
            self.failed,
            self.total()
        ));
        summary
    }
}
