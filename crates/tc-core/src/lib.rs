//! # tc-core
//!
//! Core data model for the C++ test generation pipeline.
//!
//! Data flows strictly downstream:
//!
//! ```text
//! SourceAnalyzer ──> SourceUnit ──┐
//!                                 ├──> GenerationContext ──> GenerationResult ──> TestFile
//! MockCatalog ─────> MockBinding ─┘
//! ```
//!
//! Only the mock catalog outlives a single file; everything else here is
//! built per unit and dropped once its test file is written (or fails).

pub mod context;
pub mod mock;
pub mod result;
pub mod signature;
pub mod test_file;
pub mod types;
pub mod unit;

pub use context::{GenerationContext, GenerationOptions, StyleDirective};
pub use mock::MockBinding;
pub use result::{FailureReason, GenerationResult};
pub use signature::{Access, MethodSignature, Parameter, Qualifiers};
pub use test_file::{CaseLayout, TestCase, TestFile, FRAMEWORK_INCLUDES};
pub use unit::SourceUnit;
