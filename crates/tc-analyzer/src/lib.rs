//! # tc-analyzer
//!
//! Extracts the method surface of the primary class declared in a C++ header.
//!
//! Two extractors implement [`SignatureExtractor`]:
//!
//! | Extractor | Engine | Fidelity |
//! |-----------|--------|----------|
//! | [`AstExtractor`] | tree-sitter-cpp (feature `ast`) | typed AST nodes, templates and namespaces intact |
//! | [`PatternExtractor`] | regex over comment-stripped text | approximate; results flagged `degraded` |
//!
//! The extractor is chosen once at startup by [`select_extractor`]. Callers
//! only see [`SourceAnalyzer`], which also falls back to the pattern path when
//! the AST path finds no class.

#[cfg(feature = "ast")]
pub mod ast;
pub mod pattern;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tc_core::types::dependency_type;
use tc_core::{MethodSignature, SourceUnit};
use tracing::{debug, warn};

#[cfg(feature = "ast")]
pub use ast::AstExtractor;
pub use pattern::PatternExtractor;

/// Which engine produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorKind {
    /// tree-sitter AST traversal
    Ast,
    /// Text-pattern fallback
    Pattern,
}

impl ExtractorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ExtractorKind::Ast => "ast",
            ExtractorKind::Pattern => "pattern",
        }
    }

    /// Results from this engine are lower-confidence.
    pub fn is_degraded(&self) -> bool {
        matches!(self, ExtractorKind::Pattern)
    }
}

/// A class or struct definition found in a header.
#[derive(Debug, Clone, Default)]
pub struct ClassDecl {
    /// Unqualified class name
    pub name: String,
    /// Enclosing namespaces, outermost first
    pub namespace: Vec<String>,
    /// Declared with `struct`
    pub is_struct: bool,
    /// Member function signatures in declaration order
    pub signatures: Vec<MethodSignature>,
    /// Constructor parameter and data member types
    pub collaborators: Vec<String>,
}

impl ClassDecl {
    pub fn new(name: impl Into<String>, namespace: Vec<String>, is_struct: bool) -> Self {
        Self {
            name: name.into(),
            namespace,
            is_struct,
            ..Default::default()
        }
    }

    /// Add a signature unless an equal one (same name and parameter types) exists.
    pub fn push_signature(&mut self, signature: MethodSignature) {
        if !self.signatures.contains(&signature) {
            self.signatures.push(signature);
        }
    }

    /// Add a collaborator type once. Primitives and `std::` types are dropped.
    pub fn push_collaborator(&mut self, ty: String) {
        if dependency_type(&ty).is_some() && !self.collaborators.contains(&ty) {
            self.collaborators.push(ty);
        }
    }
}

/// Engine-level extraction failure (distinct from "no class found").
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("analysis engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("analysis engine failed to parse the source")]
    ParseFailed,
}

/// The signature extraction capability.
pub trait SignatureExtractor: Send + Sync {
    /// Engine kind.
    fn kind(&self) -> ExtractorKind;

    /// Every class/struct *definition* in `source`, nested classes excluded.
    fn extract_classes(&self, source: &str) -> Result<Vec<ClassDecl>, ExtractError>;
}

/// Analyzer errors.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzeError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no class declaration found in {path}")]
    Parse { path: PathBuf },
}

/// Pick the extractor once at startup.
///
/// Uses the AST engine when requested and available, otherwise the pattern
/// fallback.
pub fn select_extractor(prefer_ast: bool) -> Box<dyn SignatureExtractor> {
    if prefer_ast {
        if let Some(extractor) = ast_extractor() {
            return extractor;
        }
    }
    Box::new(PatternExtractor::new())
}

#[cfg(feature = "ast")]
fn ast_extractor() -> Option<Box<dyn SignatureExtractor>> {
    match AstExtractor::new() {
        Ok(extractor) => Some(Box::new(extractor)),
        Err(e) => {
            warn!(error = %e, "AST engine unavailable, using pattern fallback");
            None
        }
    }
}

#[cfg(not(feature = "ast"))]
fn ast_extractor() -> Option<Box<dyn SignatureExtractor>> {
    warn!("built without the `ast` feature, using pattern fallback");
    None
}

/// Parses a header into a [`SourceUnit`] for its primary class.
pub struct SourceAnalyzer {
    extractor: Box<dyn SignatureExtractor>,
    fallback: PatternExtractor,
}

impl SourceAnalyzer {
    /// Create an analyzer, selecting the engine now.
    pub fn new(prefer_ast: bool) -> Self {
        Self::with_extractor(select_extractor(prefer_ast))
    }

    /// Create an analyzer over a specific extractor.
    pub fn with_extractor(extractor: Box<dyn SignatureExtractor>) -> Self {
        Self {
            extractor,
            fallback: PatternExtractor::new(),
        }
    }

    /// Engine selected at startup.
    pub fn kind(&self) -> ExtractorKind {
        self.extractor.kind()
    }

    /// Analyze a header and its optional implementation file.
    pub fn analyze(
        &self,
        header: &Path,
        implementation: Option<&Path>,
    ) -> Result<SourceUnit, AnalyzeError> {
        let header_text = read(header)?;
        let implementation = match implementation {
            Some(path) => Some((path.to_path_buf(), read(path)?)),
            None => None,
        };
        self.analyze_source(header, header_text, implementation)
    }

    /// Analyze header text already in memory.
    pub fn analyze_source(
        &self,
        header: &Path,
        header_text: String,
        implementation: Option<(PathBuf, String)>,
    ) -> Result<SourceUnit, AnalyzeError> {
        let (classes, degraded) = match self.extractor.extract_classes(&header_text) {
            Ok(classes) if !classes.is_empty() => (classes, self.extractor.kind().is_degraded()),
            outcome => {
                if let Err(ref e) = outcome {
                    warn!(path = %header.display(), error = %e, "primary extraction failed");
                }
                if self.extractor.kind() == ExtractorKind::Pattern {
                    (outcome.unwrap_or_default(), true)
                } else {
                    debug!(path = %header.display(), "no class via AST, retrying with pattern fallback");
                    (self.fallback.extract_classes(&header_text).unwrap_or_default(), true)
                }
            }
        };

        let class = pick_primary(header, classes).ok_or_else(|| AnalyzeError::Parse {
            path: header.to_path_buf(),
        })?;

        debug!(
            class = %class.name,
            methods = class.signatures.len(),
            degraded,
            "analyzed header"
        );

        let (implementation_path, implementation_text) = match implementation {
            Some((path, text)) => (Some(path), Some(text)),
            None => (None, None),
        };

        Ok(SourceUnit {
            header_path: header.to_path_buf(),
            implementation_path,
            class_name: class.name,
            namespace: class.namespace,
            signatures: class.signatures,
            collaborators: class.collaborators,
            degraded,
            header_text,
            implementation_text,
        })
    }
}

/// The class named like the file stem, else the first class.
fn pick_primary(header: &Path, classes: Vec<ClassDecl>) -> Option<ClassDecl> {
    let stem = header
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let index = classes
        .iter()
        .position(|c| c.name.to_lowercase() == stem)
        .unwrap_or(0);
    classes.into_iter().nth(index)
}

fn read(path: &Path) -> Result<String, AnalyzeError> {
    fs::read_to_string(path).map_err(|source| AnalyzeError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tc_core::Access;

    use super::*;

    const STRING_UTILS: &str = "class StringUtils { std::string trim(const std::string&); };";

    fn analyzers() -> Vec<SourceAnalyzer> {
        vec![SourceAnalyzer::new(true), SourceAnalyzer::new(false)]
    }

    #[test]
    fn test_string_utils_single_public_method() {
        for analyzer in analyzers() {
            let unit = analyzer
                .analyze_source(Path::new("StringUtils.h"), STRING_UTILS.to_string(), None)
                .unwrap();

            assert_eq!(unit.class_name, "StringUtils");
            assert_eq!(unit.signatures.len(), 1, "engine {:?}", analyzer.kind());
            let trim = &unit.signatures[0];
            assert_eq!(trim.name, "trim");
            assert_eq!(trim.parameters.len(), 1);
            assert_eq!(trim.parameters[0].ty, "const std::string&");
            assert_eq!(trim.return_type, "std::string");
            assert_eq!(trim.access, Access::Public);
            assert!(unit.collaborators.is_empty());
        }
    }

    #[test]
    fn test_pattern_results_are_degraded() {
        let unit = SourceAnalyzer::new(false)
            .analyze_source(Path::new("StringUtils.h"), STRING_UTILS.to_string(), None)
            .unwrap();
        assert!(unit.degraded);
    }

    #[cfg(feature = "ast")]
    #[test]
    fn test_ast_results_are_not_degraded() {
        let analyzer = SourceAnalyzer::new(true);
        assert_eq!(analyzer.kind(), ExtractorKind::Ast);
        let unit = analyzer
            .analyze_source(Path::new("StringUtils.h"), STRING_UTILS.to_string(), None)
            .unwrap();
        assert!(!unit.degraded);
    }

    #[test]
    fn test_no_class_is_parse_error() {
        for analyzer in analyzers() {
            let err = analyzer
                .analyze_source(
                    Path::new("free.h"),
                    "int add(int a, int b);\nclass Forward;\n".to_string(),
                    None,
                )
                .unwrap_err();
            assert!(matches!(err, AnalyzeError::Parse { .. }));
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = SourceAnalyzer::new(true)
            .analyze(Path::new("/definitely/not/here/Foo.h"), None)
            .unwrap_err();
        assert!(matches!(err, AnalyzeError::Io { .. }));
    }

    #[test]
    fn test_primary_class_matches_file_stem() {
        let source = r#"
struct Options { int retries; };

class OrderService {
public:
    explicit OrderService(Database& db);
    bool place(const Order& order);
};
"#;
        for analyzer in analyzers() {
            let unit = analyzer
                .analyze_source(Path::new("src/OrderService.hpp"), source.to_string(), None)
                .unwrap();
            assert_eq!(unit.class_name, "OrderService");
            assert_eq!(unit.signatures.len(), 1);
            assert_eq!(unit.signatures[0].name, "place");
            assert!(unit.collaborators.contains(&"Database&".to_string()));
        }
    }

    #[test]
    fn test_analyze_reads_implementation() {
        let dir = tempfile::tempdir().unwrap();
        let header = dir.path().join("Counter.h");
        let implementation = dir.path().join("Counter.cpp");
        fs::File::create(&header)
            .unwrap()
            .write_all(b"class Counter {\npublic:\n    int next();\n};\n")
            .unwrap();
        fs::write(&implementation, "int Counter::next() { return ++n_; }\n").unwrap();

        let unit = SourceAnalyzer::new(true)
            .analyze(&header, Some(&implementation))
            .unwrap();
        assert_eq!(unit.implementation_path.as_deref(), Some(implementation.as_path()));
        assert!(unit
            .implementation_text
            .as_deref()
            .unwrap()
            .contains("Counter::next"));
    }
}
