//! Generation context: the single payload serialized into a prompt.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::mock::MockBinding;
use crate::signature::MethodSignature;
use crate::unit::SourceUnit;

/// Per-call style directive passed through to the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StyleDirective {
    /// One test case per public method
    OneTestPerMethod,
    /// Table-driven cases (a vector of inputs/expectations looped over)
    TableStyleCases,
    /// Arrange / Act / Assert sections
    ArrangeActAssert,
    /// Free-form directive
    Custom(String),
}

impl StyleDirective {
    /// Parse a CLI/config spelling.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "one-test-per-method" | "per-method" => StyleDirective::OneTestPerMethod,
            "table" | "table-style" | "table-style-cases" => StyleDirective::TableStyleCases,
            "aaa" | "arrange-act-assert" => StyleDirective::ArrangeActAssert,
            _ => StyleDirective::Custom(s.trim().to_string()),
        }
    }

    /// Instruction text for the prompt.
    pub fn instruction(&self) -> String {
        match self {
            StyleDirective::OneTestPerMethod => {
                "Write one test case per public method.".to_string()
            }
            StyleDirective::TableStyleCases => {
                "Use table-style cases: a local array of {input, expected} rows iterated in a loop."
                    .to_string()
            }
            StyleDirective::ArrangeActAssert => {
                "Structure each case with // Arrange, // Act and // Assert sections.".to_string()
            }
            StyleDirective::Custom(text) => text.clone(),
        }
    }
}

impl fmt::Display for StyleDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.instruction())
    }
}

/// Free-form generation options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Target model identifier
    pub model: String,
    /// Provenance tag echoed into generated code; defaults to the model
    pub verifier_tag: Option<String>,
    /// Style directives
    pub style: Vec<StyleDirective>,
    /// Include protected methods in the surface
    pub include_protected: bool,
    /// Include private methods in the surface
    pub include_private: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "deepseek-r1:7b".to_string(),
            verifier_tag: None,
            style: vec![StyleDirective::ArrangeActAssert],
            include_protected: false,
            include_private: false,
        }
    }
}

impl GenerationOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Provenance tag: the explicit verifier tag, else the model name.
    pub fn provenance_tag(&self) -> &str {
        self.verifier_tag.as_deref().unwrap_or(&self.model)
    }

    /// Provenance comment line, e.g. `// Verifier: deepseek-r1:7b`.
    pub fn provenance_comment(&self) -> String {
        format!("// Verifier: {}", self.provenance_tag())
    }
}

/// A signature set joined with the mocks it can use.
///
/// Every signature belongs to `unit`. Every binding existed in the mock
/// catalog when the context was built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationContext {
    /// The unit under test
    pub unit: SourceUnit,
    /// Methods selected for generation
    pub methods: Vec<MethodSignature>,
    /// Mocks for the unit's dependency types
    pub mocks: Vec<MockBinding>,
    /// Dependency types with no mock
    pub unmocked: Vec<String>,
    /// Generation options
    pub options: GenerationOptions,
}

impl GenerationContext {
    /// Whether any mock is bound.
    pub fn has_mocks(&self) -> bool {
        !self.mocks.is_empty()
    }

    /// Name of the generated test fixture, e.g. `StringUtilsTest`.
    pub fn fixture_name(&self) -> String {
        format!("{}Test", self.unit.class_name)
    }
}
