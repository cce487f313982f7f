//! Assembled test files.

use serde::{Deserialize, Serialize};

/// Testing framework headers every generated file includes.
pub const FRAMEWORK_INCLUDES: [&str; 2] = ["#include <gtest/gtest.h>", "#include <gmock/gmock.h>"];

/// One generated test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Test name (a C++ identifier)
    pub name: String,
    /// Body text, placed inside `TEST_F(...) { ... }` unaltered
    pub body: String,
}

/// How the cases were delivered by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseLayout {
    /// Bare bodies wrapped by the assembler in `TEST_F` blocks
    Bodies,
    /// Complete `TEST`/`TEST_F` definitions emitted as-is
    Definitions,
}

/// The assembled output for one source unit. Written once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestFile {
    /// Fixture / file stem, e.g. `StringUtilsTest`
    pub name: String,
    /// Qualified name of the class under test
    pub class_under_test: String,
    /// Include directives, in output order
    pub includes: Vec<String>,
    /// Namespaces brought into scope with `using namespace`
    pub using_namespaces: Vec<String>,
    /// Provenance comment line
    pub provenance: String,
    /// Case layout
    pub layout: CaseLayout,
    /// Test cases (for `Definitions`, a single case holding the definitions)
    pub cases: Vec<TestCase>,
}

impl TestFile {
    /// Output file name, e.g. `StringUtilsTest.cpp`.
    pub fn file_name(&self) -> String {
        format!("{}.cpp", self.name)
    }

    /// Render the complete C++ source.
    pub fn render(&self) -> String {
        debug_assert!(!self.cases.is_empty(), "A test file needs at least one case");

        let mut out = String::new();
        out.push_str(&format!("// Generated test file for {}\n", self.class_under_test));
        for include in &self.includes {
            out.push_str(include);
            out.push('\n');
        }
        out.push('\n');
        out.push_str("using namespace ::testing;\n");
        for ns in &self.using_namespaces {
            out.push_str(&format!("using namespace {};\n", ns));
        }
        out.push('\n');

        if !self.defines_fixture() {
            out.push_str(&format!(
                "class {name} : public ::testing::Test {{\nprotected:\n    void SetUp() override {{}}\n    void TearDown() override {{}}\n}};\n",
                name = self.name
            ));
        }

        match self.layout {
            CaseLayout::Bodies => {
                for case in &self.cases {
                    out.push_str(&format!(
                        "\nTEST_F({}, {}) {{\n    {}\n{}\n}}\n",
                        self.name,
                        case.name,
                        self.provenance,
                        case.body.trim_end_matches(['\n', '\r'])
                    ));
                }
            }
            CaseLayout::Definitions => {
                for case in &self.cases {
                    out.push('\n');
                    out.push_str(case.body.trim_end());
                    out.push('\n');
                }
            }
        }

        out
    }

    /// Whether delivered definitions already declare the fixture class.
    fn defines_fixture(&self) -> bool {
        let declaration = format!("class {} ", self.name);
        self.layout == CaseLayout::Definitions
            && self.cases.iter().any(|c| c.body.contains(&declaration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(body: &str) -> TestFile {
        TestFile {
            name: "StringUtilsTest".to_string(),
            class_under_test: "StringUtils".to_string(),
            includes: FRAMEWORK_INCLUDES
                .iter()
                .map(|s| s.to_string())
                .chain(std::iter::once("#include \"StringUtils.h\"".to_string()))
                .collect(),
            using_namespaces: Vec::new(),
            provenance: "// Verifier: llama3".to_string(),
            layout: CaseLayout::Bodies,
            cases: vec![TestCase {
                name: "Generated".to_string(),
                body: body.to_string(),
            }],
        }
    }

    #[test]
    fn test_render_places_provenance_first_in_body() {
        let rendered = file("    StringUtils u;\n    EXPECT_EQ(u.trim(\" a \"), \"a\");\n").render();

        let body_start = rendered
            .find("TEST_F(StringUtilsTest, Generated) {\n")
            .expect("test block");
        let after = &rendered[body_start..];
        let first_body_line = after.lines().nth(1).unwrap();
        assert_eq!(first_body_line.trim(), "// Verifier: llama3");
        assert!(rendered.contains("    StringUtils u;\n    EXPECT_EQ(u.trim(\" a \"), \"a\");\n}"));
    }

    #[test]
    fn test_render_includes_and_fixture() {
        let rendered = file("EXPECT_TRUE(true);").render();
        assert!(rendered.starts_with("// Generated test file for StringUtils\n#include <gtest/gtest.h>"));
        assert!(rendered.contains("#include \"StringUtils.h\""));
        assert!(rendered.contains("class StringUtilsTest : public ::testing::Test {"));
        assert_eq!(file("x").file_name(), "StringUtilsTest.cpp");
    }

    #[test]
    fn test_definitions_with_own_fixture() {
        let mut own = file(
            "class StringUtilsTest : public ::testing::Test {};\n\nTEST_F(StringUtilsTest, Trims) {\n    EXPECT_TRUE(true);\n}",
        );
        own.layout = CaseLayout::Definitions;
        let rendered = own.render();
        assert_eq!(rendered.matches("class StringUtilsTest ").count(), 1);
        assert!(!rendered.contains("SetUp()"));
    }
}
