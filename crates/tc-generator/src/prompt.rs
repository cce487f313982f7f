//! Prompt construction from a generation context.
//!
//! Each prompt is self-contained: the method surface, the source text, the
//! mocks and the output contract. Nothing from a previous unit is carried.

use tc_core::{GenerationContext, MockBinding};

/// Marker the model is asked to put before each test case.
pub const CASE_MARKER: &str = "// CASE:";

/// Prompt builder for one unit.
pub struct PromptBuilder;

impl PromptBuilder {
    /// Build the generation prompt.
    pub fn build_generation_prompt(context: &GenerationContext) -> String {
        let unit = &context.unit;
        let mut sections = vec![format!(
            r#"Generate Google Test unit tests for the C++ class `{name}`.

## METHODS UNDER TEST

```cpp
{listing}
```{degraded}"#,
            name = unit.qualified_name(),
            listing = Self::format_listing(context),
            degraded = if unit.degraded {
                "\n\nNOTE: this listing was extracted heuristically. Qualifiers and nested \
                 template types may be inaccurate; trust the header source below."
            } else {
                ""
            },
        )];

        sections.push(format!(
            "## HEADER ({})\n\n```cpp\n{}\n```",
            unit.header_file_name(),
            unit.header_text.trim_end()
        ));

        if let (Some(path), Some(text)) = (&unit.implementation_path, &unit.implementation_text) {
            let file = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            sections.push(format!(
                "## IMPLEMENTATION ({})\n\n```cpp\n{}\n```",
                file,
                text.trim_end()
            ));
        }

        sections.push(Self::format_mocks(context));

        if !context.unmocked.is_empty() {
            sections.push(format!(
                "## UNMOCKED DEPENDENCIES\n\nNo mock exists for: {}.\n\
                 Construct the real type directly, or define a minimal stub inline in the test body.",
                context.unmocked.join(", ")
            ));
        }

        if !context.options.style.is_empty() {
            let rules: Vec<String> = context
                .options
                .style
                .iter()
                .map(|s| format!("- {}", s.instruction()))
                .collect();
            sections.push(format!("## STYLE\n\n{}", rules.join("\n")));
        }

        sections.push(format!(
            r#"## OUTPUT FORMAT

1. Reply with exactly ONE ```cpp fenced code block.
2. The block contains ONLY test bodies: no #include lines, no fixture class, no TEST/TEST_F wrappers.
3. Start each test case with a line `{marker} <Name>`, where <Name> is a C++ identifier.
4. The first line of each case after the marker must be exactly: {provenance}
5. Every case needs at least one EXPECT_* or ASSERT_* assertion.
6. Cover normal behaviour and edge cases."#,
            marker = CASE_MARKER,
            provenance = context.options.provenance_comment(),
        ));

        sections.join("\n\n")
    }

    /// The selected methods as a class declaration.
    pub fn format_listing(context: &GenerationContext) -> String {
        let unit = &context.unit;
        let mut out = format!("class {} {{\n", unit.class_name);
        let mut current = None;
        for method in &context.methods {
            if current != Some(method.access) {
                out.push_str(&format!("{}:\n", method.access));
                current = Some(method.access);
            }
            out.push_str("    ");
            out.push_str(&method.render_declaration());
            out.push('\n');
        }
        out.push_str("};");
        out
    }

    fn format_mocks(context: &GenerationContext) -> String {
        if !context.has_mocks() {
            return "## AVAILABLE MOCKS\n\nNone.".to_string();
        }
        let lines: Vec<String> = context.mocks.iter().map(Self::format_mock).collect();
        format!(
            "## AVAILABLE MOCKS\n\nUse these instead of the real dependencies:\n\n{}",
            lines.join("\n")
        )
    }

    fn format_mock(mock: &MockBinding) -> String {
        let methods = if mock.methods.is_empty() {
            "none declared".to_string()
        } else {
            mock.methods.join(", ")
        };
        format!(
            "- `{}` mocks `{}` ({}); construct with `{}`; mocked methods: {}",
            mock.mock_class,
            mock.mocked_class,
            mock.include_directive(),
            mock.constructor,
            methods
        )
    }
}
