//! Response assembly: model output to test file.
//!
//! ```text
//! raw output ──> strip <think> ──> fenced blocks ──> C++ blocks (one must assert)
//!                                                          │
//!                               ┌──────────────────────────┴────────────┐
//!                     TEST/TEST_F present                         bare bodies
//!                               │                                       │
//!                  Definitions (includes merged,          Bodies (split on `// CASE:`,
//!                   provenance per test)                   wrapped in TEST_F)
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use tc_core::{CaseLayout, FailureReason, GenerationContext, TestCase, TestFile, FRAMEWORK_INCLUDES};

use crate::prompt::CASE_MARKER;

/// Name of the single case when the model gave no markers.
pub const DEFAULT_CASE_NAME: &str = "Generated";

static THINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").unwrap());

static ASSERTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:EXPECT|ASSERT)_[A-Z_]+\s*\(").unwrap());

static TEST_DEFINITION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*TEST(?:_F|_P)?\s*\(").unwrap());

static INCLUDE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^\s*#\s*include\s*[<"]"#).unwrap());

/// Fence languages that carry C++ code.
const CODE_LANGUAGES: &[&str] = &["", "cpp", "c++", "cc", "cxx", "c", "h", "hpp", "cplusplus"];

/// Assembly errors, terminal for the unit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssemblyError {
    #[error("no fenced code block found in model output")]
    NoCodeBlockFound,

    #[error("code block contains no recognizable test assertion")]
    UnrecognizedTestBody,
}

impl AssemblyError {
    pub fn reason(&self) -> FailureReason {
        match self {
            AssemblyError::NoCodeBlockFound => FailureReason::NoCodeBlockFound,
            AssemblyError::UnrecognizedTestBody => FailureReason::UnrecognizedTestBody,
        }
    }
}

/// Remove `<think>...</think>` sections. An unmatched closing tag drops
/// everything before it; an unmatched opening tag drops everything after it.
pub fn strip_reasoning(raw: &str) -> String {
    let stripped = THINK_RE.replace_all(raw, "");
    let tail = match stripped.rfind("</think>") {
        Some(end) => &stripped[end + "</think>".len()..],
        None => &stripped[..],
    };
    match tail.find("<think>") {
        Some(start) => tail[..start].to_string(),
        None => tail.to_string(),
    }
}

/// Code blocks in fence order, prose-only fences ignored.
///
/// Unterminated fences are not blocks.
pub fn extract_code_blocks(raw: &str) -> Vec<String> {
    let text = strip_reasoning(raw);
    let mut blocks = Vec::new();
    let mut open: Option<(String, Vec<&str>)> = None;

    for line in text.lines() {
        let trimmed = line.trim_start();
        match open.take() {
            None => {
                if let Some(info) = trimmed.strip_prefix("```") {
                    let language = info.split_whitespace().next().unwrap_or("").to_lowercase();
                    open = Some((language, Vec::new()));
                }
            }
            Some((language, body)) if trimmed.starts_with("```") => {
                let body = body.join("\n");
                if is_code_block(&language, &body) {
                    blocks.push(body);
                }
            }
            Some((language, mut body)) => {
                body.push(line);
                open = Some((language, body));
            }
        }
    }

    blocks
}

fn is_code_block(language: &str, body: &str) -> bool {
    if body.trim().is_empty() || !CODE_LANGUAGES.contains(&language) {
        return false;
    }
    // Untagged fences are often prose or console output.
    !language.is_empty() || body.contains(';') || body.contains('{') || ASSERTION_RE.is_match(body)
}

/// Whether `code` contains a test assertion.
pub fn has_assertion(code: &str) -> bool {
    ASSERTION_RE.is_match(code)
}

/// Builds the final test file for one unit.
pub struct ResponseAssembler;

impl ResponseAssembler {
    /// Assemble raw model output into a test file.
    pub fn assemble(raw_output: &str, context: &GenerationContext) -> Result<TestFile, AssemblyError> {
        let blocks = extract_code_blocks(raw_output);
        if blocks.is_empty() {
            return Err(AssemblyError::NoCodeBlockFound);
        }

        // Fixtures and helpers come in blocks of their own.
        if !blocks.iter().any(|b| has_assertion(b)) {
            return Err(AssemblyError::UnrecognizedTestBody);
        }
        let code = blocks.join("\n\n");

        let provenance = context.options.provenance_comment();
        let (model_includes, code) = split_includes(&code);

        let (layout, cases) = if TEST_DEFINITION_RE.is_match(&code) {
            let body = inject_provenance(&code, &provenance);
            (
                CaseLayout::Definitions,
                vec![TestCase {
                    name: DEFAULT_CASE_NAME.to_string(),
                    body,
                }],
            )
        } else {
            (CaseLayout::Bodies, split_cases(&code))
        };

        let unit = &context.unit;
        let mut includes: Vec<String> = FRAMEWORK_INCLUDES.iter().map(|s| s.to_string()).collect();
        includes.push(format!("#include \"{}\"", unit.header_file_name()));
        includes.extend(context.mocks.iter().map(|m| m.include_directive()));
        includes.extend(model_includes);
        let mut seen = std::collections::HashSet::new();
        includes.retain(|i| seen.insert(normalize_include(i)));

        let using_namespaces = if unit.namespace.is_empty() {
            Vec::new()
        } else {
            vec![unit.namespace.join("::")]
        };

        Ok(TestFile {
            name: context.fixture_name(),
            class_under_test: unit.qualified_name(),
            includes,
            using_namespaces,
            provenance,
            layout,
            cases,
        })
    }
}

/// Pull `#include` lines out of the code.
fn split_includes(code: &str) -> (Vec<String>, String) {
    let mut includes = Vec::new();
    let mut rest = Vec::new();
    for line in code.lines() {
        if INCLUDE_RE.is_match(line) {
            includes.push(line.trim().to_string());
        } else {
            rest.push(line);
        }
    }
    (includes, rest.join("\n"))
}

fn normalize_include(line: &str) -> String {
    line.split_whitespace().collect::<String>()
}

fn is_provenance_line(line: &str) -> bool {
    line.trim_start().starts_with("// Verifier:")
}

/// Put the provenance comment first in every test body, replacing any the
/// model wrote itself.
///
/// The comment goes right after the first `{` following each `TEST` header;
/// code sharing that line moves to the next one.
fn inject_provenance(code: &str, provenance: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut awaiting_brace = false;
    let mut skip_model_provenance = false;

    for line in code.lines() {
        if skip_model_provenance {
            skip_model_provenance = false;
            if is_provenance_line(line) {
                continue;
            }
        }

        let mut search_from = 0;
        if let Some(header) = TEST_DEFINITION_RE.find(line) {
            awaiting_brace = true;
            search_from = header.end();
        }
        let brace = if awaiting_brace {
            line[search_from..].find('{').map(|i| search_from + i)
        } else {
            None
        };
        let Some(brace) = brace else {
            out.push(line.to_string());
            continue;
        };

        awaiting_brace = false;
        let (head, rest) = line.split_at(brace + 1);
        out.push(head.to_string());
        out.push(format!("    {}", provenance));
        let rest = rest.trim();
        if rest.is_empty() {
            skip_model_provenance = true;
        } else if !is_provenance_line(rest) {
            out.push(format!("    {}", rest));
        }
    }

    out.join("\n")
}

/// Split bare bodies on `// CASE:` markers.
fn split_cases(code: &str) -> Vec<TestCase> {
    let mut cases: Vec<TestCase> = Vec::new();
    let mut name: Option<String> = None;
    let mut lines: Vec<&str> = Vec::new();

    for line in code.lines() {
        if let Some(marker) = line.trim_start().strip_prefix(CASE_MARKER) {
            push_case(&mut cases, name.take(), &lines);
            lines.clear();
            name = Some(marker.trim().to_string());
        } else {
            lines.push(line);
        }
    }
    push_case(&mut cases, name, &lines);

    if cases.is_empty() {
        cases.push(TestCase {
            name: DEFAULT_CASE_NAME.to_string(),
            body: code.trim_matches('\n').to_string(),
        });
    }
    cases
}

fn push_case(cases: &mut Vec<TestCase>, name: Option<String>, lines: &[&str]) {
    let mut lines = lines;
    if let Some(first) = lines.iter().position(|l| !l.trim().is_empty()) {
        lines = &lines[first..];
        if is_provenance_line(lines[0]) {
            lines = &lines[1..];
        }
    }
    let body = lines.join("\n").trim_matches('\n').to_string();
    if body.trim().is_empty() || (name.is_none() && !has_code(&body)) {
        return;
    }

    let base = name
        .as_deref()
        .map(case_identifier)
        .unwrap_or_else(|| DEFAULT_CASE_NAME.to_string());
    let mut unique = base.clone();
    let mut n = 2;
    while cases.iter().any(|c| c.name == unique) {
        unique = format!("{base}_{n}");
        n += 1;
    }
    cases.push(TestCase { name: unique, body });
}

/// Whether a preamble holds anything besides comments.
fn has_code(body: &str) -> bool {
    body.lines().any(|l| {
        let l = l.trim();
        !l.is_empty() && !l.starts_with("//")
    })
}

/// Turn a free-form case name into a C++ identifier.
fn case_identifier(raw: &str) -> String {
    let mut out = String::new();
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        } else if !out.ends_with('_') && !out.is_empty() {
            out.push('_');
        }
    }
    let out = out.trim_end_matches('_').to_string();
    match out.chars().next() {
        None => "Case".to_string(),
        Some(c) if c.is_ascii_digit() => format!("Case_{out}"),
        Some(_) => out,
    }
}
