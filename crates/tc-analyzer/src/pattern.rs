//! Text-pattern fallback extraction.
//!
//! Works on comment- and preprocessor-stripped header text. It understands
//! class bodies, access labels, inline bodies and namespaces well enough for
//! ordinary headers, but macros and unusual declarator syntax can confuse it,
//! so every result it produces is marked degraded.

use once_cell::sync::Lazy;
use regex::Regex;
use tc_core::types::normalize_type;
use tc_core::{Access, MethodSignature, Parameter, Qualifiers};

use crate::{ClassDecl, ExtractError, ExtractorKind, SignatureExtractor};

static CLASS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(class|struct)\s+(?:[A-Z][A-Z0-9_]*\s+)?([A-Za-z_]\w*)\s*(?:final\s*)?(?::\s*([^{;()]*))?\{",
    )
    .unwrap()
});

static NAMESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bnamespace\s*([A-Za-z_][\w:]*)?\s*\{").unwrap());

static ACCESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(public|protected|private)(?:\s+(?:slots|Q_SLOTS))?\s*:").unwrap()
});

static ATTRIBUTE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\[.*?\]\]").unwrap());

/// Statements that never declare a method or data member.
const SKIPPED_LEADS: &[&str] = &[
    "class",
    "struct",
    "enum",
    "union",
    "using",
    "typedef",
    "friend",
    "static_assert",
    "namespace",
];

/// Specifiers dropped from a method's return type.
const METHOD_SPECIFIERS: &[&str] = &[
    "virtual", "static", "inline", "explicit", "constexpr", "consteval", "extern",
];

/// Words that cannot form a type on their own.
const QUALIFIER_WORDS: &[&str] = &["const", "volatile", "struct", "class", "typename", "enum"];

/// Words that end a type rather than name a parameter.
const TYPE_WORDS: &[&str] = &[
    "const", "volatile", "struct", "class", "typename", "unsigned", "signed", "long", "short",
    "int", "char", "bool", "float", "double", "void", "auto", "wchar_t", "size_t",
];

/// Regex fallback extractor.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternExtractor;

impl PatternExtractor {
    pub const fn new() -> Self {
        Self
    }
}

impl SignatureExtractor for PatternExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Pattern
    }

    fn extract_classes(&self, source: &str) -> Result<Vec<ClassDecl>, ExtractError> {
        let text = strip_comments_and_directives(source);
        let namespaces = namespace_spans(&text);

        let mut classes = Vec::new();
        let mut consumed_until = 0;
        for caps in CLASS_RE.captures_iter(&text) {
            let Some(whole) = caps.get(0) else { continue };
            if whole.start() < consumed_until {
                continue;
            }
            if text[..whole.start()].trim_end().ends_with("enum") {
                continue;
            }

            let open = whole.end() - 1;
            let close = match_close(&text, open, '{', '}').unwrap_or(text.len());
            consumed_until = close;

            let namespace = namespaces
                .iter()
                .filter(|span| span.start <= whole.start() && whole.start() < span.end)
                .flat_map(|span| span.segments.iter().cloned())
                .collect();

            let is_struct = &caps[1] == "struct";
            let mut class = ClassDecl::new(&caps[2], namespace, is_struct);
            parse_body(&text[open + 1..close], &mut class);
            classes.push(class);
        }
        Ok(classes)
    }
}

struct NamespaceSpan {
    segments: Vec<String>,
    start: usize,
    end: usize,
}

fn namespace_spans(text: &str) -> Vec<NamespaceSpan> {
    NAMESPACE_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let open = whole.end() - 1;
            let end = match_close(text, open, '{', '}').unwrap_or(text.len());
            let segments = caps
                .get(1)
                .map(|name| {
                    name.as_str()
                        .split("::")
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            Some(NamespaceSpan {
                segments,
                start: whole.start(),
                end,
            })
        })
        .collect()
}

fn parse_body(body: &str, class: &mut ClassDecl) {
    let flattened = flatten_blocks(body);
    let statements: Vec<(Vec<Access>, &str)> = flattened.split(';').map(strip_labels).collect();

    let labelled = statements.iter().any(|(labels, _)| !labels.is_empty());
    let mut access = if labelled && !class.is_struct {
        Access::Private
    } else {
        Access::Public
    };

    for (labels, statement) in statements {
        if let Some(last) = labels.last() {
            access = *last;
        }
        let statement = ATTRIBUTE_RE.replace_all(statement, " ");
        let statement = strip_template_prefix(statement.trim());
        if statement.is_empty() || statement.starts_with([',', ':', '~']) {
            continue;
        }
        if SKIPPED_LEADS.contains(&leading_word(statement)) || statement.contains("= delete") {
            continue;
        }
        match find_top_level(statement, '(') {
            Some(paren) => parse_method(statement, paren, access, class),
            None => parse_member(statement, class),
        }
    }
}

fn parse_method(statement: &str, paren: usize, access: Access, class: &mut ClassDecl) {
    let Some(close) = match_close(statement, paren, '(', ')') else {
        return;
    };
    let head = statement[..paren].trim_end();
    let (prefix, name) = split_trailing_identifier(head);
    if name.is_empty() || name == "operator" || prefix.trim_end().ends_with('~') {
        return;
    }
    let prefix_words: Vec<&str> = prefix.split_whitespace().collect();
    if prefix_words.contains(&"operator") {
        return;
    }

    let parameters: Vec<Parameter> = split_top_level(&statement[paren + 1..close], ',')
        .into_iter()
        .filter_map(parse_parameter)
        .collect();
    let parameters = match parameters.as_slice() {
        [only] if only.ty == "void" && only.name.is_empty() => Vec::new(),
        _ => parameters,
    };

    if name == class.name {
        for parameter in parameters {
            class.push_collaborator(parameter.ty);
        }
        return;
    }

    let is_static = prefix_words.contains(&"static");
    let mut is_virtual = prefix_words.contains(&"virtual");
    let declared: Vec<&str> = prefix_words
        .into_iter()
        .filter(|w| !METHOD_SPECIFIERS.contains(w) && !is_export_macro(w))
        .collect();
    let mut return_type = normalize_type(&declared.join(" "));

    let tail = statement[close + 1..].trim();
    let is_const = leading_word(tail) == "const";
    let tail_words: Vec<&str> = tail.split(|c: char| !is_ident_char(c)).collect();
    is_virtual |= tail_words.contains(&"override") || tail_words.contains(&"final");

    if let Some(arrow) = tail.find("->") {
        let trailing = tail[arrow + 2..].split('=').next().unwrap_or("");
        let trailing: Vec<&str> = trailing
            .split_whitespace()
            .filter(|w| !matches!(*w, "override" | "final" | "noexcept"))
            .collect();
        if !trailing.is_empty() {
            return_type = normalize_type(&trailing.join(" "));
        }
    }

    if return_type.is_empty() {
        return;
    }

    let signature = MethodSignature::new(class.name.clone(), name, parameters, return_type)
        .with_access(access)
        .with_qualifiers(Qualifiers {
            is_const,
            is_static,
            is_virtual,
        });
    class.push_signature(signature);
}

fn parse_parameter(piece: &str) -> Option<Parameter> {
    let declaration = match find_top_level(piece, '=') {
        Some(eq) => &piece[..eq],
        None => piece,
    };
    let declaration = strip_array_suffix(declaration.trim());
    if declaration.is_empty() || declaration == "..." {
        return None;
    }

    let (rest, ident) = split_trailing_identifier(declaration);
    let rest_trim = rest.trim_end();
    let named = !ident.is_empty()
        && !TYPE_WORDS.contains(&ident)
        && !rest_trim.is_empty()
        && !rest_trim.ends_with("::")
        && !rest_trim.split_whitespace().all(|w| QUALIFIER_WORDS.contains(&w))
        && (rest.ends_with(char::is_whitespace)
            || rest_trim.ends_with(['&', '*', '>']));

    Some(if named {
        Parameter::new(ident, normalize_type(rest_trim))
    } else {
        Parameter::new("", normalize_type(declaration))
    })
}

fn parse_member(statement: &str, class: &mut ClassDecl) {
    let declaration = match find_top_level(statement, '=') {
        Some(eq) => &statement[..eq],
        None => statement,
    };
    let declaration = match find_top_level(declaration, ',') {
        Some(comma) => &declaration[..comma],
        None => declaration,
    };
    let words: Vec<&str> = declaration.split_whitespace().collect();
    if words.first().is_some_and(|w| *w == "static") {
        return;
    }

    let declaration = strip_array_suffix(declaration.trim());
    let (rest, ident) = split_trailing_identifier(declaration);
    if ident.is_empty() {
        return;
    }
    let ty: Vec<&str> = rest
        .split_whitespace()
        .filter(|w| !matches!(*w, "mutable" | "inline"))
        .collect();
    if ty.is_empty() {
        return;
    }
    class.push_collaborator(normalize_type(&ty.join(" ")));
}

/// Leading access labels of a statement, and the remainder.
fn strip_labels(mut statement: &str) -> (Vec<Access>, &str) {
    let mut labels = Vec::new();
    while let Some(m) = ACCESS_RE.find(statement) {
        let rest = &statement[m.end()..];
        if rest.starts_with(':') {
            break;
        }
        let keyword = statement[..m.end()].split_whitespace().next().unwrap_or("");
        if let Some(access) = Access::from_keyword(keyword) {
            labels.push(access);
        }
        statement = rest;
    }
    (labels, statement)
}

/// Replace each top-level `{ ... }` block with a statement terminator.
///
/// Braces inside parentheses (`T fallback = T{}`) are kept.
fn flatten_blocks(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut depth = 0usize;
    let mut parens = 0usize;
    for c in body.chars() {
        if depth == 0 {
            match c {
                '(' => parens += 1,
                ')' => parens = parens.saturating_sub(1),
                _ => {}
            }
            if parens > 0 || !matches!(c, '{' | '}') {
                out.push(c);
                continue;
            }
        }
        match c {
            '{' => depth += 1,
            '}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        out.push(';');
                    }
                }
            }
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

fn strip_template_prefix(statement: &str) -> &str {
    let Some(rest) = statement.strip_prefix("template") else {
        return statement;
    };
    let rest = rest.trim_start();
    if !rest.starts_with('<') {
        return statement;
    }
    match match_close(rest, 0, '<', '>') {
        Some(close) => rest[close + 1..].trim_start(),
        None => statement,
    }
}

fn strip_comments_and_directives(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut at_line_start = true;

    while let Some(c) = chars.next() {
        match c {
            '/' if chars.peek() == Some(&'/') => {
                while chars.peek().is_some_and(|n| *n != '\n') {
                    chars.next();
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
                out.push(' ');
            }
            '"' | '\'' => {
                out.push(c);
                let mut escaped = false;
                for n in chars.by_ref() {
                    out.push(n);
                    if escaped {
                        escaped = false;
                    } else if n == '\\' {
                        escaped = true;
                    } else if n == c || n == '\n' {
                        break;
                    }
                }
            }
            '#' if at_line_start => {
                let mut prev = '\0';
                while let Some(&n) = chars.peek() {
                    if n == '\n' && prev != '\\' {
                        break;
                    }
                    prev = n;
                    chars.next();
                }
            }
            _ => out.push(c),
        }
        at_line_start = match c {
            '\n' => true,
            ' ' | '\t' => at_line_start,
            _ => false,
        };
    }
    out
}

/// Index of the delimiter closing the one at `open`.
fn match_close(text: &str, open: usize, open_ch: char, close_ch: char) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text[open..].char_indices() {
        if c == open_ch {
            depth += 1;
        } else if c == close_ch {
            depth = depth.checked_sub(1)?;
            if depth == 0 {
                return Some(open + i);
            }
        }
    }
    None
}

/// First `target` outside any `<>`, `()`, `[]` or `{}` nesting.
fn find_top_level(text: &str, target: char) -> Option<usize> {
    let mut depth = 0i32;
    for (i, c) in text.char_indices() {
        if c == target && depth == 0 {
            return Some(i);
        }
        match c {
            '<' | '(' | '[' | '{' => depth += 1,
            '>' | ')' | ']' | '}' => depth = (depth - 1).max(0),
            _ => {}
        }
    }
    None
}

fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while let Some(at) = find_top_level(rest, separator) {
        pieces.push(&rest[..at]);
        rest = &rest[at + separator.len_utf8()..];
    }
    pieces.push(rest);
    pieces.into_iter().filter(|p| !p.trim().is_empty()).collect()
}

fn split_trailing_identifier(text: &str) -> (&str, &str) {
    let start = text
        .char_indices()
        .rev()
        .take_while(|(_, c)| is_ident_char(*c))
        .last()
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let ident = &text[start..];
    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        return (text, "");
    }
    (&text[..start], ident)
}

fn strip_array_suffix(text: &str) -> &str {
    let mut text = text;
    while text.ends_with(']') {
        match text.rfind('[') {
            Some(open) => text = text[..open].trim_end(),
            None => break,
        }
    }
    text
}

fn leading_word(text: &str) -> &str {
    let end = text
        .char_indices()
        .find(|(_, c)| !is_ident_char(*c))
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    &text[..end]
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// `FOO_API`-style export macros in front of a declaration.
fn is_export_macro(word: &str) -> bool {
    word.len() > 2
        && word.contains('_')
        && word.starts_with(|c: char| c.is_ascii_uppercase())
        && word
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}
