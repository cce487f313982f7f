//! Lightweight scan of one mock header.

use once_cell::sync::Lazy;
use regex::Regex;

static LINE_COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"//[^\n]*").unwrap());
static BLOCK_COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());

static CLASS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:class|struct)\s+([A-Za-z_]\w*)\s*(?:final\s*)?(?::\s*([^{;]*))?\{").unwrap()
});

/// `MOCK_METHOD(Return, Name, (args), (specs))`; the return type may be parenthesized.
static MOCK_METHOD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bMOCK_METHOD\s*\(\s*(?:\([^)]*\)|[^,()]+)\s*,\s*([A-Za-z_]\w*)\s*,").unwrap()
});

/// `MOCK_METHODn(Name, Sig)` / `MOCK_CONST_METHODn_T(Name, Sig)`.
static LEGACY_MOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bMOCK_(?:CONST_)?METHOD\d+(?:_T)?(?:_WITH_CALLTYPE)?\s*\(\s*(?:[A-Za-z_]\w*\s*,\s*)??([A-Za-z_]\w*)\s*,")
        .unwrap()
});

static OVERRIDE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z_]\w*)\s*\([^;{)]*\)\s*(?:const\s*)?(?:noexcept\s*)?override\b").unwrap()
});

const AFFIXES: &[&str] = &["Mock", "Fake"];

/// What a mock header declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedMock {
    /// The mock's own class name
    pub mock_class: String,
    /// Class name with the Mock/Fake affix stripped
    pub mocked_class: String,
    /// Unqualified base classes, in declaration order
    pub bases: Vec<String>,
    /// Mocked method names, in file order, deduplicated
    pub methods: Vec<String>,
    /// Constructor declaration, e.g. `MockDatabase(int retries)`
    pub constructor: String,
}

/// Scan mock header text. `None` when the file declares no class.
pub fn scan_mock(text: &str, file_stem: &str) -> Option<ScannedMock> {
    let text = BLOCK_COMMENT_RE.replace_all(text, " ");
    let text = LINE_COMMENT_RE.replace_all(&text, "");

    let classes: Vec<(String, Vec<String>, usize)> = CLASS_RE
        .captures_iter(&text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let bases = caps.get(2).map(|b| parse_bases(b.as_str())).unwrap_or_default();
            Some((caps[1].to_string(), bases, whole.end()))
        })
        .collect();

    let (mock_class, bases, body_start) = classes
        .iter()
        .find(|(name, _, _)| has_affix(name))
        .or_else(|| classes.first())
        .cloned()?;

    let mocked_class = strip_affix(&mock_class)
        .or_else(|| bases.first().cloned())
        .or_else(|| strip_affix(file_stem))
        .unwrap_or_else(|| mock_class.clone());

    let methods = mocked_methods(&text, &mock_class);
    let constructor = find_constructor(&text[body_start..], &mock_class)
        .unwrap_or_else(|| format!("{mock_class}()"));

    Some(ScannedMock {
        mock_class,
        mocked_class,
        bases,
        methods,
        constructor,
    })
}

fn mocked_methods(text: &str, mock_class: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = MOCK_METHOD_RE
        .captures_iter(text)
        .chain(LEGACY_MOCK_RE.captures_iter(text))
        .filter_map(|caps| caps.get(1).map(|m| (m.start(), m.as_str().to_string())))
        .collect();

    // Hand-written fakes have no mock macros.
    if found.is_empty() {
        found = OVERRIDE_RE
            .captures_iter(text)
            .filter_map(|caps| caps.get(1).map(|m| (m.start(), m.as_str().to_string())))
            .collect();
    }
    found.sort_by_key(|(at, _)| *at);

    let mut methods: Vec<String> = Vec::with_capacity(found.len());
    for (_, name) in found {
        if name != mock_class && !methods.contains(&name) {
            methods.push(name);
        }
    }
    methods
}

fn find_constructor(body: &str, mock_class: &str) -> Option<String> {
    let pattern = format!(r"(^|[^~\w]){}\s*\(([^)]*)\)", regex::escape(mock_class));
    let re = Regex::new(&pattern).ok()?;
    let caps = re.captures(body)?;
    let params = caps[2].split_whitespace().collect::<Vec<_>>().join(" ");
    Some(format!("{mock_class}({params})"))
}

fn parse_bases(clause: &str) -> Vec<String> {
    clause
        .split(',')
        .filter_map(|base| {
            let base = base
                .split_whitespace()
                .filter(|w| !matches!(*w, "public" | "protected" | "private" | "virtual"))
                .collect::<Vec<_>>()
                .join(" ");
            let base = base.split('<').next().unwrap_or("").trim();
            let base = base.rsplit("::").next().unwrap_or(base).trim();
            (!base.is_empty()).then(|| base.to_string())
        })
        .collect()
}

fn has_affix(name: &str) -> bool {
    AFFIXES.iter().any(|a| name.contains(a))
}

/// `MockDatabase` / `DatabaseMock` / `FakeClock` to the mocked name.
fn strip_affix(name: &str) -> Option<String> {
    for affix in AFFIXES {
        if let Some(rest) = name.strip_prefix(affix) {
            if !rest.is_empty() {
                return Some(rest.to_string());
            }
        }
        if let Some(rest) = name.strip_suffix(affix) {
            if !rest.is_empty() {
                return Some(rest.to_string());
            }
        }
    }
    None
}
