//! C++ type-string helpers shared by the analyzer and the context builder.

/// Builtin and fixed-width types that never need a mock.
const PRIMITIVES: &[&str] = &[
    "void", "bool", "char", "wchar_t", "char8_t", "char16_t", "char32_t", "short", "int", "long",
    "float", "double", "signed", "unsigned", "auto", "size_t", "ssize_t", "ptrdiff_t",
    "intptr_t", "uintptr_t", "int8_t", "int16_t", "int32_t", "int64_t", "uint8_t", "uint16_t",
    "uint32_t", "uint64_t", "nullptr_t", "string", "string_view",
];

/// Wrappers whose first template argument is the real dependency.
const TRANSPARENT_WRAPPERS: &[&str] = &[
    "std::shared_ptr",
    "std::unique_ptr",
    "std::weak_ptr",
    "std::optional",
    "std::reference_wrapper",
    "shared_ptr",
    "unique_ptr",
    "weak_ptr",
];

/// Collapse whitespace and tighten `&` / `*` onto the type.
///
/// `const  std::string &` becomes `const std::string&`.
pub fn normalize_type(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut out = String::with_capacity(collapsed.len());
    for c in collapsed.chars() {
        if (c == '&' || c == '*') && out.ends_with(' ') {
            out.pop();
        }
        if c == '>' && out.ends_with(' ') {
            out.pop();
        }
        out.push(c);
    }
    out.replace("< ", "<").replace(" ,", ",")
}

/// Reduce a parameter/return/member type to the dependency it names.
///
/// Strips cv-qualifiers, references and pointers, unwraps smart pointers and
/// optionals, and returns `None` for primitives, `std::` types and template
/// parameters.
pub fn dependency_type(raw: &str) -> Option<String> {
    let mut ty = strip_decorations(raw);

    loop {
        let Some(open) = ty.find('<') else { break };
        let head = ty[..open].trim();
        if TRANSPARENT_WRAPPERS.contains(&head) {
            let inner = first_template_argument(&ty[open..])?;
            ty = strip_decorations(&inner);
        } else {
            break;
        }
    }

    let ty = ty.trim_start_matches("::").to_string();
    if ty.is_empty() || ty.starts_with("std::") {
        return None;
    }
    // Non-std templates are keyed by their template name.
    let base = match ty.find('<') {
        Some(open) => ty[..open].trim().to_string(),
        None => ty,
    };
    if base.split_whitespace().all(|w| PRIMITIVES.contains(&w)) {
        return None;
    }
    if is_template_parameter(&base) || !base.chars().all(|c| c.is_alphanumeric() || c == '_' || c == ':') {
        return None;
    }
    Some(base)
}

/// Last `::` segment, the name a mock catalog is keyed by.
pub fn unqualified(name: &str) -> &str {
    name.rsplit("::").next().unwrap_or(name)
}

fn strip_decorations(raw: &str) -> String {
    let cleaned: String = raw.chars().filter(|c| *c != '&' && *c != '*').collect();
    cleaned
        .split_whitespace()
        .filter(|w| !matches!(*w, "const" | "volatile" | "struct" | "class" | "typename" | "mutable"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_template_argument(angle: &str) -> Option<String> {
    let mut depth = 0usize;
    let mut out = String::new();
    for c in angle.chars() {
        match c {
            '<' => {
                depth += 1;
                if depth == 1 {
                    continue;
                }
            }
            '>' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(out);
                }
            }
            ',' if depth == 1 => return Some(out),
            _ => {}
        }
        out.push(c);
    }
    None
}

fn is_template_parameter(name: &str) -> bool {
    let mut chars = name.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_ascii_uppercase())
}
