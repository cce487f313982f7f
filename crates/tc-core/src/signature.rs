//! Method signatures extracted from a class interface.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// C++ member access level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    Public,
    Protected,
    Private,
}

impl Access {
    /// Parse an access specifier keyword (`public`, `protected`, `private`).
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.trim().trim_end_matches(':').trim() {
            "public" => Some(Access::Public),
            "protected" => Some(Access::Protected),
            "private" => Some(Access::Private),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Access::Public => "public",
            Access::Protected => "protected",
            Access::Private => "private",
        }
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single method parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name (empty for unnamed parameters)
    pub name: String,
    /// Type as written, whitespace-normalized (e.g. `const std::string&`)
    pub ty: String,
}

impl Parameter {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            f.write_str(&self.ty)
        } else {
            write!(f, "{} {}", self.ty, self.name)
        }
    }
}

/// Method qualifiers captured from the declaration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Qualifiers {
    pub is_const: bool,
    pub is_static: bool,
    pub is_virtual: bool,
}

/// One method of a class under test.
///
/// Immutable once extracted. Two signatures are equal when they share the
/// owning class, the method name and the parameter types; parameter names,
/// return type, qualifiers and access do not take part in equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodSignature {
    /// Owning class name (unqualified)
    pub class_name: String,
    /// Method name
    pub name: String,
    /// Ordered parameter list
    pub parameters: Vec<Parameter>,
    /// Return type as written
    pub return_type: String,
    /// const / static / virtual
    pub qualifiers: Qualifiers,
    /// Access level inside the class
    pub access: Access,
}

impl MethodSignature {
    /// Create a public, unqualified signature.
    pub fn new(
        class_name: impl Into<String>,
        name: impl Into<String>,
        parameters: Vec<Parameter>,
        return_type: impl Into<String>,
    ) -> Self {
        let signature = Self {
            class_name: class_name.into(),
            name: name.into(),
            parameters,
            return_type: return_type.into(),
            qualifiers: Qualifiers::default(),
            access: Access::Public,
        };
        debug_assert!(!signature.name.is_empty(), "Method name must not be empty");
        signature
    }

    /// Set the access level.
    #[must_use]
    pub fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    /// Set the qualifiers.
    #[must_use]
    pub fn with_qualifiers(mut self, qualifiers: Qualifiers) -> Self {
        self.qualifiers = qualifiers;
        self
    }

    /// Parameter types in declaration order.
    pub fn parameter_types(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|p| p.ty.as_str())
    }

    /// Render as a C++ member declaration, e.g. `virtual int size() const;`.
    pub fn render_declaration(&self) -> String {
        let mut out = String::new();
        if self.qualifiers.is_static {
            out.push_str("static ");
        }
        if self.qualifiers.is_virtual {
            out.push_str("virtual ");
        }
        if !self.return_type.is_empty() {
            out.push_str(&self.return_type);
            out.push(' ');
        }
        out.push_str(&self.name);
        out.push('(');
        let params: Vec<String> = self.parameters.iter().map(ToString::to_string).collect();
        out.push_str(&params.join(", "));
        out.push(')');
        if self.qualifiers.is_const {
            out.push_str(" const");
        }
        out.push(';');
        out
    }
}

impl PartialEq for MethodSignature {
    fn eq(&self, other: &Self) -> bool {
        self.class_name == other.class_name
            && self.name == other.name
            && self.parameter_types().eq(other.parameter_types())
    }
}

impl Eq for MethodSignature {}

impl Hash for MethodSignature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.class_name.hash(state);
        self.name.hash(state);
        for ty in self.parameter_types() {
            ty.hash(state);
        }
    }
}
