//! Source units: one analyzed header per class under test.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::signature::{Access, MethodSignature};

/// One analyzed header (plus optional implementation) for a single class.
///
/// Created per invocation and dropped once generation for the file is done.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceUnit {
    /// Header path
    pub header_path: PathBuf,
    /// Paired implementation path, if any
    pub implementation_path: Option<PathBuf>,
    /// Primary class name (unqualified)
    pub class_name: String,
    /// Enclosing namespaces, outermost first
    pub namespace: Vec<String>,
    /// Ordered method signatures declared by the class
    pub signatures: Vec<MethodSignature>,
    /// Types the class is wired with: constructor parameters and data members
    pub collaborators: Vec<String>,
    /// Set when produced by the text-pattern fallback
    pub degraded: bool,
    /// Header text
    #[serde(skip)]
    pub header_text: String,
    /// Implementation text, if an implementation file was given
    #[serde(skip)]
    pub implementation_text: Option<String>,
}

impl SourceUnit {
    /// Fully qualified class name, e.g. `util::StringUtils`.
    pub fn qualified_name(&self) -> String {
        if self.namespace.is_empty() {
            self.class_name.clone()
        } else {
            format!("{}::{}", self.namespace.join("::"), self.class_name)
        }
    }

    /// Header file name, used for the include of the class under test.
    pub fn header_file_name(&self) -> String {
        file_name(&self.header_path)
    }

    /// Signatures with the given access level.
    pub fn signatures_with(&self, access: Access) -> impl Iterator<Item = &MethodSignature> {
        self.signatures.iter().filter(move |s| s.access == access)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
