//! # tc-mocks
//!
//! Discovers mock and fake headers under a set of root directories and
//! indexes them by the class they stand in for.
//!
//! Discovery is a pure function from roots to a [`MockCatalog`] value. The
//! catalog is rebuilt wholesale on every run and is read-only afterwards, so
//! concurrent workers share it behind an `Arc` without locking.
//!
//! Traversal is deterministic: roots in the order given, and within a root a
//! depth-first walk with entries sorted by file name. When two mocks claim the
//! same class, the later one in that order wins and a
//! [`CatalogWarning::MockCollision`] is recorded.

pub mod scan;

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use tc_core::MockBinding;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

pub use scan::{scan_mock, ScannedMock};

const HEADER_EXTENSIONS: &[&str] = &["h", "hh", "hpp", "hxx"];

/// Markers in a file stem or directory name that designate mocks.
const MOCK_MARKERS: &[&str] = &["mock", "fake"];

/// Non-fatal conditions recorded during discovery.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogWarning {
    #[error("mock collision for `{class}`: {winner} replaces {replaced}")]
    MockCollision {
        class: String,
        winner: PathBuf,
        replaced: PathBuf,
    },

    #[error("mock root {0} does not exist or is not a directory")]
    MissingRoot(PathBuf),

    #[error("cannot read {path}: {message}")]
    Unreadable { path: PathBuf, message: String },
}

/// Mock bindings keyed by mocked class name.
#[derive(Debug, Clone, Default)]
pub struct MockCatalog {
    bindings: HashMap<String, MockBinding>,
    /// Lowercased key to key
    folded: HashMap<String, String>,
    /// Unqualified base class of a mock to key
    aliases: HashMap<String, String>,
    warnings: Vec<CatalogWarning>,
}

impl MockCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `roots` for mock headers.
    pub fn discover<P: AsRef<Path>>(roots: &[P]) -> Self {
        let mut catalog = Self::new();

        for root in roots {
            let root = root.as_ref();
            if !root.is_dir() {
                warn!(root = %root.display(), "mock root missing, skipping");
                catalog
                    .warnings
                    .push(CatalogWarning::MissingRoot(root.to_path_buf()));
                continue;
            }
            catalog.scan_root(root);
        }

        info!(
            mocks = catalog.len(),
            warnings = catalog.warnings.len(),
            "mock catalog built"
        );
        catalog
    }

    fn scan_root(&mut self, root: &Path) {
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_excluded_dir(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(root = %root.display(), error = %e, "walk error, skipping entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            if !is_mock_candidate(relative) {
                continue;
            }

            let text = match fs::read_to_string(path) {
                Ok(text) => text,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unreadable mock file");
                    self.warnings.push(CatalogWarning::Unreadable {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let Some(scanned) = scan_mock(&text, &stem) else {
                debug!(path = %path.display(), "no class in mock candidate");
                continue;
            };

            let binding = MockBinding {
                mocked_class: scanned.mocked_class,
                mock_class: scanned.mock_class,
                path: path.to_path_buf(),
                include_path: include_path(relative),
                methods: scanned.methods,
                constructor: scanned.constructor,
            };
            self.insert(binding, &scanned.bases);
        }
    }

    /// Insert a binding; a later binding for the same class replaces the earlier.
    pub fn insert(&mut self, binding: MockBinding, bases: &[String]) {
        let key = binding.mocked_class.clone();

        if let Some(previous) = self.bindings.get(&key) {
            let warning = CatalogWarning::MockCollision {
                class: key.clone(),
                winner: binding.path.clone(),
                replaced: previous.path.clone(),
            };
            warn!("{}", warning);
            self.warnings.push(warning);
        }

        debug!(
            class = %key,
            mock = %binding.mock_class,
            methods = binding.methods.len(),
            "indexed mock"
        );

        self.folded.insert(key.to_lowercase(), key.clone());
        for base in bases {
            if *base != key {
                self.aliases.insert(base.clone(), key.clone());
            }
        }
        self.bindings.insert(key, binding);
    }

    /// Binding for a class name.
    ///
    /// Exact name first, then case-insensitive, then the base-class name a
    /// mock derives from (so `IDatabase` finds `MockDatabase : public IDatabase`).
    pub fn find(&self, class_name: &str) -> Option<&MockBinding> {
        if let Some(binding) = self.bindings.get(class_name) {
            return Some(binding);
        }
        self.folded
            .get(&class_name.to_lowercase())
            .or_else(|| self.aliases.get(class_name))
            .and_then(|key| self.bindings.get(key))
    }

    /// Number of indexed classes.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Indexed class names, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.bindings.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Bindings ordered by class name.
    pub fn bindings(&self) -> Vec<&MockBinding> {
        self.keys()
            .into_iter()
            .filter_map(|k| self.bindings.get(k))
            .collect()
    }

    /// Warnings recorded during discovery.
    pub fn warnings(&self) -> &[CatalogWarning] {
        &self.warnings
    }
}

fn is_excluded_dir(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.')
        || name == "build"
        || name.starts_with("cmake-build")
        || name == "target"
        || name == "node_modules"
}

/// Name-pattern filter applied before a file is opened.
fn is_mock_candidate(relative: &Path) -> bool {
    let is_header = relative
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| HEADER_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
    if !is_header {
        return false;
    }

    let has_marker = |s: &str| {
        let lower = s.to_lowercase();
        MOCK_MARKERS.iter().any(|m| lower.contains(m))
    };

    let stem_marked = relative
        .file_stem()
        .is_some_and(|s| has_marker(&s.to_string_lossy()));
    let dir_marked = relative
        .parent()
        .map(|dir| {
            dir.components()
                .any(|c| matches!(c, Component::Normal(name) if has_marker(&name.to_string_lossy())))
        })
        .unwrap_or(false);

    stem_marked || dir_marked
}

/// `/`-separated include path relative to the discovery root.
fn include_path(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
