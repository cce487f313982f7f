//! Mock bindings discovered on disk.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A discovered mock file bound to the interface/class it mocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockBinding {
    /// Name of the mocked interface/class (e.g. `Database`)
    pub mocked_class: String,
    /// Name of the mock class itself (e.g. `MockDatabase`)
    pub mock_class: String,
    /// Mock file path
    pub path: PathBuf,
    /// Include path relative to the discovery root, `/`-separated
    pub include_path: String,
    /// Mocked method names, in file order
    pub methods: Vec<String>,
    /// Mock constructor declaration, e.g. `MockDatabase(int retries)`
    pub constructor: String,
}

impl MockBinding {
    /// `#include "..."` directive for this mock.
    pub fn include_directive(&self) -> String {
        format!("#include \"{}\"", self.include_path)
    }
}
