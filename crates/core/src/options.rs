use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Options passed to the template engine when compiling a source. Immutable;
/// the `with_*` methods return modified copies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareOptions {
    only_includes: bool,
    temporary_directory: Option<PathBuf>,
}

impl PrepareOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate only fragment include directives, leaving other expressions untouched.
    pub fn with_only_includes(&self) -> Self {
        Self {
            only_includes: true,
            ..self.clone()
        }
    }

    /// Override the directory the engine stores prepared artifacts in.
    ///
    /// Fails when the directory does not exist or is not a directory.
    pub fn with_temporary_directory(&self, dir: impl AsRef<Path>) -> Result<Self, String> {
        let dir = dir.as_ref();
        if !dir.exists() {
            return Err(format!("Temporary directory does not exist: {}", dir.display()));
        }
        if !dir.is_dir() {
            return Err(format!("Temporary directory parameter is not a directory: {}", dir.display()));
        }
        Ok(Self {
            temporary_directory: Some(dir.to_path_buf()),
            ..self.clone()
        })
    }

    pub fn only_includes(&self) -> bool {
        self.only_includes
    }

    pub fn temporary_directory(&self) -> Option<&Path> {
        self.temporary_directory.as_deref()
    }
}
