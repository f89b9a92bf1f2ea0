//! Precompile export of final binaries
//!
//! Each unit is written to `<root>/<package path>/<Name>.<ext>`, mirroring the
//! standard layout so the exported tree can be packaged as-is.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ExportError;
use crate::fqn::PACKAGE_SEPARATOR;

/// Writes final binaries below an export root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportHook {
    root: PathBuf,
    extension: String,
}

impl ExportHook {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Destination for a unit. Nested units keep their `$` suffix.
    pub fn path_for(&self, unit: &str) -> PathBuf {
        let relative = unit.replace(PACKAGE_SEPARATOR, "/");
        self.root.join(format!("{}.{}", relative, self.extension))
    }

    /// Write a unit's binary, creating parent directories as needed
    pub fn write(&self, unit: &str, binary: &[u8]) -> Result<PathBuf, ExportError> {
        let path = self.path_for(unit);
        let io_error = |source| ExportError {
            unit: unit.to_string(),
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        fs::write(&path, binary).map_err(io_error)?;
        Ok(path)
    }
}
