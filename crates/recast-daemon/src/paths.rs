//! Mapping from changed source files back to unit names

use std::path::{Component, Path, PathBuf};

/// Inverse of the filesystem locator: `<root>/app/models/Widget.src` -> `app.models.Widget`
#[derive(Debug, Clone)]
pub struct UnitPaths {
    roots: Vec<PathBuf>,
    extension: String,
}

impl UnitPaths {
    pub fn new(roots: Vec<PathBuf>, extension: impl Into<String>) -> Self {
        // Watchers report canonical paths, so match against both spellings of a root
        let mut all = Vec::with_capacity(roots.len() * 2);
        for root in roots {
            if let Ok(canonical) = root.canonicalize() {
                if canonical != root {
                    all.push(canonical);
                }
            }
            all.push(root);
        }
        Self {
            roots: all,
            extension: extension.into(),
        }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// The unit a source path defines, if it lies under a root and has the source extension
    pub fn unit_for(&self, path: &Path) -> Option<String> {
        if path.extension()?.to_str()? != self.extension {
            return None;
        }

        let relative = self
            .roots
            .iter()
            .find_map(|root| path.strip_prefix(root).ok())?
            .with_extension("");

        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(segment) => segments.push(segment.to_str()?),
                _ => return None,
            }
        }

        if segments.is_empty() {
            None
        } else {
            Some(segments.join("."))
        }
    }
}
