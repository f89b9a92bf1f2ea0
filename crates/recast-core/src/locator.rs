//! Unit locators: resolve a unit name to its source
//!
//! [`FsLocator`] searches an ordered list of source roots on disk. [`MemoryLocator`]
//! is a virtual filesystem for embedders and tests. Both truncate nested unit
//! names to the enclosing unit before resolving.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::trace;

use crate::fqn::UnitName;

/// A located source file
pub trait SourceHandle: Send + Sync + fmt::Debug {
    /// Human-readable location, used in logs and diagnostics
    fn location(&self) -> String;

    /// Current text content
    fn read_text(&self) -> io::Result<String>;

    /// Last modification time in milliseconds since the Unix epoch, 0 if unknown
    fn last_modified(&self) -> u64;
}

/// Maps a fully-qualified unit name to its source
pub trait UnitLocator: Send + Sync {
    /// `None` when no source exists for the name (or the name denotes a package)
    fn resolve(&self, name: &str) -> Option<Arc<dyn SourceHandle>>;
}

/// A source file on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsSource {
    path: PathBuf,
}

impl FsSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SourceHandle for FsSource {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn read_text(&self) -> io::Result<String> {
        fs::read_to_string(&self.path)
    }

    fn last_modified(&self) -> u64 {
        fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Searches source roots in order for `<root>/<pkg path>/<Name>.<ext>`
#[derive(Debug, Clone)]
pub struct FsLocator {
    roots: Vec<PathBuf>,
    extension: String,
}

impl FsLocator {
    pub fn new(roots: Vec<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            roots,
            extension: extension.into(),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }
}

impl UnitLocator for FsLocator {
    fn resolve(&self, name: &str) -> Option<Arc<dyn SourceHandle>> {
        let unit = UnitName::new(name);
        let stem = unit.relative_stem();
        let file = unit.relative_path(&self.extension);

        for root in &self.roots {
            // A directory with this exact name means the name is a package
            let dir = root.join(&stem);
            if dir.is_dir() && matches_on_disk(&dir) {
                trace!("{} resolves to package directory {:?}", name, dir);
                return None;
            }

            let candidate = root.join(&file);
            if candidate.is_file() && matches_on_disk(&candidate) {
                return Some(Arc::new(FsSource::new(candidate)));
            }
        }

        None
    }
}

/// Case-exact existence check, so `app/widget.src` never answers for `app.Widget`
/// on case-insensitive filesystems.
fn matches_on_disk(path: &Path) -> bool {
    let (Some(parent), Some(file_name)) = (path.parent(), path.file_name()) else {
        return false;
    };
    match fs::read_dir(parent) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .any(|entry| entry.file_name() == file_name),
        Err(_) => false,
    }
}

/// An in-memory source with settable text and modification time
#[derive(Debug)]
pub struct MemorySource {
    name: String,
    text: RwLock<String>,
    modified: AtomicU64,
}

impl MemorySource {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the text and bump the modification time
    pub fn update(&self, text: impl Into<String>, modified: u64) {
        *self.text.write() = text.into();
        self.modified.store(modified, Ordering::SeqCst);
    }
}

impl SourceHandle for MemorySource {
    fn location(&self) -> String {
        format!("memory://{}", self.name)
    }

    fn read_text(&self) -> io::Result<String> {
        Ok(self.text.read().clone())
    }

    fn last_modified(&self) -> u64 {
        self.modified.load(Ordering::SeqCst)
    }
}

/// Virtual source tree keyed by enclosing unit name
#[derive(Debug, Default)]
pub struct MemoryLocator {
    sources: DashMap<String, Arc<MemorySource>>,
}

impl MemoryLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the source for a unit
    pub fn insert(
        &self,
        name: impl Into<String>,
        text: impl Into<String>,
        modified: u64,
    ) -> Arc<MemorySource> {
        let name = name.into();
        let source = Arc::new(MemorySource {
            name: name.clone(),
            text: RwLock::new(text.into()),
            modified: AtomicU64::new(modified),
        });
        self.sources.insert(name, source.clone());
        source
    }

    pub fn remove(&self, name: &str) -> Option<Arc<MemorySource>> {
        self.sources.remove(name).map(|(_, source)| source)
    }

    pub fn source(&self, name: &str) -> Option<Arc<MemorySource>> {
        self.sources.get(name).map(|entry| entry.value().clone())
    }
}

impl UnitLocator for MemoryLocator {
    fn resolve(&self, name: &str) -> Option<Arc<dyn SourceHandle>> {
        let enclosing = UnitName::new(name).enclosing();
        self.sources
            .get(enclosing)
            .map(|entry| entry.value().clone() as Arc<dyn SourceHandle>)
    }
}
