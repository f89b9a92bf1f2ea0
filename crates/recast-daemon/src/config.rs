//! Reload driver configuration

use anyhow::{Context, Result};
use recast_core::{BinaryInspector, EnhancementPipeline, ExportHook, FsLocator, PipelineBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::paths::UnitPaths;

/// Driver configuration, usually read from a TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReloadConfig {
    /// Ordered search path for unit sources
    pub source_roots: Vec<PathBuf>,
    /// Extension of unit source files, without the dot
    pub source_extension: String,
    /// Precompile export of final binaries
    pub export: ExportConfig,
    /// Fully-qualified name of the extension base type
    pub extension_base: String,
    /// Debounce window for file events in milliseconds
    pub debounce_ms: u64,
    /// Log level used when `RUST_LOG` is not set
    pub log_level: String,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            source_roots: vec![PathBuf::from("src")],
            source_extension: "src".to_string(),
            export: ExportConfig::default(),
            extension_base: "recast.Extension".to_string(),
            debounce_ms: 500,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub enabled: bool,
    pub root: PathBuf,
    pub extension: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            root: PathBuf::from("precompiled"),
            extension: "bin".to_string(),
        }
    }
}

impl ReloadConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        if config.source_roots.is_empty() {
            anyhow::bail!("source_roots must name at least one directory");
        }
        Ok(config)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn locator(&self) -> FsLocator {
        FsLocator::new(self.source_roots.clone(), self.source_extension.clone())
    }

    pub fn unit_paths(&self) -> UnitPaths {
        UnitPaths::new(self.source_roots.clone(), self.source_extension.clone())
    }

    /// The export hook, if export is enabled
    pub fn export_hook(&self) -> Option<ExportHook> {
        self.export
            .enabled
            .then(|| ExportHook::new(self.export.root.clone(), self.export.extension.clone()))
    }

    /// Pipeline builder for the configured extension base, with export wired in.
    /// The host adds the stages its extensions contribute.
    pub fn pipeline(&self, inspector: Arc<dyn BinaryInspector>) -> PipelineBuilder {
        let builder = EnhancementPipeline::builder(self.extension_base.clone(), inspector);
        match self.export_hook() {
            Some(hook) => builder.export(hook),
            None => builder,
        }
    }
}
