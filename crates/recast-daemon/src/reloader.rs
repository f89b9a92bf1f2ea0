//! Drives the artifact cache from source changes
//!
//! A single reloader owns every mutation of the cache while readers keep
//! querying it concurrently. Compilation blocks, so the async loop hands each
//! change to the blocking pool and waits for it before taking the next one.

use anyhow::{Context, Result};
use recast_core::fqn::UnitName;
use recast_core::{Artifact, ArtifactCache, CoreError};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::paths::UnitPaths;
use crate::watcher::{FileChange, FileChangeKind, SourceWatcher};

/// What a reload did to one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// Recompiled, enhanced and loaded again
    Reloaded {
        name: String,
        signature_changed: bool,
    },
    /// Recompiled and loaded without enhancement because it defines an extension
    BootstrapSkipped { name: String },
    /// No source resolves for the unit any more; it was dropped from the cache
    Missing { name: String },
}

impl ReloadOutcome {
    pub fn name(&self) -> &str {
        match self {
            Self::Reloaded { name, .. }
            | Self::BootstrapSkipped { name }
            | Self::Missing { name } => name,
        }
    }
}

impl fmt::Display for ReloadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reloaded {
                name,
                signature_changed: true,
            } => write!(f, "{} reloaded (signature changed)", name),
            Self::Reloaded { name, .. } => write!(f, "{} reloaded", name),
            Self::BootstrapSkipped { name } => write!(f, "{} reloaded unenhanced", name),
            Self::Missing { name } => write!(f, "{} removed", name),
        }
    }
}

pub struct Reloader {
    cache: Arc<ArtifactCache>,
    paths: UnitPaths,
}

impl Reloader {
    pub fn new(cache: Arc<ArtifactCache>, paths: UnitPaths) -> Self {
        Self { cache, paths }
    }

    pub fn cache(&self) -> &Arc<ArtifactCache> {
        &self.cache
    }

    /// Cached artifacts compiled from the same source as `name`: the unit
    /// itself plus its nested units
    fn family(&self, name: &str) -> Vec<Arc<Artifact>> {
        self.cache
            .all()
            .into_iter()
            .filter(|artifact| UnitName::new(artifact.name()).enclosing() == name)
            .collect()
    }

    /// Re-read, recompile, re-enhance and reload a top-level unit and its nested units
    pub fn reload(&self, name: &str) -> Result<Vec<ReloadOutcome>, CoreError> {
        let start = Instant::now();

        if self.cache.context().locator().resolve(name).is_none() {
            self.forget(name);
            return Ok(vec![ReloadOutcome::Missing {
                name: name.to_string(),
            }]);
        }
        if self.cache.get(name).is_none() {
            // Source vanished between the two lookups
            return Ok(vec![ReloadOutcome::Missing {
                name: name.to_string(),
            }]);
        }

        let previous = self.family(name);
        for artifact in &previous {
            artifact.refresh();
            artifact.uncompile();
        }

        let compiled = self.cache.compile(&BTreeSet::from([name.to_string()]))?;

        // Nested units the new source no longer declares
        for artifact in &previous {
            if !compiled.iter().any(|c| c.name() == artifact.name()) {
                debug!("{} no longer produced, dropping it", artifact.name());
                self.cache.remove_artifact(artifact);
            }
        }

        let pipeline = self.cache.context().pipeline();
        let mut outcomes = Vec::with_capacity(compiled.len());
        for artifact in compiled {
            let enhancement = artifact.enhance(pipeline)?;
            if artifact.is_unit() {
                self.cache.load(&artifact)?;
            }

            let name = artifact.name().to_string();
            outcomes.push(if enhancement.bootstrap_skipped {
                ReloadOutcome::BootstrapSkipped { name }
            } else {
                ReloadOutcome::Reloaded {
                    name,
                    signature_changed: enhancement.signature.is_some_and(|s| s.changed()),
                }
            });
        }

        info!(
            "Reloaded {} ({} units) in {}ms",
            name,
            outcomes.len(),
            start.elapsed().as_millis()
        );
        Ok(outcomes)
    }

    /// Drop a top-level unit and its nested units from the cache
    pub fn forget(&self, name: &str) -> usize {
        let family = self.family(name);
        for artifact in &family {
            artifact.uncompile();
            self.cache.remove_artifact(artifact);
        }
        if !family.is_empty() {
            info!("Forgot {} ({} units)", name, family.len());
        }
        family.len()
    }

    /// Apply one file change
    pub fn handle_change(&self, change: &FileChange) -> Result<Vec<ReloadOutcome>> {
        match &change.kind {
            FileChangeKind::Created | FileChangeKind::Modified => {
                match self.paths.unit_for(&change.path) {
                    Some(name) => self
                        .reload(&name)
                        .with_context(|| format!("Failed to reload {}", name)),
                    None => {
                        debug!("{:?} is not a unit source", change.path);
                        Ok(Vec::new())
                    }
                }
            }
            FileChangeKind::Removed => Ok(self.removed(&change.path)),
            FileChangeKind::Renamed { from, to } => {
                let mut outcomes = self.removed(from);
                if let Some(name) = self.paths.unit_for(to) {
                    outcomes.extend(
                        self.reload(&name)
                            .with_context(|| format!("Failed to reload {}", name))?,
                    );
                }
                Ok(outcomes)
            }
        }
    }

    fn removed(&self, path: &Path) -> Vec<ReloadOutcome> {
        match self.paths.unit_for(path) {
            Some(name) => {
                self.forget(&name);
                vec![ReloadOutcome::Missing { name }]
            }
            None => Vec::new(),
        }
    }

    /// Apply changes from `watcher` until `shutdown` fires or the watcher stops
    pub async fn run(
        self: Arc<Self>,
        mut watcher: SourceWatcher,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        info!("Starting reload loop");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Shutting down reload loop");
                    break;
                }
                change = watcher.next_change() => {
                    let Some(change) = change else {
                        warn!("Watcher stopped, leaving reload loop");
                        break;
                    };
                    debug!("Processing file change: {:?}", change);

                    let reloader = self.clone();
                    match tokio::task::spawn_blocking(move || reloader.handle_change(&change)).await {
                        Ok(Ok(outcomes)) => {
                            for outcome in outcomes {
                                debug!("{}", outcome);
                            }
                        }
                        Ok(Err(e)) => error!("Error handling file change: {:#}", e),
                        Err(e) => error!("Reload task failed: {}", e),
                    }
                }
            }
        }

        Ok(())
    }
}

impl fmt::Debug for Reloader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reloader")
            .field("cache", &self.cache)
            .field("paths", &self.paths)
            .finish()
    }
}
