//! Concurrent registry of artifacts keyed by unit name
//!
//! Readers (`get`, `all`, `has_unit`, the capability queries) run concurrently
//! with a single driver that mutates entries. Lookups of unknown names create
//! the artifact exactly once; lookups of names without a source are never
//! remembered, since the source may appear later.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::artifact::Artifact;
use crate::context::Context;
use crate::error::{CompileError, CoreError, LoadError};
use crate::loader::LoadedType;

type Store = Arc<DashMap<String, Arc<Artifact>>>;

/// How often a force-load restarts after a concurrent refresh
pub const LOAD_ATTEMPTS: usize = 3;

pub struct ArtifactCache {
    context: Context,
    // Swapped wholesale by `clear`; in-flight operations keep the old store alive
    units: RwLock<Store>,
}

impl ArtifactCache {
    pub fn new(context: Context) -> Self {
        Self {
            context,
            units: RwLock::new(Arc::new(DashMap::new())),
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    fn store(&self) -> Store {
        self.units.read().clone()
    }

    /// The cached artifact, or a new one if the name resolves to a source
    pub fn get(&self, name: &str) -> Option<Arc<Artifact>> {
        let store = self.store();
        if let Some(found) = store.get(name) {
            return Some(found.value().clone());
        }

        let source = self.context.locator().resolve(name)?;
        let artifact = store
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!("Caching unit {} from {}", name, source.location());
                Arc::new(Artifact::new(name, source))
            })
            .value()
            .clone();
        Some(artifact)
    }

    /// Snapshot of every cached artifact, ordered by name
    pub fn all(&self) -> Vec<Arc<Artifact>> {
        let mut artifacts: Vec<_> = self
            .store()
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        artifacts.sort_by(|a, b| a.name().cmp(b.name()));
        artifacts
    }

    /// Insert an artifact produced out-of-band, replacing any previous entry
    pub fn add(&self, artifact: Arc<Artifact>) -> Option<Arc<Artifact>> {
        debug!("Adding unit {}", artifact.name());
        self.store().insert(artifact.name().to_string(), artifact)
    }

    /// Untrack a unit. Callers holding the artifact keep a valid reference.
    pub fn remove(&self, name: &str) -> Option<Arc<Artifact>> {
        let removed = self.store().remove(name).map(|(_, artifact)| artifact);
        if removed.is_some() {
            debug!("Removed unit {}", name);
        }
        removed
    }

    pub fn remove_artifact(&self, artifact: &Artifact) -> Option<Arc<Artifact>> {
        self.remove(artifact.name())
    }

    pub fn has_unit(&self, name: &str) -> bool {
        self.store().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.store().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store().is_empty()
    }

    /// Drop every entry by swapping in a fresh store
    pub fn clear(&self) {
        *self.units.write() = Arc::new(DashMap::new());
        debug!("Cleared artifact cache");
    }

    /// Compile several units in one compiler invocation.
    ///
    /// Every binary the compiler produces is delivered to its artifact,
    /// including nested units nobody asked for yet.
    pub fn compile(&self, names: &BTreeSet<String>) -> Result<Vec<Arc<Artifact>>, CompileError> {
        let produced = self.context.compiler().compile(names)?;

        let mut compiled = Vec::with_capacity(produced.len());
        for (name, code) in produced {
            match self.get(&name) {
                Some(artifact) => {
                    artifact.compiled(code);
                    compiled.push(artifact);
                }
                None => warn!("Compiler produced {} but no source resolves for it", name),
            }
        }
        Ok(compiled)
    }

    /// Bring an artifact into the runtime, running whatever of
    /// compile -> enhance -> load is still outstanding.
    ///
    /// If the source is refreshed while this runs, the stale work is thrown
    /// away and the sequence starts over, up to [`LOAD_ATTEMPTS`] times.
    pub fn load(&self, artifact: &Artifact) -> Result<Arc<LoadedType>, CoreError> {
        for attempt in 1..=LOAD_ATTEMPTS {
            let epoch = artifact.epoch();
            let result = self.load_once(artifact);
            let superseded = artifact.epoch() != epoch;

            match result {
                Ok(Some(loaded)) => return Ok(loaded),
                Ok(None) if attempt < LOAD_ATTEMPTS => {
                    debug!("{} changed while loading, retrying", artifact.name());
                }
                Err(_) if superseded && attempt < LOAD_ATTEMPTS => {
                    debug!("{} changed while loading, retrying", artifact.name());
                }
                Ok(None) => break,
                Err(e) => return Err(e),
            }
        }
        Err(LoadError::new(artifact.name(), "unit changed while loading").into())
    }

    /// One pass of the load sequence; `None` when the final binary was
    /// replaced before the loaded type could be recorded
    fn load_once(&self, artifact: &Artifact) -> Result<Option<Arc<LoadedType>>, CoreError> {
        if artifact.is_definable() {
            if let Some(loaded) = artifact.loaded_type() {
                return Ok(Some(loaded));
            }
        }

        if !artifact.is_compiled() {
            artifact.compile(self.context.compiler())?;
        }
        let binary = match artifact.enhanced_binary() {
            Some(binary) => binary,
            None => artifact.enhance(self.context.pipeline())?.binary,
        };

        let loaded = Arc::new(self.context.loader().load(artifact.name(), &binary)?);
        Ok(artifact.define_from(&binary, loaded.clone()).then_some(loaded))
    }

    /// Units whose loaded type is assignable to `capability`, excluding
    /// `capability` itself. Fails as a whole if any candidate cannot be loaded.
    pub fn assignable_to(&self, capability: &str) -> Result<Vec<Arc<Artifact>>, CoreError> {
        self.filter_loaded(|loaded| {
            loaded.is_assignable_to(capability) && loaded.name() != capability
        })
    }

    /// Units whose loaded type carries `marker`. Fails as a whole if any
    /// candidate cannot be loaded.
    pub fn marked_with(&self, marker: &str) -> Result<Vec<Arc<Artifact>>, CoreError> {
        self.filter_loaded(|loaded| loaded.has_marker(marker))
    }

    fn filter_loaded<F>(&self, predicate: F) -> Result<Vec<Arc<Artifact>>, CoreError>
    where
        F: Fn(&LoadedType) -> bool,
    {
        let mut results = Vec::new();
        for artifact in self.all() {
            if !artifact.is_unit() {
                continue;
            }
            let loaded = self.load(&artifact)?;
            if predicate(&loaded) {
                results.push(artifact);
            }
        }
        Ok(results)
    }
}

impl fmt::Display for ArtifactCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, artifact) in self.all().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", artifact)?;
        }
        write!(f, "]")
    }
}

impl fmt::Debug for ArtifactCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactCache")
            .field("units", &self.len())
            .field("context", &self.context)
            .finish()
    }
}
