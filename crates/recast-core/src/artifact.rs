//! Per-unit artifact chain: source text -> raw binary -> final binary -> loaded type
//!
//! Artifacts are shared as `Arc<Artifact>` between the cache, concurrent
//! readers and the driver. Identity (`name`, source handle) is immutable;
//! everything else sits behind a lock so readers always see a consistent
//! snapshot of the chain.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tracing::{trace, warn};

use crate::compiler::Compiler;
use crate::error::{CompileError, EnhanceError};
use crate::fingerprint::{SignatureChange, SignatureChecksum};
use crate::fqn::UnitName;
use crate::loader::LoadedType;
use crate::locator::SourceHandle;
use crate::pipeline::{Binary, EnhancementPipeline, INPUT_STAGE};

/// Where an artifact sits in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Created,
    Compiled,
    Enhanced,
    Loaded,
}

/// What one enhancement produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enhancement {
    pub binary: Binary,
    pub bootstrap_skipped: bool,
    /// `None` when the structural peek failed or the artifact is not a unit
    pub signature: Option<SignatureChange>,
}

#[derive(Debug, Default)]
struct ArtifactState {
    source_text: Option<String>,
    raw: Option<Binary>,
    enhanced: Option<Binary>,
    loaded: Option<Arc<LoadedType>>,
    last_compiled_at: u64,
    compiled: bool,
    signature_checksum: Option<SignatureChecksum>,
    // Bumped by every refresh; results computed against an older epoch are discarded
    epoch: u64,
}

/// Cached state for one named unit
pub struct Artifact {
    name: String,
    source: Arc<dyn SourceHandle>,
    state: RwLock<ArtifactState>,
}

impl Artifact {
    /// Create an artifact and read its source text
    pub fn new(name: impl Into<String>, source: Arc<dyn SourceHandle>) -> Self {
        let artifact = Self {
            name: name.into(),
            source,
            state: RwLock::new(ArtifactState::default()),
        };
        artifact.refresh();
        artifact
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &Arc<dyn SourceHandle> {
        &self.source
    }

    /// Package part of the name
    pub fn package(&self) -> &str {
        UnitName::new(&self.name).package()
    }

    /// Package descriptors are cached like units but never enhanced or loaded
    pub fn is_unit(&self) -> bool {
        !UnitName::new(&self.name).is_package_descriptor()
    }

    pub fn source_text(&self) -> Option<String> {
        self.state.read().source_text.clone()
    }

    pub fn raw_binary(&self) -> Option<Binary> {
        self.state.read().raw.clone()
    }

    pub fn enhanced_binary(&self) -> Option<Binary> {
        self.state.read().enhanced.clone()
    }

    pub fn loaded_type(&self) -> Option<Arc<LoadedType>> {
        self.state.read().loaded.clone()
    }

    /// Source modification time recorded by the last compile, 0 if never compiled
    pub fn last_compiled_at(&self) -> u64 {
        self.state.read().last_compiled_at
    }

    pub fn is_compiled(&self) -> bool {
        self.state.read().compiled
    }

    /// Compiled and present in the runtime
    pub fn is_definable(&self) -> bool {
        let state = self.state.read();
        state.compiled && state.loaded.is_some()
    }

    /// Number of refreshes so far. Changes whenever the source is re-read.
    pub fn epoch(&self) -> u64 {
        self.state.read().epoch
    }

    pub fn signature_checksum(&self) -> Option<SignatureChecksum> {
        self.state.read().signature_checksum
    }

    /// True when the source changed after the last compile
    pub fn is_stale(&self) -> bool {
        let state = self.state.read();
        !state.compiled || self.source.last_modified() > state.last_compiled_at
    }

    pub fn stage(&self) -> Stage {
        let state = self.state.read();
        if state.compiled && state.loaded.is_some() {
            Stage::Loaded
        } else if state.enhanced.is_some() {
            Stage::Enhanced
        } else if state.compiled {
            Stage::Compiled
        } else {
            Stage::Created
        }
    }

    /// Re-read the source and drop every compiled product
    pub fn refresh(&self) {
        let text = match self.source.read_text() {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(
                    "Failed to read source of {} from {}: {}",
                    self.name,
                    self.source.location(),
                    e
                );
                None
            }
        };

        let mut state = self.state.write();
        state.source_text = text;
        state.raw = None;
        state.enhanced = None;
        state.compiled = false;
        state.last_compiled_at = 0;
        state.epoch += 1;
    }

    /// Record a raw binary produced by the compiler
    pub fn compiled(&self, code: Vec<u8>) {
        self.store_raw(code.into(), None);
    }

    /// Store a raw binary unless the source was refreshed since `expected_epoch`
    fn store_raw(&self, raw: Binary, expected_epoch: Option<u64>) -> bool {
        let last_modified = self.source.last_modified();
        let mut state = self.state.write();
        if expected_epoch.is_some_and(|epoch| epoch != state.epoch) {
            return false;
        }
        state.raw = Some(raw);
        state.enhanced = None;
        state.compiled = true;
        state.last_compiled_at = last_modified;
        true
    }

    /// Compile this unit alone. On failure the artifact is left untouched.
    ///
    /// A refresh that lands while the compiler runs makes the output stale;
    /// it is discarded and reported as an error.
    pub fn compile(&self, compiler: &dyn Compiler) -> Result<Binary, CompileError> {
        let epoch = self.epoch();
        let start = Instant::now();
        let names = BTreeSet::from([self.name.clone()]);
        let mut produced = compiler.compile(&names)?;

        trace!(
            "{}ms to compile unit {}",
            start.elapsed().as_millis(),
            self.name
        );

        let code = produced
            .remove(&self.name)
            .ok_or_else(|| CompileError::new(&self.name, "compiler produced no output"))?;
        let raw: Binary = code.into();
        if !self.store_raw(raw.clone(), Some(epoch)) {
            return Err(CompileError::new(
                &self.name,
                "source changed while compiling",
            ));
        }
        Ok(raw)
    }

    /// Run the enhancement pipeline over the raw binary.
    ///
    /// The final binary is only recorded if the raw binary it was computed
    /// from is still current when the pipeline finishes.
    pub fn enhance(&self, pipeline: &EnhancementPipeline) -> Result<Enhancement, EnhanceError> {
        let (raw, epoch) = {
            let state = self.state.read();
            (state.raw.clone(), state.epoch)
        };
        let raw = raw.ok_or_else(|| self.input_error("unit has not been compiled"))?;

        if !self.is_unit() {
            let binary = pipeline.passthrough(&self.name, &raw);
            let mut state = self.state.write();
            if !is_current(&state, epoch, &raw) {
                return Err(self.input_error("source changed during enhancement"));
            }
            state.enhanced = Some(binary.clone());
            return Ok(Enhancement {
                binary,
                bootstrap_skipped: false,
                signature: None,
            });
        }

        let output = pipeline.enhance(&self.name, &raw)?;

        let mut state = self.state.write();
        if !is_current(&state, epoch, &raw) {
            return Err(self.input_error("source changed during enhancement"));
        }
        state.enhanced = Some(output.binary.clone());
        let signature = output.checksum.map(|current| {
            let previous = state.signature_checksum.replace(current);
            SignatureChange { previous, current }
        });

        Ok(Enhancement {
            binary: output.binary,
            bootstrap_skipped: output.bootstrap_skipped,
            signature,
        })
    }

    fn input_error(&self, message: &str) -> EnhanceError {
        EnhanceError {
            unit: self.name.clone(),
            stage: INPUT_STAGE.to_string(),
            message: message.to_string(),
        }
    }

    /// Record the runtime type the loader produced
    pub fn define(&self, loaded: Arc<LoadedType>) {
        self.state.write().loaded = Some(loaded);
    }

    /// Record the runtime type loaded from `binary`, unless the final binary
    /// was replaced in the meantime. Returns whether it was recorded.
    pub fn define_from(&self, binary: &Binary, loaded: Arc<LoadedType>) -> bool {
        let mut state = self.state.write();
        match &state.enhanced {
            Some(current) if Arc::ptr_eq(current, binary) => {
                state.loaded = Some(loaded);
                true
            }
            _ => false,
        }
    }

    /// Drop the runtime type without touching compiled products
    pub fn uncompile(&self) {
        self.state.write().loaded = None;
    }
}

fn is_current(state: &ArtifactState, epoch: u64, raw: &Binary) -> bool {
    state.epoch == epoch && state.raw.as_ref().is_some_and(|r| Arc::ptr_eq(r, raw))
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (compiled:{})", self.name, self.is_compiled())
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Artifact")
            .field("name", &self.name)
            .field("source", &self.source.location())
            .field("compiled", &state.compiled)
            .field("last_compiled_at", &state.last_compiled_at)
            .field("raw_len", &state.raw.as_ref().map(|b| b.len()))
            .field("enhanced_len", &state.enhanced.as_ref().map(|b| b.len()))
            .field("loaded", &state.loaded.as_ref().map(|t| t.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CompiledUnits;
    use crate::locator::{MemoryLocator, UnitLocator};

    struct FixedCompiler(Result<CompiledUnits, CompileError>);

    impl Compiler for FixedCompiler {
        fn compile(&self, _names: &BTreeSet<String>) -> Result<CompiledUnits, CompileError> {
            self.0.clone()
        }
    }

    /// Runs `during` inside the compiler call, then reports `output`
    struct Interleaved<F> {
        during: F,
        output: CompiledUnits,
    }

    impl<F: Fn() + Send + Sync> Compiler for Interleaved<F> {
        fn compile(&self, _names: &BTreeSet<String>) -> Result<CompiledUnits, CompileError> {
            (self.during)();
            Ok(self.output.clone())
        }
    }

    fn make(name: &str) -> (Artifact, Arc<crate::locator::MemorySource>) {
        let locator = MemoryLocator::new();
        let source = locator.insert(UnitName::new(name).enclosing(), "unit body", 42);
        let handle = locator.resolve(name).unwrap();
        (Artifact::new(name, handle), source)
    }

    #[test]
    fn test_new_reads_source() {
        let (artifact, _) = make("app.Widget");
        assert_eq!(artifact.source_text().as_deref(), Some("unit body"));
        assert_eq!(artifact.source().location(), "memory://app.Widget");
        assert_eq!(artifact.stage(), Stage::Created);
        assert_eq!(artifact.last_compiled_at(), 0);
        assert!(artifact.is_stale());
    }

    #[test]
    fn test_compiled_then_refresh_resets() {
        let (artifact, source) = make("app.Widget");
        artifact.compiled(vec![1, 2, 3]);
        assert!(artifact.is_compiled());
        assert_eq!(artifact.last_compiled_at(), 42);
        assert_eq!(artifact.stage(), Stage::Compiled);
        assert!(!artifact.is_stale());

        source.update("new body", 43);
        assert!(artifact.is_stale());
        artifact.refresh();

        assert_eq!(artifact.name(), "app.Widget");
        assert!(!artifact.is_compiled());
        assert_eq!(artifact.raw_binary(), None);
        assert_eq!(artifact.enhanced_binary(), None);
        assert_eq!(artifact.last_compiled_at(), 0);
        assert_eq!(artifact.source_text().as_deref(), Some("new body"));
    }

    #[test]
    fn test_compile_failure_leaves_state() {
        let (artifact, _) = make("app.Widget");
        artifact.compiled(vec![9]);

        let compiler = FixedCompiler(Err(CompileError::new("app.Widget", "boom").at_line(3)));
        let err = artifact.compile(&compiler).unwrap_err();
        assert_eq!(err.line, Some(3));
        assert!(artifact.is_compiled());
        assert_eq!(artifact.raw_binary().as_deref(), Some(&[9u8][..]));
    }

    #[test]
    fn test_compile_without_output_is_an_error() {
        let (artifact, _) = make("app.Widget");
        let compiler = FixedCompiler(Ok(CompiledUnits::from([(
            "app.Other".to_string(),
            vec![1],
        )])));
        let err = artifact.compile(&compiler).unwrap_err();
        assert_eq!(err.unit, "app.Widget");
        assert!(!artifact.is_compiled());
    }

    #[test]
    fn test_compile_records_raw_binary() {
        let (artifact, _) = make("app.Widget");
        let compiler = FixedCompiler(Ok(CompiledUnits::from([(
            "app.Widget".to_string(),
            vec![7, 7],
        )])));
        let raw = artifact.compile(&compiler).unwrap();
        assert_eq!(&raw[..], &[7u8, 7]);
        assert_eq!(artifact.raw_binary(), Some(raw));
    }

    #[test]
    fn test_compile_output_is_dropped_after_concurrent_refresh() {
        let (artifact, source) = make("app.Widget");
        let compiler = Interleaved {
            during: || {
                source.update("edited body", 43);
                artifact.refresh();
            },
            output: CompiledUnits::from([("app.Widget".to_string(), vec![1])]),
        };

        let err = artifact.compile(&compiler).unwrap_err();
        assert_eq!(err.unit, "app.Widget");
        assert!(!artifact.is_compiled());
        assert_eq!(artifact.raw_binary(), None);
        assert_eq!(artifact.source_text().as_deref(), Some("edited body"));
        assert_eq!(artifact.epoch(), 2);
    }

    #[test]
    fn test_define_from_ignores_replaced_binary() {
        let (artifact, _) = make("app.Widget");
        let loaded = Arc::new(LoadedType::new("app.Widget", 1, Default::default()));
        let stale: Binary = vec![1u8].into();
        assert!(!artifact.define_from(&stale, loaded));
        assert_eq!(artifact.loaded_type(), None);
    }

    #[test]
    fn test_uncompile_drops_loaded_type_only() {
        let (artifact, _) = make("app.Widget");
        artifact.compiled(vec![1]);
        artifact.define(Arc::new(LoadedType::new(
            "app.Widget",
            1,
            Default::default(),
        )));
        assert!(artifact.is_definable());
        assert_eq!(artifact.stage(), Stage::Loaded);

        artifact.uncompile();
        assert!(!artifact.is_definable());
        assert!(artifact.is_compiled());
        assert!(artifact.raw_binary().is_some());
    }

    #[test]
    fn test_naming_helpers() {
        let (artifact, _) = make("app.models.Widget");
        assert_eq!(artifact.package(), "app.models");
        assert!(artifact.is_unit());
        assert_eq!(artifact.to_string(), "app.models.Widget (compiled:false)");

        let (descriptor, _) = make("app.models.package-info");
        assert!(!descriptor.is_unit());
    }
}
