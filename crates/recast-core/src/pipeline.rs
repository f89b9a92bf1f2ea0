//! Enhancement pipeline: raw binary -> final binary
//!
//! ## Architecture
//! ```text
//! raw --peek--> extension? --yes--> final = raw
//!                   |
//!                   no (or peek failed)
//!                   v
//!        stage 1 -> stage 2 -> ... -> stage N -> final
//! ```
//!
//! The stages are themselves contributed by extensions, so a unit that
//! *defines* an extension must load unmodified: it is needed to assemble the
//! pipeline that would otherwise transform it. The bootstrap guard detects such
//! units with a throwaway structural peek that never touches the runtime or the
//! cache.
//!
//! A peek failure is treated as "not an extension" and the unit is enhanced.
//! This fail-open behaviour is kept deliberately pending product confirmation.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error};

use crate::error::{EnhanceError, PeekError, StageError};
use crate::export::ExportHook;
use crate::fingerprint::SignatureChecksum;

/// Shared immutable binary buffer
pub type Binary = Arc<[u8]>;

/// Stage name reported when the bootstrap guard cannot run at all
pub const INPUT_STAGE: &str = "input";

/// One deterministic binary-to-binary transform
pub trait EnhanceStage: Send + Sync {
    /// Stable name used in diagnostics
    fn name(&self) -> &str;

    /// Transform `input` for `unit`. Must be free of side effects outside the buffer.
    fn apply(&self, unit: &str, input: Vec<u8>) -> Result<Vec<u8>, StageError>;
}

/// Structural facts about a binary, extracted without loading it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitOutline {
    /// Unit name as declared in the binary
    pub name: String,
    /// Directly declared supertypes
    pub supertypes: Vec<String>,
    /// Public signature lines, input to the signature checksum
    pub signatures: Vec<String>,
}

impl UnitOutline {
    pub fn extends(&self, base: &str) -> bool {
        self.supertypes.iter().any(|s| s == base)
    }
}

/// Isolated structural parser used by the bootstrap guard
pub trait BinaryInspector: Send + Sync {
    /// Parse just enough of `binary` to describe it. Must not register anything anywhere.
    fn peek(&self, binary: &[u8]) -> Result<UnitOutline, PeekError>;
}

/// Result of running the pipeline over one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutput {
    pub binary: Binary,
    /// The bootstrap guard fired and no stage ran
    pub bootstrap_skipped: bool,
    /// Present whenever the structural peek succeeded
    pub checksum: Option<SignatureChecksum>,
}

/// Ordered, fixed sequence of enhancement stages plus the bootstrap guard
pub struct EnhancementPipeline {
    extension_base: String,
    inspector: Arc<dyn BinaryInspector>,
    stages: Vec<Arc<dyn EnhanceStage>>,
    export: Option<ExportHook>,
}

impl EnhancementPipeline {
    pub fn builder(
        extension_base: impl Into<String>,
        inspector: Arc<dyn BinaryInspector>,
    ) -> PipelineBuilder {
        PipelineBuilder {
            pipeline: Self {
                extension_base: extension_base.into(),
                inspector,
                stages: Vec::new(),
                export: None,
            },
        }
    }

    pub fn extension_base(&self) -> &str {
        &self.extension_base
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn export_hook(&self) -> Option<&ExportHook> {
        self.export.as_ref()
    }

    /// Run the bootstrap guard and, unless it fires, every stage in order
    pub fn enhance(&self, unit: &str, raw: &Binary) -> Result<PipelineOutput, EnhanceError> {
        let outline = match self.inspector.peek(raw) {
            Ok(outline) => Some(outline),
            Err(e) => {
                debug!("{}: {}; enhancing as a regular unit", unit, e);
                None
            }
        };
        let checksum = outline
            .as_ref()
            .map(|o| SignatureChecksum::of(&o.signatures));

        if outline
            .as_ref()
            .is_some_and(|o| o.extends(&self.extension_base))
        {
            debug!(
                "{} extends {}, loading it unenhanced",
                unit, self.extension_base
            );
            self.export(unit, raw);
            return Ok(PipelineOutput {
                binary: raw.clone(),
                bootstrap_skipped: true,
                checksum,
            });
        }

        let mut buffer = raw.to_vec();
        for stage in &self.stages {
            buffer = stage.apply(unit, buffer).map_err(|e| EnhanceError {
                unit: unit.to_string(),
                stage: stage.name().to_string(),
                message: e.message,
            })?;
        }

        let binary: Binary = buffer.into();
        self.export(unit, &binary);
        Ok(PipelineOutput {
            binary,
            bootstrap_skipped: false,
            checksum,
        })
    }

    /// Export a binary that bypasses the stages entirely
    pub fn passthrough(&self, unit: &str, raw: &Binary) -> Binary {
        self.export(unit, raw);
        raw.clone()
    }

    fn export(&self, unit: &str, binary: &[u8]) {
        if let Some(hook) = &self.export {
            if let Err(e) = hook.write(unit, binary) {
                error!("{}: {}", e, e.source);
            }
        }
    }
}

impl fmt::Debug for EnhancementPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnhancementPipeline")
            .field("extension_base", &self.extension_base)
            .field("stages", &self.stage_names())
            .field("export", &self.export)
            .finish()
    }
}

/// Assembles a pipeline; stage order is the order of `stage` calls
pub struct PipelineBuilder {
    pipeline: EnhancementPipeline,
}

impl PipelineBuilder {
    /// Append a stage
    pub fn stage(mut self, stage: Arc<dyn EnhanceStage>) -> Self {
        self.pipeline.stages.push(stage);
        self
    }

    /// Append every stage an extension contributes, in its order
    pub fn stages(mut self, stages: impl IntoIterator<Item = Arc<dyn EnhanceStage>>) -> Self {
        self.pipeline.stages.extend(stages);
        self
    }

    /// Also write every final binary through this hook
    pub fn export(mut self, hook: ExportHook) -> Self {
        self.pipeline.export = Some(hook);
        self
    }

    pub fn build(self) -> EnhancementPipeline {
        self.pipeline
    }
}
