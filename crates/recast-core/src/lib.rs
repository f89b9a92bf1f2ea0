//! Incremental artifact cache and enhancement pipeline for hot reloading
//!
//! A long-running process keeps one [`Artifact`] per unit name in an
//! [`ArtifactCache`]: source text, raw compiled binary, enhanced final binary
//! and the runtime-loaded type. The compiler, source locator and runtime
//! loader are collaborators passed in through a [`Context`].

pub mod artifact;
pub mod cache;
pub mod compiler;
pub mod context;
pub mod error;
pub mod export;
pub mod fingerprint;
pub mod fqn;
pub mod loader;
pub mod locator;
pub mod pipeline;

pub use artifact::{Artifact, Enhancement, Stage};
pub use cache::ArtifactCache;
pub use compiler::{CompiledUnits, Compiler};
pub use context::Context;
pub use error::{CompileError, CoreError, EnhanceError, ExportError, LoadError, PeekError, StageError};
pub use export::ExportHook;
pub use fingerprint::{SignatureChange, SignatureChecksum};
pub use loader::{Capabilities, LoadedType, RuntimeLoader};
pub use locator::{FsLocator, MemoryLocator, SourceHandle, UnitLocator};
pub use pipeline::{
    Binary, BinaryInspector, EnhanceStage, EnhancementPipeline, PipelineBuilder, PipelineOutput,
    UnitOutline,
};
