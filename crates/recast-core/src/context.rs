use std::sync::Arc;

use crate::compiler::Compiler;
use crate::loader::RuntimeLoader;
use crate::locator::UnitLocator;
use crate::pipeline::EnhancementPipeline;

/// The collaborators a cache works against, passed in explicitly
#[derive(Clone)]
pub struct Context {
    locator: Arc<dyn UnitLocator>,
    compiler: Arc<dyn Compiler>,
    loader: Arc<dyn RuntimeLoader>,
    pipeline: Arc<EnhancementPipeline>,
}

impl Context {
    pub fn new(
        locator: Arc<dyn UnitLocator>,
        compiler: Arc<dyn Compiler>,
        loader: Arc<dyn RuntimeLoader>,
        pipeline: Arc<EnhancementPipeline>,
    ) -> Self {
        Self {
            locator,
            compiler,
            loader,
            pipeline,
        }
    }

    pub fn locator(&self) -> &dyn UnitLocator {
        self.locator.as_ref()
    }

    pub fn compiler(&self) -> &dyn Compiler {
        self.compiler.as_ref()
    }

    pub fn loader(&self) -> &dyn RuntimeLoader {
        self.loader.as_ref()
    }

    pub fn pipeline(&self) -> &EnhancementPipeline {
        &self.pipeline
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}
