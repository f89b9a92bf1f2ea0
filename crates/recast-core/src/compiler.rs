//! Compiler collaborator contract

use std::collections::{BTreeMap, BTreeSet};

use crate::error::CompileError;

/// Raw binaries produced by one compiler invocation, keyed by unit name.
///
/// A single request may yield more names than were asked for (nested units).
pub type CompiledUnits = BTreeMap<String, Vec<u8>>;

/// Turns unit sources into raw binaries
pub trait Compiler: Send + Sync {
    /// Compile the named units together. Blocks for the duration of compilation.
    fn compile(&self, names: &BTreeSet<String>) -> Result<CompiledUnits, CompileError>;
}
