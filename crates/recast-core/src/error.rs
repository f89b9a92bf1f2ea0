use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Structured compile failure reported by the compiler collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    /// Unit the diagnostic points at
    pub unit: String,
    /// 1-based source line, when the compiler knows it
    pub line: Option<u32>,
    pub message: String,
}

impl CompileError {
    pub fn new(unit: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            line: None,
            message: message.into(),
        }
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "compile error in {} at line {}: {}", self.unit, line, self.message),
            None => write!(f, "compile error in {}: {}", self.unit, self.message),
        }
    }
}

impl std::error::Error for CompileError {}

/// Failure of a single enhancement stage, before the pipeline attaches context
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct StageError {
    pub message: String,
}

impl StageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The structural peek could not make sense of a binary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("structural peek failed: {message}")]
pub struct PeekError {
    pub message: String,
}

impl PeekError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Enhancement of one unit aborted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("enhancing {unit} failed in stage `{stage}`: {message}")]
pub struct EnhanceError {
    pub unit: String,
    pub stage: String,
    pub message: String,
}

/// The runtime loader rejected a unit's final binary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("loading {unit} failed: {message}")]
pub struct LoadError {
    pub unit: String,
    pub message: String,
}

impl LoadError {
    pub fn new(unit: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            message: message.into(),
        }
    }
}

/// Writing an exported binary failed; logged by the pipeline, never propagated
#[derive(Error, Debug)]
#[error("failed to export {unit} to {path:?}")]
pub struct ExportError {
    pub unit: String,
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Enhance(#[from] EnhanceError),

    #[error(transparent)]
    Load(#[from] LoadError),
}

impl CoreError {
    /// The unit this error is about
    pub fn unit(&self) -> &str {
        match self {
            CoreError::Compile(e) => &e.unit,
            CoreError::Enhance(e) => &e.unit,
            CoreError::Load(e) => &e.unit,
        }
    }
}
