//! Development-loop driver for recast
//!
//! Watches unit source roots and pushes every change through the artifact
//! cache: refresh, compile, enhance and load, or drop units whose source went
//! away.

pub mod config;
pub mod logging;
pub mod paths;
pub mod reloader;
pub mod watcher;

pub use config::{ExportConfig, ReloadConfig};
pub use logging::init_tracing;
pub use paths::UnitPaths;
pub use reloader::{ReloadOutcome, Reloader};
pub use watcher::{FileChange, FileChangeKind, SourceWatcher, WatcherConfig};
