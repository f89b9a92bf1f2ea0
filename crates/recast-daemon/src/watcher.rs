//! Source file watcher with debouncing

use anyhow::{Context, Result};
use dashmap::DashMap;
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ReloadConfig;

/// File change event
#[derive(Debug, Clone)]
pub struct FileChange {
    pub path: PathBuf,
    pub kind: FileChangeKind,
    pub timestamp: Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FileChangeKind {
    Created,
    Modified,
    Removed,
    Renamed { from: PathBuf, to: PathBuf },
}

/// Configuration for the source watcher
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Debounce duration to avoid multiple events for the same file
    pub debounce_duration: Duration,
    /// File extensions to watch
    pub extensions: Vec<String>,
    /// Directories to ignore
    pub ignore_dirs: Vec<String>,
    /// Maximum events to buffer
    pub buffer_size: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_duration: Duration::from_millis(500),
            extensions: vec!["src".to_string()],
            ignore_dirs: vec![
                ".git".to_string(),
                "target".to_string(),
                "precompiled".to_string(),
            ],
            buffer_size: 1000,
        }
    }
}

impl WatcherConfig {
    pub fn for_sources(extension: impl Into<String>, debounce_duration: Duration) -> Self {
        Self {
            debounce_duration,
            extensions: vec![extension.into()],
            ..Self::default()
        }
    }
}

/// Watches source roots and turns notify events into [`FileChange`]s
pub struct SourceWatcher {
    watcher: RecommendedWatcher,
    rx: mpsc::Receiver<FileChange>,
}

impl SourceWatcher {
    pub fn new(config: WatcherConfig) -> Result<Self> {
        let (tx, rx) = mpsc::channel(config.buffer_size);
        let debounce_map = DashMap::new();

        let watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => handle_event(event, &tx, &debounce_map, &config),
                Err(e) => warn!("Watch error: {}", e),
            },
            Config::default(),
        )?;

        Ok(Self { watcher, rx })
    }

    /// Watch every source root named in `config`
    pub fn for_config(config: &ReloadConfig) -> Result<Self> {
        let mut watcher = Self::new(WatcherConfig::for_sources(
            config.source_extension.clone(),
            config.debounce(),
        ))?;
        for root in &config.source_roots {
            watcher.watch(root)?;
        }
        Ok(watcher)
    }

    /// Add a path to watch
    pub fn watch(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        info!("Watching path: {:?}", path);

        self.watcher
            .watch(path, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch path: {:?}", path))?;

        Ok(())
    }

    /// Stop watching a path
    pub fn unwatch(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        info!("Unwatching path: {:?}", path);

        self.watcher
            .unwatch(path)
            .with_context(|| format!("Failed to unwatch path: {:?}", path))?;

        Ok(())
    }

    /// Get the next file change event
    pub async fn next_change(&mut self) -> Option<FileChange> {
        self.rx.recv().await
    }
}

/// Convert a notify event into zero or more changes
fn handle_event(
    event: Event,
    tx: &mpsc::Sender<FileChange>,
    debounce_map: &DashMap<PathBuf, Instant>,
    config: &WatcherConfig,
) {
    if let EventKind::Modify(ModifyKind::Name(RenameMode::Both)) = event.kind {
        if let [from, to] = event.paths.as_slice() {
            if should_ignore(from, config) && should_ignore(to, config) {
                return;
            }
            send(
                tx,
                to.clone(),
                FileChangeKind::Renamed {
                    from: from.clone(),
                    to: to.clone(),
                },
            );
            return;
        }
    }

    let kind = match event.kind {
        EventKind::Create(_) => FileChangeKind::Created,
        // Split renames arrive as a removal of the old name and a modification of the new one
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => FileChangeKind::Removed,
        EventKind::Modify(_) => FileChangeKind::Modified,
        EventKind::Remove(_) => FileChangeKind::Removed,
        _ => return,
    };

    for path in &event.paths {
        if should_ignore(path, config) {
            continue;
        }

        // Removals are never debounced so a quick edit-then-delete is not lost
        if kind != FileChangeKind::Removed
            && should_debounce(path, debounce_map, config.debounce_duration)
        {
            continue;
        }

        send(tx, path.clone(), kind.clone());
    }
}

fn send(tx: &mpsc::Sender<FileChange>, path: PathBuf, kind: FileChangeKind) {
    debug!("{:?} {:?}", kind, path);
    let change = FileChange {
        path,
        kind,
        timestamp: Instant::now(),
    };

    if let Err(e) = tx.try_send(change) {
        warn!("Failed to send file change event: {}", e);
    }
}

/// Check if a path should be ignored
fn should_ignore(path: &Path, config: &WatcherConfig) -> bool {
    if path
        .components()
        .any(|c| config.ignore_dirs.iter().any(|d| c.as_os_str() == d.as_str()))
    {
        return true;
    }

    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => !config.extensions.iter().any(|e| e == ext),
        None => true,
    }
}

/// Check if we should debounce this event
fn should_debounce(
    path: &Path,
    debounce_map: &DashMap<PathBuf, Instant>,
    duration: Duration,
) -> bool {
    let now = Instant::now();

    if let Some(last_seen) = debounce_map.get(path) {
        if now.duration_since(*last_seen) < duration {
            return true;
        }
    }

    // Entries older than the window can no longer suppress anything
    debounce_map.retain(|_, last_seen| now.duration_since(*last_seen) < duration);
    debounce_map.insert(path.to_path_buf(), now);
    false
}
