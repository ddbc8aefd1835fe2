//! File system watcher for plugin packages
//!
//! Translates raw `notify` events into created/changed/deleted notifications
//! for files carrying the package extension.

use std::path::{Path, PathBuf};
use std::time::Instant;

use hotswap_kernel::config::ReloaderConfig;
use notify::{
    Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
    event::{CreateKind, ModifyKind, RenameMode},
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Watch event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    /// Package file appeared, including by rename
    Created,
    /// Package contents were rewritten in place
    Changed,
    /// Package file removed or renamed away
    Deleted,
}

/// Watch event
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: PathBuf,
    pub timestamp: Instant,
}

impl WatchEvent {
    pub fn new(kind: WatchEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            timestamp: Instant::now(),
        }
    }

    /// The file name, if it is valid UTF-8
    pub fn filename(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

/// Watch configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    /// Package extension, without the dot
    pub extension: String,
    /// Whether to watch subdirectories
    pub recursive: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            extension: hotswap_kernel::config::DEFAULT_EXTENSION.to_string(),
            recursive: false,
        }
    }
}

impl From<&ReloaderConfig> for WatchConfig {
    fn from(config: &ReloaderConfig) -> Self {
        Self {
            extension: config.extension.trim_start_matches('.').to_string(),
            recursive: config.recursive,
        }
    }
}

impl WatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extension(mut self, ext: &str) -> Self {
        self.extension = ext.trim_start_matches('.').to_string();
        self
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Check if a path carries the package extension
    pub fn should_watch(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension))
    }

    fn mode(&self) -> RecursiveMode {
        if self.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        }
    }
}

/// Map one raw notification to package events.
///
/// Paths without the package extension and event kinds that say nothing
/// about file contents (metadata, access) produce nothing.
pub fn classify(event: &Event, config: &WatchConfig) -> Vec<WatchEvent> {
    let tagged: Vec<(WatchEventKind, &PathBuf)> = match event.kind {
        EventKind::Create(CreateKind::File) | EventKind::Create(CreateKind::Any) => event
            .paths
            .iter()
            .map(|p| (WatchEventKind::Created, p))
            .collect(),
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => event
            .paths
            .iter()
            .map(|p| (WatchEventKind::Changed, p))
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event
            .paths
            .iter()
            .map(|p| (WatchEventKind::Created, p))
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => event
            .paths
            .iter()
            .map(|p| (WatchEventKind::Deleted, p))
            .collect(),
        // paths = [from, to]
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
            [from, to] => vec![(WatchEventKind::Deleted, from), (WatchEventKind::Created, to)],
            _ => Vec::new(),
        },
        // Backends that cannot tell the direction of a rename.
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .map(|p| {
                if p.exists() {
                    (WatchEventKind::Created, p)
                } else {
                    (WatchEventKind::Deleted, p)
                }
            })
            .collect(),
        EventKind::Remove(_) => event
            .paths
            .iter()
            .map(|p| (WatchEventKind::Deleted, p))
            .collect(),
        _ => Vec::new(),
    };

    tagged
        .into_iter()
        .filter(|(_, path)| config.should_watch(path))
        .map(|(kind, path)| WatchEvent::new(kind, path.clone()))
        .collect()
}

/// Plugin package watcher
pub struct PluginWatcher {
    watch_paths: Vec<PathBuf>,
    config: WatchConfig,
    event_tx: mpsc::Sender<WatchEvent>,
    /// Taken once by the consumer
    event_rx: Option<mpsc::Receiver<WatchEvent>>,
    watcher: Option<RecommendedWatcher>,
}

impl PluginWatcher {
    pub fn new(config: WatchConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(1024);

        Self {
            watch_paths: Vec::new(),
            config,
            event_tx,
            event_rx: Some(event_rx),
            watcher: None,
        }
    }

    /// Take the event receiver (can only be called once)
    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<WatchEvent>> {
        self.event_rx.take()
    }

    /// Add a directory to watch. Missing directories are skipped with a warning.
    pub fn watch<P: AsRef<Path>>(&mut self, path: P) -> Result<(), notify::Error> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            warn!("Watch path does not exist: {:?}", path);
            return Ok(());
        }

        info!("Adding watch path: {:?}", path);
        if !self.watch_paths.contains(&path) {
            self.watch_paths.push(path.clone());
        }

        if let Some(ref mut watcher) = self.watcher {
            watcher.watch(&path, self.config.mode())?;
        }

        Ok(())
    }

    /// Start delivering events for every tracked directory
    pub fn start(&mut self) -> Result<(), notify::Error> {
        info!("Starting plugin watcher");

        let event_tx = self.event_tx.clone();
        let config = self.config.clone();

        // Runs on the notify backend thread, outside any runtime.
        let mut watcher = notify::recommended_watcher(move |result: Result<Event, notify::Error>| {
            match result {
                Ok(event) => {
                    for evt in classify(&event, &config) {
                        debug!("Watch event: {:?}", evt);
                        if event_tx.blocking_send(evt).is_err() {
                            debug!("Watch event receiver dropped");
                            return;
                        }
                    }
                }
                Err(e) => warn!("Watch error: {}", e),
            }
        })?;

        let mode = self.config.mode();
        for path in &self.watch_paths {
            watcher.watch(path, mode)?;
        }

        self.watcher = Some(watcher);
        Ok(())
    }

    /// Stop watching. Tracked paths are kept for a later `start`.
    pub fn stop(&mut self) {
        if self.watcher.take().is_some() {
            info!("Stopping plugin watcher");
        }
    }

    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }

    pub fn watched_paths(&self) -> &[PathBuf] {
        &self.watch_paths
    }
}
