//! Reload orchestration
//!
//! [`ReloadOrchestrator`] turns package notifications into install steps.
//! [`HotReloadService`] owns the watcher and the dispatch task for as long as
//! the host keeps the reloader activated.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use error_stack::Report;
use hotswap_kernel::ReloadEvent;
use hotswap_kernel::config::ReloaderConfig;
use tokio::io::AsyncRead;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::error::{IntoReloadReport, ReloadError, ReloadReport};
use super::installer::{HostBindings, InstallOutcome, Installer};
use super::planner::StopPlanner;
use super::watcher::{PluginWatcher, WatchConfig, WatchEvent, WatchEventKind};

/// Entry point for package notifications.
pub struct ReloadOrchestrator {
    installer: Installer,
    watch_config: WatchConfig,
    event_tx: broadcast::Sender<ReloadEvent>,
}

impl ReloadOrchestrator {
    pub fn new(host: HostBindings, config: &ReloaderConfig) -> Self {
        let (event_tx, _) = broadcast::channel(1024);

        let mut installer = Installer::new(
            host,
            StopPlanner::new(config.stop_scope),
            event_tx.clone(),
        );
        if let Some((username, password)) = config.credentials() {
            installer = installer.with_credentials(username, password);
        }

        Self {
            installer,
            watch_config: WatchConfig::from(config),
            event_tx,
        }
    }

    /// Subscribe to reload events
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.event_tx.subscribe()
    }

    pub fn watch_config(&self) -> &WatchConfig {
        &self.watch_config
    }

    /// Whether `path` names a package this orchestrator installs
    pub fn accepts(&self, path: &Path) -> bool {
        self.watch_config.should_watch(path)
    }

    /// React to one watch notification.
    ///
    /// Returns `None` when the event is ignored: deletions and files without
    /// the package extension.
    pub async fn on_package_event(&self, event: &WatchEvent) -> Option<InstallOutcome> {
        if event.kind == WatchEventKind::Deleted {
            debug!("Ignoring deletion of {:?}", event.path);
            return None;
        }
        if !self.accepts(&event.path) {
            debug!("Ignoring non-package file {:?}", event.path);
            return None;
        }
        let Some(filename) = event.filename() else {
            warn!("Ignoring package with non UTF-8 name {:?}", event.path);
            return None;
        };

        let file = match tokio::fs::File::open(&event.path).await {
            Ok(file) => file,
            Err(e) => {
                error!("Failed to open plugin package {:?}: {}", event.path, e);
                let _ = self.event_tx.send(ReloadEvent::ReloadStarted {
                    filename: filename.to_string(),
                });
                let _ = self.event_tx.send(ReloadEvent::ReloadFailed {
                    filename: filename.to_string(),
                    error: e.to_string(),
                });
                return Some(InstallOutcome::RuntimeFailed(e.to_string()));
            }
        };

        Some(self.install(file, filename).await)
    }

    /// Install a package from any byte stream.
    pub async fn install<R>(&self, package: R, filename: &str) -> InstallOutcome
    where
        R: AsyncRead + Unpin + Send,
    {
        self.installer.install(package, filename).await
    }
}

/// Activation-scoped hot-reload service.
///
/// Created when the host activates the reloader and consumed by
/// [`HotReloadService::deactivate`]. With no watch paths configured the
/// service is inert: no watcher and no dispatch task.
pub struct HotReloadService {
    orchestrator: Arc<ReloadOrchestrator>,
    watcher: Option<PluginWatcher>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl HotReloadService {
    /// Start watching the configured directories.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn activate(
        config: &ReloaderConfig,
        orchestrator: Arc<ReloadOrchestrator>,
    ) -> ReloadReport<Self> {
        let paths = config.watch_paths();
        if paths.is_empty() {
            info!("No plugin watch paths configured, hot reload disabled");
            return Ok(Self {
                orchestrator,
                watcher: None,
                shutdown_tx: None,
                dispatcher: None,
            });
        }

        let mut watcher = PluginWatcher::new(orchestrator.watch_config().clone());
        for path in &paths {
            watcher.watch(path).map_err(|e| {
                Report::new(ReloadError::from(e)).attach(format!("while watching {}", path.display()))
            })?;
        }

        let events = watcher
            .take_event_receiver()
            .ok_or_else(|| ReloadError::Internal("watch receiver already taken".into()))
            .into_report()?;
        watcher
            .start()
            .map_err(|e| Report::new(ReloadError::from(e)).attach("while starting plugin watcher"))?;

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let dispatcher = tokio::spawn(dispatch(
            orchestrator.clone(),
            events,
            shutdown_rx,
            config.debounce(),
        ));

        info!(
            "Hot reload active for {} path(s), extension .{}",
            watcher.watched_paths().len(),
            orchestrator.watch_config().extension
        );

        Ok(Self {
            orchestrator,
            watcher: Some(watcher),
            shutdown_tx: Some(shutdown_tx),
            dispatcher: Some(dispatcher),
        })
    }

    /// Whether a watcher is running
    pub fn is_active(&self) -> bool {
        self.watcher.as_ref().is_some_and(PluginWatcher::is_running)
    }

    pub fn orchestrator(&self) -> &Arc<ReloadOrchestrator> {
        &self.orchestrator
    }

    pub fn watched_paths(&self) -> &[PathBuf] {
        self.watcher
            .as_ref()
            .map(PluginWatcher::watched_paths)
            .unwrap_or_default()
    }

    /// Tear down the watcher and wait for the dispatch task.
    ///
    /// An install already in progress runs to completion; queued events are
    /// dropped.
    pub async fn deactivate(mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }

        if let Some(handle) = self.dispatcher.take() {
            if let Err(e) = handle.await {
                warn!("Reload dispatcher ended abnormally: {}", e);
            }
        }

        info!("Hot reload deactivated");
    }
}

/// Serial dispatch loop with a trailing per-path debounce.
///
/// A package is installed once no new event for it has arrived within
/// `debounce`. Installs never overlap.
async fn dispatch(
    orchestrator: Arc<ReloadOrchestrator>,
    mut events: mpsc::Receiver<WatchEvent>,
    mut shutdown_rx: mpsc::Receiver<()>,
    debounce: Duration,
) {
    let mut ticker = tokio::time::interval(debounce.clamp(Duration::from_millis(10), Duration::from_millis(100)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pending: HashMap<PathBuf, (WatchEvent, Instant)> = HashMap::new();

    loop {
        tokio::select! {
            received = events.recv() => {
                let Some(event) = received else {
                    debug!("Watch event channel closed");
                    return;
                };

                if event.kind == WatchEventKind::Deleted {
                    if pending.remove(&event.path).is_some() {
                        debug!("Dropped pending install of deleted {:?}", event.path);
                    }
                    continue;
                }

                debug!("Queued {:?} for {:?}", event.kind, event.path);
                let due = Instant::now() + debounce;
                pending.insert(event.path.clone(), (event, due));
            }

            _ = ticker.tick() => {
                let now = Instant::now();
                let ready: Vec<PathBuf> = pending
                    .iter()
                    .filter(|(_, (_, due))| *due <= now)
                    .map(|(path, _)| path.clone())
                    .collect();

                for path in ready {
                    let Some((event, _)) = pending.remove(&path) else {
                        continue;
                    };
                    if let Some(outcome) = orchestrator.on_package_event(&event).await {
                        debug!(
                            "Install of {:?} finished {:?} after the change: installed={}",
                            path,
                            event.timestamp.elapsed(),
                            outcome.is_installed()
                        );
                    }
                }
            }

            _ = shutdown_rx.recv() => {
                info!("Reload dispatcher shutting down");
                return;
            }
        }
    }
}
