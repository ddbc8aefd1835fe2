//! Install step
//!
//! Replaces one plugin with the package it arrived in:
//!
//! 1. parse the package into a provisional descriptor
//! 2. stop the running dependents of the old version, then the old version
//!    itself, and unload it
//! 3. write the package into plugin storage
//! 4. load and start the new version
//! 5. restart the stopped dependents in dependency order
//! 6. refresh the web context once if anything asked for it
//! 7. bind deferred servlets and filters
//!
//! Every failure is caught at the step boundary and reported as an
//! [`InstallOutcome`]. Nothing is rolled back: an old version that was
//! unloaded stays unloaded if the new one fails to start.

use std::sync::Arc;
use std::time::{Duration, Instant};

use hotswap_kernel::{
    AuthContext, PackageError, PackageParser, PackageStore, PluginDescriptor, PluginLifecycle,
    PluginRegistry, PluginState, PluginVersion, RefreshSignature, ReloadEvent, StoredPackage,
    WebBridge,
};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::broadcast;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::error::{ReloadError, ReloadResult};
use super::planner::StopPlanner;
use super::refresh::RefreshDispatcher;
use super::session::PrivilegedSession;
use super::sorter;

/// The host collaborators an install drives.
#[derive(Clone)]
pub struct HostBindings {
    pub parser: Arc<dyn PackageParser>,
    pub store: Arc<dyn PackageStore>,
    pub registry: Arc<dyn PluginRegistry>,
    pub lifecycle: Arc<dyn PluginLifecycle>,
    pub web: Arc<dyn WebBridge>,
    pub auth: Arc<dyn AuthContext>,
}

/// Accumulates per-cycle flags across every plugin started in one install.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReloadOutcome {
    refresh_required: bool,
}

impl ReloadOutcome {
    /// Record whether a started plugin asked for a context refresh.
    pub fn record(&mut self, needs_refresh: bool) {
        self.refresh_required |= needs_refresh;
    }

    pub fn refresh_required(&self) -> bool {
        self.refresh_required
    }
}

/// What a successful install did.
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub plugin_id: String,
    pub version: PluginVersion,
    pub filename: String,
    pub package: StoredPackage,
    /// Whether a previous version was stopped and unloaded
    pub replaced: bool,
    /// Whether the new version reached the started state
    pub started: bool,
    /// Dependents stopped before the replacement, in stop order
    pub stopped: Vec<String>,
    /// Dependents started again afterwards, in start order
    pub restarted: Vec<String>,
    /// The refresh entry point used, if a refresh ran
    pub context_refresh: Option<RefreshSignature>,
    pub duration: Duration,
}

/// Result of one install step.
#[derive(Debug, Clone)]
pub enum InstallOutcome {
    Installed(InstallReport),
    /// The package could not be read; nothing was stopped or replaced
    ParseFailed(String),
    /// A host call failed; the cycle stopped where it was
    RuntimeFailed(String),
}

impl InstallOutcome {
    pub fn is_installed(&self) -> bool {
        matches!(self, InstallOutcome::Installed(_))
    }

    pub fn report(&self) -> Option<&InstallReport> {
        match self {
            InstallOutcome::Installed(report) => Some(report),
            _ => None,
        }
    }

    fn from_error(err: ReloadError) -> Self {
        match err {
            ReloadError::Package(e) => InstallOutcome::ParseFailed(e.to_string()),
            other => InstallOutcome::RuntimeFailed(other.to_string()),
        }
    }
}

/// Dependents taken down around a replacement.
#[derive(Debug, Default)]
struct StoppedDependents {
    /// Discovery order, host-cascaded plugins last
    affected: Vec<PluginDescriptor>,
    /// Ids in the order they were stopped
    stop_order: Vec<String>,
}

/// Runs install steps against one host.
pub struct Installer {
    host: HostBindings,
    planner: StopPlanner,
    refresh: RefreshDispatcher,
    credentials: Option<(String, String)>,
    events: broadcast::Sender<ReloadEvent>,
}

impl Installer {
    pub fn new(
        host: HostBindings,
        planner: StopPlanner,
        events: broadcast::Sender<ReloadEvent>,
    ) -> Self {
        Self {
            host,
            planner,
            refresh: RefreshDispatcher::new(),
            credentials: None,
            events,
        }
    }

    /// Authenticate each install session with these credentials.
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some((username.to_string(), password.to_string()));
        self
    }

    /// Install or upgrade the plugin contained in `package`.
    ///
    /// Never fails: errors are logged and returned as an outcome.
    pub async fn install<R>(&self, package: R, filename: &str) -> InstallOutcome
    where
        R: AsyncRead + Unpin + Send,
    {
        let span = info_span!("reload_cycle", cycle_id = %Uuid::now_v7(), filename);
        self.run(package, filename).instrument(span).await
    }

    async fn run<R>(&self, package: R, filename: &str) -> InstallOutcome
    where
        R: AsyncRead + Unpin + Send,
    {
        info!("Installing plugin package {}", filename);
        self.emit(ReloadEvent::ReloadStarted {
            filename: filename.to_string(),
        });
        let started_at = Instant::now();

        let result = self.privileged_install(package, filename, started_at).await;

        match result {
            Ok(report) => {
                info!(
                    plugin_id = %report.plugin_id,
                    "Finished installing plugin package {} in {:?}",
                    filename,
                    report.duration
                );
                self.emit(ReloadEvent::ReloadCompleted {
                    plugin_id: report.plugin_id.clone(),
                    filename: filename.to_string(),
                    restarted: report.restarted.clone(),
                    duration: report.duration,
                });
                InstallOutcome::Installed(report)
            }
            Err(e) => {
                error!("Failed to install plugin package {}: {}", filename, e);
                self.emit(ReloadEvent::ReloadFailed {
                    filename: filename.to_string(),
                    error: e.to_string(),
                });
                InstallOutcome::from_error(e)
            }
        }
    }

    async fn privileged_install<R>(
        &self,
        package: R,
        filename: &str,
        started_at: Instant,
    ) -> ReloadResult<InstallReport>
    where
        R: AsyncRead + Unpin + Send,
    {
        let credentials = self
            .credentials
            .as_ref()
            .map(|(user, pass)| (user.as_str(), pass.as_str()));
        let _session = PrivilegedSession::open(self.host.auth.as_ref(), credentials)?;

        self.apply(package, filename, started_at).await
    }

    async fn apply<R>(
        &self,
        mut package: R,
        filename: &str,
        started_at: Instant,
    ) -> ReloadResult<InstallReport>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut bytes = Vec::new();
        package
            .read_to_end(&mut bytes)
            .await
            .map_err(PackageError::from)?;
        drop(package);

        let incoming = self.host.parser.parse(&bytes)?;
        info!(
            plugin_id = %incoming.id,
            "Package {} contains {} v{}",
            filename,
            incoming.id,
            incoming.version
        );

        let existing = self.host.registry.get_by_id(&incoming.id).await;
        let stopped = match &existing {
            Some(existing) => self.stop_existing(existing).await?,
            None => StoppedDependents::default(),
        };

        let package = self.host.store.insert(&bytes, filename).await?;

        self.transition(&incoming.id, PluginState::Loading);
        let plugin = self
            .host
            .registry
            .load(&package.path)
            .await?
            .ok_or_else(|| ReloadError::NotLoaded(filename.to_string()))?;
        self.transition(&plugin.id, PluginState::Loaded);

        let mut outcome = ReloadOutcome::default();
        info!(plugin_id = %plugin.id, "Starting plugin {}", plugin.id);
        let started = self.start_plugin(&plugin, &mut outcome).await?;

        let mut restarted = Vec::new();
        if started {
            for dependent in sorter::startup_order_or_original(&stopped.affected) {
                info!(plugin_id = %dependent.id, "Starting dependent plugin {}", dependent.id);
                if self.start_plugin(&dependent, &mut outcome).await? {
                    restarted.push(dependent);
                }
            }
        } else if !stopped.affected.is_empty() {
            warn!(
                plugin_id = %plugin.id,
                "Plugin {} did not start; leaving {} dependent(s) stopped",
                plugin.id,
                stopped.affected.len()
            );
        }

        // Refresh was deferred so that it runs once for every plugin above.
        let context_refresh = if outcome.refresh_required() {
            let signature = self.refresh.refresh(self.host.web.as_ref()).await?;
            self.emit(ReloadEvent::ContextRefreshed { signature });
            Some(signature)
        } else {
            None
        };

        // Servlets and filters are not part of the deferred refresh.
        self.bind_web_resources(&plugin).await?;
        for dependent in &restarted {
            self.bind_web_resources(dependent).await?;
        }

        Ok(InstallReport {
            plugin_id: plugin.id,
            version: plugin.version,
            filename: filename.to_string(),
            package,
            replaced: existing.is_some(),
            started,
            stopped: stopped.stop_order,
            restarted: restarted.into_iter().map(|p| p.id).collect(),
            context_refresh,
            duration: started_at.elapsed(),
        })
    }

    /// Stop the running dependents of `existing`, then `existing` itself,
    /// and unload it.
    async fn stop_existing(&self, existing: &PluginDescriptor) -> ReloadResult<StoppedDependents> {
        let loaded = self.host.registry.loaded().await;
        let running: Vec<PluginDescriptor> = self
            .planner
            .plan(&existing.id, &loaded)
            .into_iter()
            .filter(|p| p.started)
            .collect();

        // Reverse startup order: a dependent goes down before what it needs.
        let mut stop_order = sorter::startup_order_or_original(&running);
        stop_order.reverse();

        for dependent in &stop_order {
            info!(plugin_id = %dependent.id, "Stopping dependent plugin {}", dependent.id);
            self.transition(&dependent.id, PluginState::Stopping);
            self.host.lifecycle.stop(dependent, false, false).await?;
            self.host.web.stop_module(dependent).await?;
            self.transition(&dependent.id, PluginState::Stopped);
        }

        info!(plugin_id = %existing.id, "Stopping existing plugin {}", existing.id);
        self.transition(&existing.id, PluginState::Stopping);
        let cascaded = self.host.lifecycle.stop(existing, false, true).await?;

        let mut stopped = StoppedDependents {
            stop_order: stop_order.into_iter().map(|p| p.id).collect(),
            affected: running,
        };
        for extra in cascaded {
            if extra.id == existing.id || stopped.affected.iter().any(|p| p.id == extra.id) {
                continue;
            }
            debug!(plugin_id = %extra.id, "Host also stopped dependent plugin {}", extra.id);
            self.host.web.stop_module(&extra).await?;
            self.transition(&extra.id, PluginState::Stopped);
            stopped.stop_order.push(extra.id.clone());
            stopped.affected.push(extra);
        }

        self.host.web.stop_module(existing).await?;
        self.host.registry.unload(existing).await?;
        self.transition(&existing.id, PluginState::Stopped);

        Ok(stopped)
    }

    /// Start one plugin and its web module, recording whether it needs a
    /// context refresh. Returns whether the plugin reached the started state.
    async fn start_plugin(
        &self,
        plugin: &PluginDescriptor,
        outcome: &mut ReloadOutcome,
    ) -> ReloadResult<bool> {
        self.transition(&plugin.id, PluginState::Starting);
        let started = self.host.lifecycle.start(plugin).await?;
        let needs_refresh = self.host.web.start_module(plugin).await?;
        outcome.record(needs_refresh);

        if started {
            self.transition(&plugin.id, PluginState::Started);
        } else {
            warn!(plugin_id = %plugin.id, "Plugin {} did not reach the started state", plugin.id);
            self.transition(&plugin.id, PluginState::Stopped);
        }
        Ok(started)
    }

    async fn bind_web_resources(&self, plugin: &PluginDescriptor) -> ReloadResult<()> {
        self.host.web.load_servlets(plugin).await?;
        self.host.web.load_filters(plugin).await?;
        Ok(())
    }

    fn transition(&self, plugin_id: &str, state: PluginState) {
        debug!(plugin_id, %state, "Plugin state changed");
        self.emit(ReloadEvent::StateChanged {
            plugin_id: plugin_id.to_string(),
            state,
        });
    }

    fn emit(&self, event: ReloadEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
