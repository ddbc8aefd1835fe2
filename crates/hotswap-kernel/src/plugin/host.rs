//! Collaborator traits the reload orchestrator drives.
//!
//! Each trait is a narrow view of the embedding host: package parsing,
//! package storage, the plugin registry and lifecycle, the web bridge, and
//! session/privilege management. Calls that can block on the host's
//! class-loading or context initialisation are async; bookkeeping calls are
//! not.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::PluginDescriptor;
use super::error::{HostResult, PackageError};

/// Extracts a provisional descriptor from raw package bytes.
///
/// The descriptor is not registered anywhere; it only tells the orchestrator
/// which plugin the package claims to be.
pub trait PackageParser: Send + Sync {
    fn parse(&self, package: &[u8]) -> Result<PluginDescriptor, PackageError>;
}

/// Location and digest of a package written to plugin storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPackage {
    /// Final path inside the plugin directory
    pub path: PathBuf,
    /// Hex-encoded SHA-256 of the stored bytes
    pub digest: String,
}

/// Persists package bytes into the host's plugin directory.
#[async_trait::async_trait]
pub trait PackageStore: Send + Sync {
    /// Write `package` under `filename`, replacing any previous file.
    async fn insert(&self, package: &[u8], filename: &str) -> HostResult<StoredPackage>;
}

/// The host's registry of loaded plugins.
#[async_trait::async_trait]
pub trait PluginRegistry: Send + Sync {
    /// Look up a loaded plugin by identifier.
    async fn get_by_id(&self, plugin_id: &str) -> Option<PluginDescriptor>;

    /// Snapshot of every loaded plugin.
    async fn loaded(&self) -> Vec<PluginDescriptor>;

    /// Load a plugin from an installed package file.
    ///
    /// `Ok(None)` means the host declined the package without raising an
    /// error.
    async fn load(&self, package: &Path) -> HostResult<Option<PluginDescriptor>>;

    /// Remove a plugin from the registry.
    async fn unload(&self, plugin: &PluginDescriptor) -> HostResult<()>;
}

/// Start/stop control over loaded plugins.
#[async_trait::async_trait]
pub trait PluginLifecycle: Send + Sync {
    /// Stop `plugin`.
    ///
    /// When `cascade` is set the host also stops the plugin's running
    /// dependents. The returned list holds every dependent the host stopped.
    async fn stop(
        &self,
        plugin: &PluginDescriptor,
        unload_dependents: bool,
        cascade: bool,
    ) -> HostResult<Vec<PluginDescriptor>>;

    /// Start `plugin`, returning whether it reached the started state.
    async fn start(&self, plugin: &PluginDescriptor) -> HostResult<bool>;
}

/// Which refresh entry point the host exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshSignature {
    /// `refresh()`
    Standard,
    /// `refresh_compat(close_context, scope_hint)`, exposed by older hosts
    Compat,
}

/// Wiring between plugins and the embedding web application.
#[async_trait::async_trait]
pub trait WebBridge: Send + Sync {
    /// Detach a plugin's web resources.
    async fn stop_module(&self, plugin: &PluginDescriptor) -> HostResult<()>;

    /// Attach a plugin's web resources, deferring the context refresh.
    ///
    /// Returns `true` when a context refresh is required.
    async fn start_module(&self, plugin: &PluginDescriptor) -> HostResult<bool>;

    /// Report which refresh entry point this host provides.
    fn refresh_signature(&self) -> RefreshSignature;

    /// Refresh the web-application context.
    async fn refresh(&self) -> HostResult<()>;

    /// Refresh through the secondary entry point.
    async fn refresh_compat(
        &self,
        close_context: bool,
        scope_hint: Option<&PluginDescriptor>,
    ) -> HostResult<()>;

    /// Register a plugin's deferred servlets.
    async fn load_servlets(&self, plugin: &PluginDescriptor) -> HostResult<()>;

    /// Register a plugin's deferred filters.
    async fn load_filters(&self, plugin: &PluginDescriptor) -> HostResult<()>;
}

/// Elevated privileges needed while an install mutates host state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Privilege {
    ManageGlobalProperties,
    ManageScheduler,
}

impl Privilege {
    /// Privileges granted for the duration of one install.
    pub const INSTALL: [Privilege; 2] = [Privilege::ManageGlobalProperties, Privilege::ManageScheduler];

    pub fn as_str(&self) -> &'static str {
        match self {
            Privilege::ManageGlobalProperties => "Manage Global Properties",
            Privilege::ManageScheduler => "Manage Scheduler",
        }
    }
}

impl std::fmt::Display for Privilege {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session and proxy-privilege management.
///
/// Methods are synchronous so that privileges can be released from a
/// `Drop` implementation on every exit path.
pub trait AuthContext: Send + Sync {
    fn open_session(&self);

    fn authenticate(&self, username: &str, password: &str) -> HostResult<()>;

    fn add_proxy_privilege(&self, privilege: Privilege);

    fn remove_proxy_privilege(&self, privilege: Privilege);

    fn clear_session(&self);

    fn close_session(&self);
}
