use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod error;
pub mod host;

pub use error::{HostError, HostResult, PackageError};
pub use host::{
    AuthContext, PackageParser, PackageStore, PluginLifecycle, PluginRegistry, Privilege,
    RefreshSignature, StoredPackage, WebBridge,
};

// ============================================================================
// Plugin identity
// ============================================================================

/// Plugin version information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginVersion {
    /// Major version
    pub major: u32,
    /// Minor version
    pub minor: u32,
    /// Patch version
    pub patch: u32,
    /// Pre-release tag (e.g., "alpha", "beta")
    pub prerelease: Option<String>,
    /// Build metadata
    pub build: Option<String>,
}

impl PluginVersion {
    /// Create a new version
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: None,
            build: None,
        }
    }

    /// Parse from string (e.g., "1.2.3-alpha+build123")
    pub fn parse(version: &str) -> Result<Self, String> {
        let version = version.trim();

        let (version_pre, build) = match version.split_once('+') {
            Some((core, build)) => (core, Some(build.to_string())),
            None => (version, None),
        };

        let (version_core, prerelease) = match version_pre.split_once('-') {
            Some((core, pre)) => (core, Some(pre.to_string())),
            None => (version_pre, None),
        };

        let parts: Vec<&str> = version_core.split('.').collect();
        if parts.len() < 2 || parts.len() > 3 {
            return Err(format!("Invalid version format: {}", version));
        }

        let major = parts[0]
            .parse::<u32>()
            .map_err(|_| format!("Invalid major version: {}", parts[0]))?;
        let minor = parts[1]
            .parse::<u32>()
            .map_err(|_| format!("Invalid minor version: {}", parts[1]))?;
        let patch = match parts.get(2) {
            Some(p) => p
                .parse::<u32>()
                .map_err(|_| format!("Invalid patch version: {}", p))?,
            None => 0,
        };

        Ok(Self {
            major,
            minor,
            patch,
            prerelease,
            build,
        })
    }
}

impl std::fmt::Display for PluginVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(ref pre) = self.prerelease {
            write!(f, "-{}", pre)?;
        }
        if let Some(ref build) = self.build {
            write!(f, "+{}", build)?;
        }
        Ok(())
    }
}

impl Default for PluginVersion {
    fn default() -> Self {
        Self::new(0, 0, 0)
    }
}

/// A snapshot of a plugin as known to the host runtime.
///
/// Descriptors are created by the host's load step and owned by the host
/// registry. The orchestrator only ever holds copies for the duration of one
/// reload cycle. Dependencies are declared by identifier, never by reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// Stable identifier, unchanged across versions
    pub id: String,
    /// Human readable name
    pub name: String,
    /// Declared version
    pub version: PluginVersion,
    /// Identifiers of the plugins this one requires
    pub required_plugins: Vec<String>,
    /// Backing package file, once installed
    pub package_path: Option<PathBuf>,
    /// Whether the host reports the plugin as started
    pub started: bool,
}

impl PluginDescriptor {
    /// Create a descriptor with no dependencies
    pub fn new(id: &str, version: PluginVersion) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            version,
            required_plugins: Vec::new(),
            package_path: None,
            started: false,
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Add a required plugin
    pub fn with_dependency(mut self, id: &str) -> Self {
        self.required_plugins.push(id.to_string());
        self
    }

    /// Set the backing package file
    pub fn with_package_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.package_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the started flag
    pub fn with_started(mut self, started: bool) -> Self {
        self.started = started;
        self
    }

    /// Whether this plugin declares `id` as a requirement
    pub fn requires(&self, id: &str) -> bool {
        self.required_plugins.iter().any(|dep| dep == id)
    }
}

// ============================================================================
// Reload lifecycle
// ============================================================================

/// Per-plugin state during one reload cycle.
///
/// `Loaded → Stopping → Stopped → Loading → Loaded → Starting → Started`.
/// A plugin that fails to reach `Started` stays `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PluginState {
    Loaded,
    Stopping,
    Stopped,
    Loading,
    Starting,
    Started,
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PluginState::Loaded => "Loaded",
            PluginState::Stopping => "Stopping",
            PluginState::Stopped => "Stopped",
            PluginState::Loading => "Loading",
            PluginState::Starting => "Starting",
            PluginState::Started => "Started",
        };
        f.write_str(s)
    }
}

/// Hot-reload event
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum ReloadEvent {
    /// A package was accepted and an install cycle began
    ReloadStarted { filename: String },
    /// A plugin moved to a new lifecycle state
    StateChanged {
        plugin_id: String,
        state: PluginState,
    },
    /// The batched context refresh ran
    ContextRefreshed { signature: RefreshSignature },
    /// The install cycle finished
    ReloadCompleted {
        plugin_id: String,
        filename: String,
        restarted: Vec<String>,
        duration: Duration,
    },
    /// The install cycle was abandoned
    ReloadFailed { filename: String, error: String },
}
