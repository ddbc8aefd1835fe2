//! Reloader configuration
//!
//! [`ReloaderConfig`] is read once when the host activates the reloader.
//! With the `config` feature it can be layered from built-in defaults, an
//! optional configuration file (YAML, TOML, JSON, INI, RON or JSON5, detected
//! from the extension, with `${VAR}` / `$VAR` substitution) and `HOTSWAP_*`
//! environment variables, in increasing priority.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment prefix for configuration overrides (`HOTSWAP_PATHS`, ...).
pub const ENV_PREFIX: &str = "HOTSWAP";

/// Package suffix watched when none is configured.
pub const DEFAULT_EXTENSION: &str = "pkg";

/// Configuration error
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parsing error: {0}")]
    Parse(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// How far the stop planner follows dependency edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopScope {
    /// Only plugins that declare the target directly
    #[default]
    Direct,
    /// Dependents of dependents as well
    Transitive,
}

/// Hot-reload watcher and installer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReloaderConfig {
    /// Semicolon-separated directories to watch; blank disables watching
    pub paths: String,
    /// Package file extension, without the dot
    pub extension: String,
    /// Whether to watch subdirectories
    pub recursive: bool,
    /// Quiet period before a changed package is acted on
    pub debounce_ms: u64,
    /// Dependent discovery policy
    pub stop_scope: StopScope,
    /// Optional account used to authenticate install sessions
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for ReloaderConfig {
    fn default() -> Self {
        Self {
            paths: String::new(),
            extension: DEFAULT_EXTENSION.to_string(),
            recursive: false,
            debounce_ms: 500,
            stop_scope: StopScope::Direct,
            username: None,
            password: None,
        }
    }
}

impl ReloaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the semicolon-separated watch list
    pub fn with_paths(mut self, paths: &str) -> Self {
        self.paths = paths.to_string();
        self
    }

    /// Set the package extension
    pub fn with_extension(mut self, ext: &str) -> Self {
        self.extension = ext.trim_start_matches('.').to_string();
        self
    }

    pub fn with_debounce(mut self, duration: Duration) -> Self {
        self.debounce_ms = duration.as_millis() as u64;
        self
    }

    pub fn with_stop_scope(mut self, scope: StopScope) -> Self {
        self.stop_scope = scope;
        self
    }

    /// Authenticate install sessions with these credentials
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }

    /// Directories to watch. Blank entries are skipped.
    pub fn watch_paths(&self) -> Vec<PathBuf> {
        self.paths
            .split(';')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .collect()
    }

    /// Whether any directory is configured
    pub fn is_enabled(&self) -> bool {
        !self.watch_paths().is_empty()
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Username/password pair, if a username is configured
    pub fn credentials(&self) -> Option<(&str, &str)> {
        self.username
            .as_deref()
            .map(|user| (user, self.password.as_deref().unwrap_or_default()))
    }
}

#[cfg(feature = "config")]
mod loader;

#[cfg(feature = "config")]
pub use loader::{detect_format, from_str, load_config, load_with_env, substitute_env_vars};

#[cfg(feature = "config")]
impl ReloaderConfig {
    /// Load settings from defaults, an optional file and `HOTSWAP_*` variables.
    pub fn load(path: Option<&str>) -> crate::error::KernelResult<Self> {
        let loaded = match path {
            Some(path) => load_with_env(path, ENV_PREFIX),
            None => loader::from_env(ENV_PREFIX),
        };

        loaded.map_err(|e| {
            error_stack::Report::new(crate::error::KernelError::from(e)).attach(format!(
                "while loading reloader config from {}",
                path.unwrap_or("environment")
            ))
        })
    }
}
