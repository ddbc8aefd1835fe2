//! Typed errors for the plugin sub-system.

use thiserror::Error;

/// Errors raised while reading a plugin package.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PackageError {
    /// The stream is not a readable package archive.
    #[error("Invalid package archive: {0}")]
    InvalidArchive(String),

    /// The archive does not carry a plugin manifest.
    #[error("Package manifest missing: {0}")]
    MissingManifest(String),

    /// The manifest exists but could not be understood.
    #[error("Invalid package manifest: {0}")]
    InvalidManifest(String),

    /// An I/O error surfaced while reading the package stream.
    #[error("Package I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

/// Errors reported by the host plugin runtime and its web bridge.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HostError {
    /// The host failed to load a plugin from its package file.
    #[error("Plugin load failed: {0}")]
    LoadFailed(String),

    /// The host failed to unload a plugin.
    #[error("Plugin unload failed: {0}")]
    UnloadFailed(String),

    /// The host failed to start a plugin.
    #[error("Plugin start failed: {0}")]
    StartFailed(String),

    /// The host failed to stop a plugin.
    #[error("Plugin stop failed: {0}")]
    StopFailed(String),

    /// Writing the package into plugin storage failed.
    #[error("Package storage failed: {0}")]
    StorageFailed(String),

    /// A web-bridge call (module wiring, servlets, filters) failed.
    #[error("Web bridge error: {0}")]
    WebBridge(String),

    /// The context refresh itself failed.
    #[error("Context refresh failed: {0}")]
    RefreshFailed(String),

    /// Session or privilege management failed.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// An I/O error surfaced during a host operation.
    #[error("Host I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for errors that don't fit the above categories.
    #[error("{0}")]
    Other(String),
}

/// Result alias for host runtime calls.
pub type HostResult<T> = Result<T, HostError>;
