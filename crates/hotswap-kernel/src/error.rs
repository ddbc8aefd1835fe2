//! Crate-level error types for `hotswap-kernel`.
//!
//! [`KernelError`] composes the sub-module errors so that `?` converts them
//! automatically, and [`KernelResult`] wraps it in an
//! [`error_stack::Report`] so callers can attach context as the error
//! travels up.
//!
//! [`ReloaderConfig::load`](crate::config::ReloaderConfig::load) returns a
//! [`KernelResult`] with the configuration source attached.

use thiserror::Error;

use crate::config::ConfigError;
use crate::plugin::{HostError, PackageError};

/// Crate-level error type for `hotswap-kernel`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KernelError {
    /// A configuration-related error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// A malformed plugin package.
    #[error("Package error: {0}")]
    Package(#[from] PackageError),

    /// A failure reported by the host runtime.
    #[error("Host error: {0}")]
    Host(#[from] HostError),

    /// A low-level I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal / untyped error described by a message string.
    #[error("{0}")]
    Internal(String),
}

/// Convenience result alias using [`error_stack::Report`].
pub type KernelResult<T> = Result<T, error_stack::Report<KernelError>>;
