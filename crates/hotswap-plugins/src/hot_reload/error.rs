//! Reload error types

use error_stack::Report;
use hotswap_kernel::{HostError, PackageError};
use thiserror::Error;

/// Errors raised inside one install cycle or while activating the watcher.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReloadError {
    #[error("Package error: {0}")]
    Package(#[from] PackageError),

    #[error("Host runtime error: {0}")]
    Host(#[from] HostError),

    #[error("Host did not load package {0}")]
    NotLoaded(String),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Plain result alias for reload operations.
pub type ReloadResult<T> = Result<T, ReloadError>;

/// Error-stack–backed result alias for reload operations.
pub type ReloadReport<T> = ::std::result::Result<T, Report<ReloadError>>;

/// Extension trait to convert [`ReloadResult<T>`] into [`ReloadReport<T>`].
pub trait IntoReloadReport<T> {
    /// Wrap the error in an `error_stack::Report`.
    fn into_report(self) -> ReloadReport<T>;
}

impl<T> IntoReloadReport<T> for ReloadResult<T> {
    #[inline]
    fn into_report(self) -> ReloadReport<T> {
        self.map_err(Report::new)
    }
}
