//! Hot-reload plugin support module
//!
//! Replaces plugins in a running host when their packages change on disk:
//! - Watching plugin directories for package changes
//! - Stopping running dependents around a replacement
//! - Installing, loading and starting the new version
//! - Restarting dependents in dependency order
//! - Batching the web-context refresh to once per cycle

mod error;
mod installer;
mod manager;
mod package;
mod planner;
mod refresh;
mod session;
mod sorter;
mod watcher;

pub use error::{IntoReloadReport, ReloadError, ReloadReport, ReloadResult};
pub use installer::{HostBindings, InstallOutcome, InstallReport, Installer, ReloadOutcome};
pub use manager::{HotReloadService, ReloadOrchestrator};
pub use package::{ArchivePackageParser, DirectoryPackageStore, MANIFEST_FILE, package_digest};
pub use planner::{StopPlanner, affected_set, transitive_affected_set};
pub use refresh::RefreshDispatcher;
pub use session::PrivilegedSession;
pub use sorter::{SortError, sort_startup_order, startup_order_or_original};
pub use watcher::{PluginWatcher, WatchConfig, WatchEvent, WatchEventKind, classify};

pub use hotswap_kernel::{ReloadEvent, config::StopScope};
