//! Dependency-aware hot reloading for plugin hosts
//!
//! The host supplies its collaborators as [`HostBindings`]; this crate
//! watches package directories and drives each replacement through stop,
//! install, start and refresh.

pub mod hot_reload;

pub use hot_reload::{
    HostBindings, HotReloadService, InstallOutcome, InstallReport, ReloadOrchestrator,
};
pub use hotswap_kernel::{
    PluginDescriptor, PluginState, PluginVersion, ReloadEvent, config::ReloaderConfig,
};
