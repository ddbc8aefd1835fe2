//! Hotswap kernel
//!
//! The host-facing contract for dependency-aware plugin hot-reload: plugin
//! descriptors, the collaborator traits a host implements (package parsing
//! and storage, registry, lifecycle, web bridge, sessions), typed errors and
//! the reloader configuration.

// plugin module
pub mod plugin;
pub use plugin::*;

// config module
pub mod config;

// error module
pub mod error;
