//! Bundle Loader - dynamic module loading for a modular runtime
//!
//! Watches a plugin directory for module archives, installs each into the
//! host's module registry, resolves the installed batch and starts every
//! module that is not a fragment. Successfully installed archives are
//! removed from the directory, and every "module installed" notification
//! from the host triggers another pass.
//!
//! ## Design Principles
//!
//! 1. **Host Agnostic**: The host is reached only through the [`module::Host`] trait
//! 2. **Never Fatal**: Every failure is logged and becomes a skip decision
//! 3. **Forward Only**: Module state never moves backwards within a pass

pub mod config;
pub mod module;
pub mod utils;

// Re-export config module
pub use config::*;

pub use module::{
    EventListener, Host, LifecycleCoordinator, LocalHost, ModuleError, ModuleHandle, ModuleState,
    PassReport, RescanQueue,
};
