//! Module loading
//!
//! Installation of discovered archives and resolution of installed batches.

pub mod installer;
pub mod resolver;

pub use installer::ModuleInstaller;
pub use resolver::{DependencyResolver, ResolveGroup};
