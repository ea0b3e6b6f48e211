//! Host implementations
//!
//! The loader only talks to a host through [`crate::module::traits::Host`];
//! [`LocalHost`] is the in-process registry used by the binary and tests.

pub mod local;

pub use local::{LocalHost, ModuleSummary, SYSTEM_SYMBOLIC_NAME};
