//! Module system traits and interfaces
//!
//! Defines the capability surface the loader consumes from the host module
//! registry, plus the identity, state and metadata types that flow across it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Opaque module identity handed out by the host on installation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleHandle(u64);

impl ModuleHandle {
    /// The host's root/system module
    pub const SYSTEM: ModuleHandle = ModuleHandle(0);

    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module#{}", self.0)
    }
}

/// Module lifecycle state
///
/// Forward-only: `Discovered -> Installed -> Resolved -> Started`, with
/// `Failed` reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleState {
    /// Archive found on disk, not yet handed to the host
    Discovered,
    /// Registered with the host, wiring not computed
    Installed,
    /// Dependency wiring bound
    Resolved,
    /// Activated
    Started,
    /// Abandoned for the remainder of the pass
    Failed,
}

impl ModuleState {
    fn rank(self) -> u8 {
        match self {
            Self::Discovered => 0,
            Self::Installed => 1,
            Self::Resolved => 2,
            Self::Started => 3,
            Self::Failed => u8::MAX,
        }
    }

    /// No transition leaves a terminal state
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Started | Self::Failed)
    }

    /// Move to `next`, rejecting reverse and skipping transitions
    pub fn advance(self, next: ModuleState) -> Result<ModuleState, ModuleError> {
        let allowed = match (self, next) {
            (current, _) if current.is_terminal() => false,
            (_, Self::Failed) => true,
            (current, next) => next.rank() == current.rank() + 1,
        };

        if allowed {
            Ok(next)
        } else {
            Err(ModuleError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discovered => write!(f, "discovered"),
            Self::Installed => write!(f, "installed"),
            Self::Resolved => write!(f, "resolved"),
            Self::Started => write!(f, "started"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Declared headers of an installed module
///
/// Header names keep the case they were declared with; lookups ignore case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleMetadata {
    headers: BTreeMap<String, String>,
}

impl ModuleMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header, replacing any existing header with the same name
    /// regardless of case
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|existing, _| !existing.eq_ignore_ascii_case(&name));
        self.headers.insert(name, value.into());
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn contains_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for ModuleMetadata
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut metadata = ModuleMetadata::new();
        for (name, value) in iter {
            metadata.insert(name, value);
        }
        metadata
    }
}

/// Kind of lifecycle notification raised by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleEventKind {
    Installed,
    Resolved,
    Started,
}

/// Lifecycle notification delivered to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleEvent {
    pub kind: ModuleEventKind,
    pub module: ModuleHandle,
    /// Location the module was installed from
    pub location: String,
}

impl ModuleEvent {
    pub fn new(kind: ModuleEventKind, module: ModuleHandle, location: impl Into<String>) -> Self {
        Self {
            kind,
            module,
            location: location.into(),
        }
    }
}

/// Callback registered with the host for lifecycle notifications
pub type ModuleListener = Arc<dyn Fn(&ModuleEvent) + Send + Sync>;

/// Token returned by [`Host::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Dependency wiring capability of the host's system module
pub trait FrameworkWiring: Send + Sync {
    /// Resolve all given modules in a single call
    ///
    /// Returns true only if every module in `modules` ended up resolved.
    fn resolve_modules(&self, modules: &[ModuleHandle]) -> bool;
}

/// Host module registry
///
/// Owns module identity, wiring and activation. All calls are synchronous
/// and the host is responsible for its own consistency under concurrent
/// callers.
pub trait Host: Send + Sync {
    /// Register the archive at `path` and return its handle
    fn install_from_path(&self, path: &Path) -> Result<ModuleHandle, ModuleError>;

    /// Declared headers of an installed module
    fn metadata(&self, module: ModuleHandle) -> Result<ModuleMetadata, ModuleError>;

    /// Adapt the system module to the wiring capability
    ///
    /// `None` when the system module is unavailable or cannot be adapted.
    fn wiring(&self) -> Option<&dyn FrameworkWiring>;

    /// Activate a resolved module
    fn start(&self, module: ModuleHandle) -> Result<(), ModuleError>;

    /// Register a lifecycle listener
    fn subscribe(&self, listener: ModuleListener) -> SubscriptionId;

    /// Remove a listener; returns false if it was not registered
    fn unsubscribe(&self, id: SubscriptionId) -> bool;

    /// Framework property lookup
    fn property(&self, _key: &str) -> Option<String> {
        None
    }
}

/// Module system errors
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("Plugin directory does not exist: {}", .0.display())]
    DirectoryMissing(PathBuf),

    #[error("Module install rejected: {0}")]
    InstallRejected(String),

    #[error("Framework wiring unavailable: {0}")]
    WiringUnavailable(String),

    #[error("Module start failed: {0}")]
    StartFailed(String),

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Invalid module manifest: {0}")]
    InvalidManifest(String),

    #[error("Invalid module state transition: {from} -> {to}")]
    InvalidTransition { from: ModuleState, to: ModuleState },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
