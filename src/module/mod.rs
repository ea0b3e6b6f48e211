//! Module system for the bundle loader
//!
//! Discovers module archives in a plugin directory, installs them into a
//! host registry, resolves their wiring in batches and starts every module
//! that is not a fragment.
//!
//! ## Architecture
//!
//! - **Registry**: directory scanning, manifest parsing, metadata and fragment checks
//! - **Loader**: installation (with archive deletion) and batch resolution
//! - **Coordinator**: one discover -> install -> resolve -> start pass
//! - **API**: install-notification listener that re-runs passes
//! - **Host**: the capability surface plus an in-process reference host

pub mod api;
pub mod coordinator;
pub mod host;
pub mod loader;
pub mod registry;
pub mod traits;

pub use api::{EventListener, RescanQueue};
pub use coordinator::{ArchiveRecord, LifecycleCoordinator, PassReport};
pub use host::{LocalHost, ModuleSummary};
pub use loader::{DependencyResolver, ModuleInstaller, ResolveGroup};
pub use registry::{DirectoryScanner, FragmentClassifier, MetadataReader, ModuleManifest};
pub use traits::{
    FrameworkWiring, Host, ModuleError, ModuleEvent, ModuleEventKind, ModuleHandle,
    ModuleListener, ModuleMetadata, ModuleState, SubscriptionId,
};
