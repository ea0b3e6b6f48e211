//! Lifecycle coordinator
//!
//! Drives one discover -> install -> resolve -> start pass over the plugin
//! directory. Passes may be re-entered from the host's notification thread;
//! every batch lives on the stack of the pass that built it, and installed
//! archives are deleted before resolution, so overlapping passes never see
//! the same archive twice.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn};

use crate::config::{LoaderConfig, ResolveStrategy};
use crate::module::loader::{DependencyResolver, ModuleInstaller};
use crate::module::registry::{DirectoryScanner, FragmentClassifier, MetadataReader};
use crate::module::traits::{Host, ModuleError, ModuleHandle, ModuleState};

/// What happened to one archive during a pass
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveRecord {
    pub path: PathBuf,
    pub handle: Option<ModuleHandle>,
    pub state: ModuleState,
    pub fragment: bool,
}

impl ArchiveRecord {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            handle: None,
            state: ModuleState::Discovered,
            fragment: false,
        }
    }

    fn advance(&mut self, next: ModuleState) {
        match self.state.advance(next) {
            Ok(state) => self.state = state,
            Err(e) => error!("{}: {}", self.path.display(), e),
        }
    }
}

/// Summary of one lifecycle pass
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    /// Monotonic pass number, per coordinator
    pub pass: u64,
    pub plugins_dir: PathBuf,
    pub directory_missing: bool,
    pub records: Vec<ArchiveRecord>,
}

impl PassReport {
    fn new(pass: u64, plugins_dir: PathBuf) -> Self {
        Self {
            pass,
            plugins_dir,
            directory_missing: false,
            records: Vec::new(),
        }
    }

    pub fn discovered(&self) -> usize {
        self.records.len()
    }

    pub fn installed(&self) -> usize {
        self.records.iter().filter(|r| r.handle.is_some()).count()
    }

    pub fn install_failures(&self) -> usize {
        self.records.iter().filter(|r| r.handle.is_none()).count()
    }

    pub fn started(&self) -> usize {
        self.count(ModuleState::Started)
    }

    pub fn fragments(&self) -> usize {
        self.records.iter().filter(|r| r.fragment).count()
    }

    pub fn count(&self, state: ModuleState) -> usize {
        self.records.iter().filter(|r| r.state == state).count()
    }

    /// Record for the archive originally at `path`
    pub fn record(&self, path: &Path) -> Option<&ArchiveRecord> {
        self.records.iter().find(|r| r.path == path)
    }

    fn record_mut(&mut self, handle: ModuleHandle) -> Option<&mut ArchiveRecord> {
        self.records.iter_mut().find(|r| r.handle == Some(handle))
    }
}

/// Orchestrates lifecycle passes against one host and one plugin directory
pub struct LifecycleCoordinator {
    host: Arc<dyn Host>,
    scanner: DirectoryScanner,
    installer: ModuleInstaller,
    resolver: DependencyResolver,
    classifier: FragmentClassifier,
    strategy: ResolveStrategy,
    passes: AtomicU64,
}

impl LifecycleCoordinator {
    /// Build a coordinator from resolved configuration
    pub fn new(host: Arc<dyn Host>, config: &LoaderConfig) -> Self {
        Self {
            scanner: DirectoryScanner::new(config.plugins_path(), config.archive_suffix.clone()),
            installer: ModuleInstaller::new(Arc::clone(&host)),
            resolver: DependencyResolver::new(Arc::clone(&host)),
            classifier: FragmentClassifier::new(MetadataReader::new(Arc::clone(&host))),
            strategy: config.resolve_strategy,
            host,
            passes: AtomicU64::new(0),
        }
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    pub fn plugins_dir(&self) -> &Path {
        self.scanner.plugins_dir()
    }

    /// Number of passes started so far
    pub fn pass_count(&self) -> u64 {
        self.passes.load(Ordering::SeqCst)
    }

    /// Run one full pass
    ///
    /// Never fails: every error is logged at the stage that produced it and
    /// turned into a skip decision for the affected archive or batch.
    pub fn run(&self) -> PassReport {
        let pass = self.passes.fetch_add(1, Ordering::SeqCst) + 1;
        let span = info_span!("pass", pass);
        let _enter = span.enter();

        let mut report = PassReport::new(pass, self.plugins_dir().to_path_buf());

        // Scanning
        if self.scanner.is_missing() {
            warn!(
                "{}",
                ModuleError::DirectoryMissing(self.plugins_dir().to_path_buf())
            );
            report.directory_missing = true;
            return report;
        }

        let archives = match self.scanner.scan() {
            Ok(archives) => archives,
            Err(e) => {
                warn!("Failed to scan {}: {}", self.plugins_dir().display(), e);
                return report;
            }
        };

        if archives.is_empty() {
            debug!("No archives found");
            return report;
        }

        // Installing
        let mut batch = Vec::new();
        for archive in archives {
            let mut record = ArchiveRecord::new(archive);
            match self.installer.install(&record.path) {
                Ok(handle) => {
                    record.handle = Some(handle);
                    record.advance(ModuleState::Installed);
                    batch.push(handle);
                }
                Err(e) => {
                    warn!("Couldn't install plugin {}: {}", record.path.display(), e);
                    record.advance(ModuleState::Failed);
                }
            }
            report.records.push(record);
        }

        if batch.is_empty() {
            return report;
        }

        // Resolving
        let groups = match self.resolver.resolve_with(self.strategy, &batch) {
            Ok(groups) => groups,
            Err(e) => {
                warn!("Skipping {} installed module(s): {}", batch.len(), e);
                for handle in batch {
                    if let Some(record) = report.record_mut(handle) {
                        record.advance(ModuleState::Failed);
                    }
                }
                return report;
            }
        };

        let mut resolved = Vec::new();
        for group in groups {
            let next = if group.resolved {
                ModuleState::Resolved
            } else {
                ModuleState::Failed
            };
            for handle in group.modules {
                if let Some(record) = report.record_mut(handle) {
                    record.advance(next);
                }
                if group.resolved {
                    resolved.push(handle);
                }
            }
        }

        // Starting
        for handle in resolved {
            let fragment = match self.classifier.is_fragment(handle) {
                Ok(fragment) => fragment,
                Err(e) => {
                    warn!("Couldn't read metadata of {}, not starting it: {}", handle, e);
                    continue;
                }
            };

            if fragment {
                debug!("Fragment module will not be started {}", handle);
                if let Some(record) = report.record_mut(handle) {
                    record.fragment = true;
                }
                continue;
            }

            match self.host.start(handle) {
                Ok(()) => {
                    info!("Started {}", handle);
                    if let Some(record) = report.record_mut(handle) {
                        record.advance(ModuleState::Started);
                    }
                }
                Err(e) => warn!("Couldn't start {}: {}", handle, e),
            }
        }

        info!(
            discovered = report.discovered(),
            installed = report.installed(),
            started = report.started(),
            fragments = report.fragments(),
            "Pass complete"
        );
        report
    }
}
