//! In-process reference host
//!
//! A small module registry that installs zip-based archives by reading their
//! manifest, resolves `Fragment-Host` / `Require-Bundle` wiring between
//! installed modules, and delivers lifecycle notifications on its own
//! dispatch thread.

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::module::registry::manifest::ModuleManifest;
use crate::module::traits::{
    FrameworkWiring, Host, ModuleError, ModuleEvent, ModuleEventKind, ModuleHandle,
    ModuleListener, ModuleMetadata, ModuleState, SubscriptionId,
};

/// Symbolic name of the system module (handle 0)
pub const SYSTEM_SYMBOLIC_NAME: &str = "system.bundle";

const SYSTEM_LOCATION: &str = "System Bundle";

struct InstalledModule {
    location: String,
    manifest: ModuleManifest,
    state: ModuleState,
}

/// Snapshot of one registered module
#[derive(Debug, Clone, Serialize)]
pub struct ModuleSummary {
    pub handle: ModuleHandle,
    pub symbolic_name: String,
    pub version: String,
    pub location: String,
    pub state: ModuleState,
    pub fragment: bool,
}

struct Registry {
    modules: BTreeMap<ModuleHandle, InstalledModule>,
    next_id: u64,
}

impl Registry {
    fn new() -> Self {
        let mut modules = BTreeMap::new();
        modules.insert(
            ModuleHandle::SYSTEM,
            InstalledModule {
                location: SYSTEM_LOCATION.to_string(),
                manifest: ModuleManifest::new(SYSTEM_SYMBOLIC_NAME, "0.0.0"),
                state: ModuleState::Started,
            },
        );

        Self {
            modules,
            next_id: ModuleHandle::SYSTEM.id() + 1,
        }
    }

    fn insert(&mut self, location: String, manifest: ModuleManifest) -> ModuleHandle {
        let handle = ModuleHandle::new(self.next_id);
        self.next_id += 1;
        self.modules.insert(
            handle,
            InstalledModule {
                location,
                manifest,
                state: ModuleState::Installed,
            },
        );
        handle
    }

    fn find_identity(&self, symbolic_name: &str, version: &str) -> Option<ModuleHandle> {
        self.modules
            .iter()
            .find(|(_, m)| m.manifest.symbolic_name == symbolic_name && m.manifest.version == version)
            .map(|(handle, _)| *handle)
    }

    /// Every mandatory dependency of `handle` is resolved, or is one of `candidates`
    fn requirements_met(&self, handle: ModuleHandle, candidates: &[ModuleHandle]) -> bool {
        let Some(module) = self.modules.get(&handle) else {
            return false;
        };

        module.manifest.mandatory_dependencies().all(|name| {
            self.modules.iter().any(|(other, m)| {
                m.manifest.symbolic_name == name
                    && (matches!(m.state, ModuleState::Resolved | ModuleState::Started)
                        || candidates.contains(other))
            })
        })
    }
}

enum Dispatch {
    Event(ModuleEvent),
    Flush(oneshot::Sender<()>),
}

type Listeners = Arc<RwLock<Vec<(SubscriptionId, ModuleListener)>>>;

/// Reference in-process host
pub struct LocalHost {
    registry: RwLock<Registry>,
    listeners: Listeners,
    next_subscription: AtomicU64,
    events: Mutex<Option<mpsc::UnboundedSender<Dispatch>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    properties: HashMap<String, String>,
    wiring_enabled: bool,
}

impl LocalHost {
    /// Create a host with an empty registry and start its dispatch thread
    pub fn new() -> Result<Self, ModuleError> {
        let listeners: Listeners = Arc::new(RwLock::new(Vec::new()));
        let (tx, rx) = mpsc::unbounded_channel();

        let dispatcher = thread::Builder::new()
            .name("module-events".to_string())
            .spawn({
                let listeners = Arc::clone(&listeners);
                move || dispatch_loop(rx, listeners)
            })?;

        Ok(Self {
            registry: RwLock::new(Registry::new()),
            listeners,
            next_subscription: AtomicU64::new(0),
            events: Mutex::new(Some(tx)),
            dispatcher: Mutex::new(Some(dispatcher)),
            properties: HashMap::new(),
            wiring_enabled: true,
        })
    }

    /// Set a framework property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Simulate a system module that cannot be adapted to wiring
    pub fn without_wiring(mut self) -> Self {
        self.wiring_enabled = false;
        self
    }

    pub fn state(&self, module: ModuleHandle) -> Option<ModuleState> {
        self.registry.read().modules.get(&module).map(|m| m.state)
    }

    /// First module registered under `symbolic_name`
    pub fn lookup(&self, symbolic_name: &str) -> Option<ModuleHandle> {
        self.registry
            .read()
            .modules
            .iter()
            .find(|(_, m)| m.manifest.symbolic_name == symbolic_name)
            .map(|(handle, _)| *handle)
    }

    /// All registered modules, system module included
    pub fn modules(&self) -> Vec<ModuleSummary> {
        self.registry
            .read()
            .modules
            .iter()
            .map(|(handle, m)| ModuleSummary {
                handle: *handle,
                symbolic_name: m.manifest.symbolic_name.clone(),
                version: m.manifest.version.clone(),
                location: m.location.clone(),
                state: m.state,
                fragment: m.manifest.is_fragment(),
            })
            .collect()
    }

    /// Block until every notification raised so far has been delivered
    ///
    /// Must not be called from a listener or from inside an async runtime.
    pub fn flush_events(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        let queued = self
            .events
            .lock()
            .as_ref()
            .map_or(false, |tx| tx.send(Dispatch::Flush(done_tx)).is_ok());

        if queued && done_rx.blocking_recv().is_err() {
            debug!("Dispatcher stopped before flush completed");
        }
    }

    /// Stop the dispatch thread; pending notifications are still delivered
    pub fn shutdown(&self) {
        drop(self.events.lock().take());

        if let Some(handle) = self.dispatcher.lock().take() {
            if handle.thread().id() == thread::current().id() {
                // Called from a listener; the loop ends once it returns.
                return;
            }
            if handle.join().is_err() {
                error!("Module event dispatcher panicked");
            }
            info!("Local host stopped");
        }
    }

    fn emit(&self, kind: ModuleEventKind, module: ModuleHandle, location: String) {
        if let Some(tx) = self.events.lock().as_ref() {
            if tx
                .send(Dispatch::Event(ModuleEvent::new(kind, module, location)))
                .is_err()
            {
                debug!("Dispatcher gone, dropping {:?} for {}", kind, module);
            }
        }
    }
}

fn dispatch_loop(mut rx: mpsc::UnboundedReceiver<Dispatch>, listeners: Listeners) {
    while let Some(message) = rx.blocking_recv() {
        match message {
            Dispatch::Event(event) => {
                // Snapshot so listeners may (un)subscribe while being called
                let snapshot: Vec<ModuleListener> = listeners
                    .read()
                    .iter()
                    .map(|(_, listener)| Arc::clone(listener))
                    .collect();

                for listener in snapshot {
                    if panic::catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                        error!(
                            "Module listener panicked handling {:?} for {}",
                            event.kind, event.module
                        );
                    }
                }
            }
            Dispatch::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Module event dispatcher stopped");
}

impl Drop for LocalHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl FrameworkWiring for LocalHost {
    fn resolve_modules(&self, modules: &[ModuleHandle]) -> bool {
        let mut all_known = true;
        let mut unresolved = Vec::new();
        let mut newly_resolved = Vec::new();

        {
            let mut registry = self.registry.write();

            let mut candidates: Vec<ModuleHandle> = Vec::new();
            for &handle in modules {
                match registry.modules.get(&handle) {
                    Some(m) if m.state == ModuleState::Installed => {
                        if !candidates.contains(&handle) {
                            candidates.push(handle);
                        }
                    }
                    Some(_) => {}
                    None => {
                        warn!("Cannot resolve unknown {}", handle);
                        all_known = false;
                    }
                }
            }

            // Assume every candidate resolves, then drop the ones whose
            // dependencies are neither resolved nor still candidates, until
            // stable. Mutual dependencies inside the batch resolve together.
            let initial = candidates.clone();
            loop {
                let current = candidates.clone();
                candidates.retain(|&handle| registry.requirements_met(handle, &current));
                if candidates.len() == current.len() {
                    break;
                }
            }

            for handle in initial {
                if !candidates.contains(&handle) {
                    unresolved.push(handle);
                    continue;
                }
                if let Some(module) = registry.modules.get_mut(&handle) {
                    module.state = ModuleState::Resolved;
                    newly_resolved.push((handle, module.location.clone()));
                }
            }
        }

        for handle in &unresolved {
            debug!("{} has unsatisfied dependencies", handle);
        }
        for (handle, location) in newly_resolved {
            self.emit(ModuleEventKind::Resolved, handle, location);
        }

        all_known && unresolved.is_empty()
    }
}

impl Host for LocalHost {
    fn install_from_path(&self, path: &Path) -> Result<ModuleHandle, ModuleError> {
        let location = format!(
            "file:{}",
            std::path::absolute(path)
                .unwrap_or_else(|_| path.to_path_buf())
                .display()
        );

        let manifest = ModuleManifest::from_archive(path)
            .map_err(|e| ModuleError::InstallRejected(format!("{}: {}", path.display(), e)))?;

        let handle = {
            let mut registry = self.registry.write();
            if let Some(existing) =
                registry.find_identity(&manifest.symbolic_name, &manifest.version)
            {
                return Err(ModuleError::InstallRejected(format!(
                    "{} {} is already installed as {}",
                    manifest.symbolic_name, manifest.version, existing
                )));
            }
            registry.insert(location.clone(), manifest)
        };

        debug!("Registered {} from {}", handle, location);
        self.emit(ModuleEventKind::Installed, handle, location);
        Ok(handle)
    }

    fn metadata(&self, module: ModuleHandle) -> Result<ModuleMetadata, ModuleError> {
        self.registry
            .read()
            .modules
            .get(&module)
            .map(|m| m.manifest.headers().clone())
            .ok_or_else(|| ModuleError::ModuleNotFound(module.to_string()))
    }

    fn wiring(&self) -> Option<&dyn FrameworkWiring> {
        if self.wiring_enabled {
            Some(self)
        } else {
            None
        }
    }

    fn start(&self, module: ModuleHandle) -> Result<(), ModuleError> {
        let location = {
            let mut registry = self.registry.write();
            let installed = registry
                .modules
                .get_mut(&module)
                .ok_or_else(|| ModuleError::ModuleNotFound(module.to_string()))?;

            if installed.manifest.is_fragment() {
                return Err(ModuleError::StartFailed(format!(
                    "{} is a fragment and cannot be started",
                    installed.manifest.symbolic_name
                )));
            }

            match installed.state {
                ModuleState::Started => return Ok(()),
                ModuleState::Resolved => {
                    installed.state = ModuleState::Started;
                    installed.location.clone()
                }
                other => {
                    return Err(ModuleError::StartFailed(format!(
                        "{} is {}, not resolved",
                        installed.manifest.symbolic_name, other
                    )))
                }
            }
        };

        self.emit(ModuleEventKind::Started, module, location);
        Ok(())
    }

    fn subscribe(&self, listener: ModuleListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::SeqCst) + 1);
        self.listeners.write().push((id, listener));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    fn property(&self, key: &str) -> Option<String> {
        self.properties.get(key).cloned()
    }
}
