//! Test utilities for module system testing
//!
//! Provides a recording mock host, archive builders and fixture directories.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

use bundle_loader::config::{LoaderConfig, ResolveStrategy};
use bundle_loader::module::coordinator::LifecycleCoordinator;
use bundle_loader::module::registry::manifest::{ModuleManifest, MANIFEST_PATH};
use bundle_loader::module::traits::{
    FrameworkWiring, Host, ModuleError, ModuleEvent, ModuleEventKind, ModuleHandle,
    ModuleListener, ModuleMetadata, SubscriptionId,
};

/// One call made against [`MockHost`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    Install(PathBuf),
    Resolve(Vec<ModuleHandle>),
    Start(ModuleHandle),
}

#[derive(Default)]
struct MockState {
    next_id: u64,
    names: HashMap<ModuleHandle, String>,
    metadata: HashMap<ModuleHandle, ModuleMetadata>,
    calls: Vec<HostCall>,
    listeners: Vec<(SubscriptionId, ModuleListener)>,
    next_subscription: u64,
}

/// Host that records every call and fails on demand
///
/// Archives are real zip files; their manifests provide metadata. Rejection,
/// resolution and start failures are configured by file or symbolic name.
pub struct MockHost {
    state: Mutex<MockState>,
    rejected_files: HashSet<String>,
    unresolvable: HashSet<String>,
    start_failures: HashSet<String>,
    hidden_metadata: HashSet<String>,
    wiring_enabled: bool,
    properties: HashMap<String, String>,
}

impl MockHost {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            rejected_files: HashSet::new(),
            unresolvable: HashSet::new(),
            start_failures: HashSet::new(),
            hidden_metadata: HashSet::new(),
            wiring_enabled: true,
            properties: HashMap::new(),
        }
    }

    /// Reject installs of archives with this file name
    pub fn reject(mut self, file_name: &str) -> Self {
        self.rejected_files.insert(file_name.to_string());
        self
    }

    /// Any wiring call that includes this symbolic name reports failure
    pub fn unresolvable(mut self, symbolic_name: &str) -> Self {
        self.unresolvable.insert(symbolic_name.to_string());
        self
    }

    pub fn fail_start(mut self, symbolic_name: &str) -> Self {
        self.start_failures.insert(symbolic_name.to_string());
        self
    }

    /// Metadata reads for this symbolic name fail
    pub fn hide_metadata(mut self, symbolic_name: &str) -> Self {
        self.hidden_metadata.insert(symbolic_name.to_string());
        self
    }

    pub fn without_wiring(mut self) -> Self {
        self.wiring_enabled = false;
        self
    }

    pub fn with_property(mut self, key: &str, value: &str) -> Self {
        self.properties.insert(key.to_string(), value.to_string());
        self
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn installs(&self) -> Vec<PathBuf> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                HostCall::Install(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    pub fn resolves(&self) -> Vec<Vec<ModuleHandle>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                HostCall::Resolve(batch) => Some(batch),
                _ => None,
            })
            .collect()
    }

    pub fn starts(&self) -> Vec<ModuleHandle> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                HostCall::Start(handle) => Some(handle),
                _ => None,
            })
            .collect()
    }

    /// Handle assigned to the module with this symbolic name
    pub fn handle_of(&self, symbolic_name: &str) -> Option<ModuleHandle> {
        self.state
            .lock()
            .names
            .iter()
            .find(|(_, name)| name.as_str() == symbolic_name)
            .map(|(handle, _)| *handle)
    }

    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    /// Deliver a notification to every listener on the calling thread
    pub fn emit(&self, kind: ModuleEventKind, module: ModuleHandle, location: &str) {
        let listeners: Vec<ModuleListener> = self
            .state
            .lock()
            .listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        let event = ModuleEvent::new(kind, module, location);
        for listener in listeners {
            listener(&event);
        }
    }

    /// Simulate an install performed by some other actor
    pub fn emit_installed(&self, module: ModuleHandle) {
        self.emit(ModuleEventKind::Installed, module, "file:/elsewhere/other.jar");
    }

    fn name_of(&self, handle: ModuleHandle) -> Option<String> {
        self.state.lock().names.get(&handle).cloned()
    }
}

impl FrameworkWiring for MockHost {
    fn resolve_modules(&self, modules: &[ModuleHandle]) -> bool {
        let mut state = self.state.lock();
        state.calls.push(HostCall::Resolve(modules.to_vec()));
        !modules.iter().any(|handle| {
            state
                .names
                .get(handle)
                .map_or(true, |name| self.unresolvable.contains(name))
        })
    }
}

impl Host for MockHost {
    fn install_from_path(&self, path: &Path) -> Result<ModuleHandle, ModuleError> {
        self.state.lock().calls.push(HostCall::Install(path.to_path_buf()));

        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        if self.rejected_files.contains(file_name) {
            return Err(ModuleError::InstallRejected(format!("{} rejected", file_name)));
        }

        let manifest = ModuleManifest::from_archive(path)
            .map_err(|e| ModuleError::InstallRejected(e.to_string()))?;

        let handle = {
            let mut state = self.state.lock();
            state.next_id += 1;
            let handle = ModuleHandle::new(state.next_id);
            state.names.insert(handle, manifest.symbolic_name.clone());
            state.metadata.insert(handle, manifest.headers().clone());
            handle
        };

        Ok(handle)
    }

    fn metadata(&self, module: ModuleHandle) -> Result<ModuleMetadata, ModuleError> {
        let name = self.name_of(module);
        if name.map_or(false, |name| self.hidden_metadata.contains(&name)) {
            return Err(ModuleError::ModuleNotFound(module.to_string()));
        }
        self.state
            .lock()
            .metadata
            .get(&module)
            .cloned()
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
        self.state.lock().calls.push(HostCall::Start(module));
        match self.name_of(module) {
            Some(name) if self.start_failures.contains(&name) => {
                Err(ModuleError::StartFailed(format!("{} refused to start", name)))
            }
            Some(_) => Ok(()),
            None => Err(ModuleError::ModuleNotFound(module.to_string())),
        }
    }

    fn subscribe(&self, listener: ModuleListener) -> SubscriptionId {
        let mut state = self.state.lock();
        state.next_subscription += 1;
        let id = SubscriptionId(state.next_subscription);
        state.listeners.push((id, listener));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.state.lock();
        let before = state.listeners.len();
        state.listeners.retain(|(existing, _)| *existing != id);
        state.listeners.len() != before
    }

    fn property(&self, key: &str) -> Option<String> {
        self.properties.get(key).cloned()
    }
}

/// Write a module archive with the given symbolic name and extra headers
pub fn write_bundle(
    dir: &Path,
    file_name: &str,
    symbolic_name: &str,
    headers: &[(&str, &str)],
) -> PathBuf {
    let path = dir.join(file_name);
    let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());

    zip.start_file(MANIFEST_PATH, SimpleFileOptions::default())
        .unwrap();
    let mut manifest = format!(
        "Manifest-Version: 1.0\r\nBundle-SymbolicName: {}\r\n",
        symbolic_name
    );
    for (name, value) in headers {
        manifest.push_str(&format!("{}: {}\r\n", name, value));
    }
    manifest.push_str("\r\n");
    zip.write_all(manifest.as_bytes()).unwrap();

    zip.start_file("com/example/Activator.class", SimpleFileOptions::default())
        .unwrap();
    zip.write_all(&[0xCA, 0xFE, 0xBA, 0xBE]).unwrap();

    zip.finish().unwrap();
    path
}

/// Write a fragment archive attached to `host_name`
pub fn write_fragment(dir: &Path, file_name: &str, symbolic_name: &str, host_name: &str) -> PathBuf {
    write_bundle(dir, file_name, symbolic_name, &[("Fragment-Host", host_name)])
}

/// Temporary directory with an existing `plugins/` subdirectory
pub struct PluginDirFixture {
    pub temp_dir: TempDir,
    pub plugins_dir: PathBuf,
}

impl PluginDirFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let plugins_dir = temp_dir.path().join("plugins");
        std::fs::create_dir_all(&plugins_dir).unwrap();
        Self {
            temp_dir,
            plugins_dir,
        }
    }

    /// Directory outside the plugin directory, for out-of-band archives
    pub fn staging_dir(&self) -> PathBuf {
        let staging = self.temp_dir.path().join("staging");
        std::fs::create_dir_all(&staging).unwrap();
        staging
    }

    pub fn config(&self) -> LoaderConfig {
        LoaderConfig {
            plugins_dir: self.plugins_dir.display().to_string(),
            ..LoaderConfig::default()
        }
    }

    pub fn coordinator(&self, host: Arc<dyn Host>) -> Arc<LifecycleCoordinator> {
        Arc::new(LifecycleCoordinator::new(host, &self.config()))
    }

    pub fn coordinator_with(
        &self,
        host: Arc<dyn Host>,
        strategy: ResolveStrategy,
    ) -> Arc<LifecycleCoordinator> {
        let config = LoaderConfig {
            resolve_strategy: strategy,
            ..self.config()
        };
        Arc::new(LifecycleCoordinator::new(host, &config))
    }
}

/// Poll `condition` every 10ms until it holds or `timeout` elapses
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// In-memory log sink for asserting on emitted events
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with a plain-text subscriber writing into this capture
    pub fn capture<R>(&self, f: impl FnOnce() -> R) -> R {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::with_default(subscriber, f)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }

    /// Lines logged at `level`, e.g. "WARN"
    pub fn lines_at(&self, level: &str) -> Vec<String> {
        self.contents()
            .lines()
            .filter(|line| line.split_whitespace().any(|word| word == level))
            .map(str::to_string)
            .collect()
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
