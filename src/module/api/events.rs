//! Install-notification listener
//!
//! Subscribes to the host's lifecycle notifications and triggers a fresh
//! lifecycle pass whenever any module is installed, by this loader or by
//! anyone else.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ListenerMode;
use crate::module::coordinator::LifecycleCoordinator;
use crate::module::traits::{Host, ModuleEvent, ModuleEventKind, ModuleListener, SubscriptionId};

/// Only installs trigger a rescan
pub fn triggers_rescan(event: &ModuleEvent) -> bool {
    event.kind == ModuleEventKind::Installed
}

/// Coalescing queue of "rescan requested" signals
///
/// Holds at most one pending request. A request made while one is already
/// pending is folded into it; a request made while a pass is running queues
/// exactly one follow-up pass.
#[derive(Clone)]
pub struct RescanQueue {
    tx: mpsc::Sender<()>,
}

impl RescanQueue {
    /// Spawn the worker that serves queued rescans
    ///
    /// Must be called from within a tokio runtime. Passes run on the
    /// blocking pool, one at a time. The worker exits once every queue
    /// handle has been dropped.
    pub fn spawn(coordinator: Arc<LifecycleCoordinator>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<()>(1);

        let worker = tokio::spawn(async move {
            while rx.recv().await.is_some() {
                let coordinator = Arc::clone(&coordinator);
                match tokio::task::spawn_blocking(move || coordinator.run()).await {
                    Ok(report) => debug!("Queued rescan finished pass {}", report.pass),
                    Err(e) => error!("Queued rescan pass aborted: {}", e),
                }
            }
            debug!("Rescan queue closed");
        });

        (Self { tx }, worker)
    }

    /// Ask for a rescan; returns false if it was coalesced or the worker is gone
    pub fn request(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => {
                debug!("Rescan already pending");
                false
            }
            Err(TrySendError::Closed(())) => {
                warn!("Rescan worker is gone, dropping request");
                false
            }
        }
    }
}

/// Handle to a registered install listener
pub struct EventListener {
    host: Arc<dyn Host>,
    mode: ListenerMode,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl EventListener {
    /// Run passes directly on the host's dispatch thread
    ///
    /// The callback only holds a weak reference, so the listener never keeps
    /// the coordinator (and through it the host) alive.
    pub fn attach_inline(coordinator: &Arc<LifecycleCoordinator>) -> Self {
        let weak: Weak<LifecycleCoordinator> = Arc::downgrade(coordinator);
        let callback: ModuleListener = Arc::new(move |event: &ModuleEvent| {
            if !triggers_rescan(event) {
                return;
            }
            match weak.upgrade() {
                Some(coordinator) => {
                    debug!("{} installed from {}, rescanning", event.module, event.location);
                    coordinator.run();
                }
                None => debug!("Coordinator dropped, ignoring {:?}", event.kind),
            }
        });

        Self::attach(Arc::clone(coordinator.host()), ListenerMode::Inline, callback)
    }

    /// Route install notifications through a [`RescanQueue`]
    pub fn attach_queued(coordinator: &Arc<LifecycleCoordinator>, queue: RescanQueue) -> Self {
        let callback: ModuleListener = Arc::new(move |event: &ModuleEvent| {
            if triggers_rescan(event) {
                debug!("{} installed from {}, queueing rescan", event.module, event.location);
                queue.request();
            }
        });

        Self::attach(Arc::clone(coordinator.host()), ListenerMode::Queued, callback)
    }

    fn attach(host: Arc<dyn Host>, mode: ListenerMode, callback: ModuleListener) -> Self {
        let id = host.subscribe(callback);
        info!("Listening for module installs ({:?})", mode);
        Self {
            host,
            mode,
            subscription: Mutex::new(Some(id)),
        }
    }

    pub fn mode(&self) -> ListenerMode {
        self.mode
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.lock().is_some()
    }

    /// Unsubscribe from the host; idempotent
    pub fn detach(&self) {
        if let Some(id) = self.subscription.lock().take() {
            if !self.host.unsubscribe(id) {
                debug!("Subscription {:?} was already gone", id);
            }
        }
    }
}

impl Drop for EventListener {
    fn drop(&mut self) {
        self.detach();
    }
}
