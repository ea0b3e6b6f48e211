//! Dependency resolution
//!
//! Thin wrapper over the host's wiring capability.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::ResolveStrategy;
use crate::module::traits::{FrameworkWiring, Host, ModuleError, ModuleHandle};

/// Outcome of one wiring call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveGroup {
    /// Modules passed to the call
    pub modules: Vec<ModuleHandle>,
    /// Whether the call reported every module resolved
    pub resolved: bool,
}

/// Requests dependency resolution from the host
#[derive(Clone)]
pub struct DependencyResolver {
    host: Arc<dyn Host>,
}

impl DependencyResolver {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self { host }
    }

    fn wiring(&self) -> Result<&dyn FrameworkWiring, ModuleError> {
        self.host.wiring().ok_or_else(|| {
            ModuleError::WiringUnavailable(
                "system module cannot be adapted to framework wiring".to_string(),
            )
        })
    }

    /// Resolve the whole batch in a single wiring call
    pub fn resolve(&self, batch: &[ModuleHandle]) -> Result<bool, ModuleError> {
        let wiring = self.wiring()?;
        let resolved = wiring.resolve_modules(batch);
        debug!("Resolved batch of {} module(s): {}", batch.len(), resolved);
        Ok(resolved)
    }

    /// Resolve `batch` according to `strategy`
    ///
    /// `Batch` goes through [`resolve`](Self::resolve). Wiring availability
    /// is checked before any call, so an unavailable capability fails the
    /// whole batch with no module wired.
    pub fn resolve_with(
        &self,
        strategy: ResolveStrategy,
        batch: &[ModuleHandle],
    ) -> Result<Vec<ResolveGroup>, ModuleError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let groups = match strategy {
            ResolveStrategy::Batch => vec![ResolveGroup {
                modules: batch.to_vec(),
                resolved: self.resolve(batch)?,
            }],
            ResolveStrategy::PerModule => {
                let wiring = self.wiring()?;
                batch
                    .iter()
                    .map(|&module| ResolveGroup {
                        modules: vec![module],
                        resolved: wiring.resolve_modules(&[module]),
                    })
                    .collect()
            }
        };

        for group in groups.iter().filter(|g| !g.resolved) {
            warn!("Could not resolve {:?}", group.modules);
        }

        Ok(groups)
    }
}
