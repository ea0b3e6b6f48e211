//! Module metadata access

use std::sync::Arc;
use tracing::debug;

use crate::module::traits::{Host, ModuleError, ModuleHandle, ModuleMetadata};

/// Reads declared headers of installed modules from the host
#[derive(Clone)]
pub struct MetadataReader {
    host: Arc<dyn Host>,
}

impl MetadataReader {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self { host }
    }

    /// Fetch the headers of `module`
    pub fn read(&self, module: ModuleHandle) -> Result<ModuleMetadata, ModuleError> {
        let metadata = self.host.metadata(module)?;
        debug!("Read {} header(s) for {}", metadata.len(), module);
        Ok(metadata)
    }
}
