//! Archive installation
//!
//! Hands a discovered archive to the host and removes it from the plugin
//! directory once the host has accepted it.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

use crate::module::traits::{Host, ModuleError, ModuleHandle};

/// Installs plugin archives into the host registry
#[derive(Clone)]
pub struct ModuleInstaller {
    host: Arc<dyn Host>,
}

impl ModuleInstaller {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self { host }
    }

    /// Install one archive
    ///
    /// On success the archive is deleted and the new handle returned. On
    /// failure the archive is left untouched so the next pass retries it.
    /// Every host failure surfaces as [`ModuleError::InstallRejected`].
    pub fn install(&self, archive: &Path) -> Result<ModuleHandle, ModuleError> {
        let handle = self.host.install_from_path(archive).map_err(|e| match e {
            ModuleError::InstallRejected(reason) => ModuleError::InstallRejected(reason),
            other => ModuleError::InstallRejected(format!("{}: {}", archive.display(), other)),
        })?;

        info!("Installed {} as {}", archive.display(), handle);

        // The host owns the module from here on. A leftover file is retried
        // next pass and rejected as a duplicate identity.
        if let Err(e) = fs::remove_file(archive) {
            error!(
                "Installed {} but could not remove archive {}: {}",
                handle,
                archive.display(),
                e
            );
        }

        Ok(handle)
    }
}
