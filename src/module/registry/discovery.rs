//! Plugin archive discovery
//!
//! Scans the plugin directory for archives matching the naming convention.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::module::traits::ModuleError;

/// Flat-directory scanner for plugin archives
#[derive(Debug, Clone)]
pub struct DirectoryScanner {
    /// Directory to scan
    plugins_dir: PathBuf,
    /// File name suffix an archive must carry
    suffix: String,
}

impl DirectoryScanner {
    /// Create a new scanner
    pub fn new<P: AsRef<Path>>(plugins_dir: P, suffix: impl Into<String>) -> Self {
        Self {
            plugins_dir: plugins_dir.as_ref().to_path_buf(),
            suffix: suffix.into(),
        }
    }

    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    /// Whether the plugin directory is absent
    pub fn is_missing(&self) -> bool {
        !self.plugins_dir.is_dir()
    }

    /// List archives directly inside the plugin directory
    ///
    /// Entries come back sorted by path. Subdirectories are never returned,
    /// even when their name carries the suffix. A missing directory yields
    /// an empty list.
    pub fn scan(&self) -> Result<Vec<PathBuf>, ModuleError> {
        if self.is_missing() {
            debug!("{}", ModuleError::DirectoryMissing(self.plugins_dir.clone()));
            return Ok(Vec::new());
        }

        info!("Looking for plugins in {}", self.display_dir());

        let mut archives = Vec::new();
        for entry in fs::read_dir(&self.plugins_dir)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Failed to read entry in {:?}: {}", self.plugins_dir, e);
                    continue;
                }
            };

            let path = entry.path();
            if path.is_dir() {
                continue;
            }

            if self.matches(&path) {
                archives.push(path);
            } else {
                debug!("Ignoring non-archive entry {:?}", path);
            }
        }

        // Install order follows file name order
        archives.sort();
        debug!("Discovered {} archive(s)", archives.len());
        Ok(archives)
    }

    fn matches(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .map_or(false, |name| name.ends_with(&self.suffix))
    }

    fn display_dir(&self) -> String {
        std::path::absolute(&self.plugins_dir)
            .unwrap_or_else(|_| self.plugins_dir.clone())
            .display()
            .to_string()
    }
}
