//! Configuration management for the bundle loader
//!
//! Handles configuration loading, startup overrides and validation.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::module::traits::Host;
use crate::utils::env_opt;

/// Host property naming the plugin directory
pub const PLUGINS_DIR_PROPERTY: &str = "loader.plugins.dir";

/// Environment variable naming the plugin directory
pub const PLUGINS_DIR_ENV: &str = "BUNDLE_LOADER_PLUGINS_DIR";

/// How installed batches are handed to the wiring capability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveStrategy {
    /// One wiring call covering every module installed in the pass
    #[default]
    Batch,
    /// One wiring call per installed module, in install order
    PerModule,
}

/// How install notifications trigger passes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerMode {
    /// Run the pass directly on the host's dispatch thread
    Inline,
    /// Coalesce requests into a single pending rescan served by a worker
    #[default]
    Queued,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter (e.g. "info", "bundle_loader=debug"); RUST_LOG wins
    pub filter: Option<String>,

    /// Emit JSON lines (requires the `json-logging` feature)
    #[serde(default)]
    pub json_format: bool,
}

/// Loader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Directory watched for plugin archives
    #[serde(default = "default_plugins_dir")]
    pub plugins_dir: String,

    /// File name suffix identifying an archive
    #[serde(default = "default_archive_suffix")]
    pub archive_suffix: String,

    #[serde(default)]
    pub resolve_strategy: ResolveStrategy,

    #[serde(default)]
    pub listener_mode: ListenerMode,

    /// Logging configuration
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

fn default_plugins_dir() -> String {
    "plugins".to_string()
}

fn default_archive_suffix() -> String {
    ".jar".to_string()
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            plugins_dir: default_plugins_dir(),
            archive_suffix: default_archive_suffix(),
            resolve_strategy: ResolveStrategy::default(),
            listener_mode: ListenerMode::default(),
            logging: None,
        }
    }
}

/// Trimmed value, or None if blank
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl LoaderConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: LoaderConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: LoaderConfig = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration, picking the format from the file extension
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_file(path),
            _ => Self::from_toml_file(path),
        }
    }

    /// Apply the plugin directory override, looked up once at startup
    ///
    /// Host property first, then environment; blank values are ignored.
    pub fn apply_overrides(&mut self, host: &dyn Host) {
        let override_dir = non_blank(host.property(PLUGINS_DIR_PROPERTY))
            .or_else(|| non_blank(env_opt(PLUGINS_DIR_ENV)));

        debug!("{}={:?}", PLUGINS_DIR_PROPERTY, override_dir);
        if let Some(dir) = override_dir {
            self.plugins_dir = dir;
        }
    }

    pub fn plugins_path(&self) -> PathBuf {
        PathBuf::from(&self.plugins_dir)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.plugins_dir.trim().is_empty() {
            return Err(anyhow::anyhow!("plugins_dir must not be empty"));
        }
        if self.archive_suffix.is_empty() {
            return Err(anyhow::anyhow!("archive_suffix must not be empty"));
        }
        Ok(())
    }
}
