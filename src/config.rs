//! Configuration module - hub root, upload tuning and the settings file

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Hub root used when nothing else is configured
pub const DEFAULT_HUB_API: &str = "http://localhost:8080/hub";

/// Settings file name in the user's home directory
pub const SETTINGS_FILE_NAME: &str = ".xyzcli";

/// Optional configuration parameters for Config::new()
#[derive(Debug, Clone, Default)]
pub struct ConfigOptions {
    pub retry_budget: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
    pub max_split_depth: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub upload_chunk_size: Option<usize>,
    pub upload_concurrency: Option<usize>,
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct Config {
    pub hub_root: String,
    /// Transient-failure retries per chunk
    pub retry_budget: u32,
    pub retry_backoff: Duration,
    /// Maximum number of successive halvings of one upload
    pub max_split_depth: usize,
    pub request_timeout_secs: u64,
    /// Features per upload request before any 413 splitting
    pub upload_chunk_size: usize,
    pub upload_concurrency: usize,
}

impl Config {
    /// Create a new Config for the given hub root, plus optional settings
    pub fn new(hub_root: String, options: ConfigOptions) -> Result<Arc<Self>> {
        let hub_root = hub_root.trim();
        if hub_root.is_empty() {
            return Err(anyhow!("hub_root cannot be empty"));
        }

        let hub_root = if hub_root.starts_with("http://") || hub_root.starts_with("https://") {
            hub_root.to_string()
        } else {
            format!("http://{}", hub_root)
        };

        // Remove trailing slash
        let hub_root = hub_root.trim_end_matches('/').to_string();

        let upload_chunk_size = options.upload_chunk_size.unwrap_or(200);
        if upload_chunk_size == 0 {
            return Err(anyhow!("upload_chunk_size must be at least 1"));
        }

        Ok(Arc::new(Self {
            hub_root,
            retry_budget: options.retry_budget.unwrap_or(3),
            retry_backoff: Duration::from_millis(options.retry_backoff_ms.unwrap_or(1000)),
            max_split_depth: options.max_split_depth.unwrap_or(64),
            request_timeout_secs: options.request_timeout_secs.unwrap_or(120),
            upload_chunk_size,
            upload_concurrency: options.upload_concurrency.unwrap_or(1).max(1),
        }))
    }

    /// Resolve a URI against the hub: absolute URLs pass through, anything
    /// else is addressed under `{hub_root}/spaces/`
    pub fn resolve_uri(&self, uri: &str) -> String {
        if uri.starts_with("http://") || uri.starts_with("https://") {
            uri.to_string()
        } else {
            format!("{}/spaces/{}", self.hub_root, uri.trim_start_matches('/'))
        }
    }

    /// Absolute URL of the space listing endpoint
    pub fn spaces_url(&self) -> String {
        format!("{}/spaces", self.hub_root)
    }
}

/// Persistent user settings, stored as JSON
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(rename = "hubApi", default, skip_serializing_if = "Option::is_none")]
    pub hub_api: Option<String>,

    /// Unknown keys written by other tools are kept as-is
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Settings {
    /// Default settings file location (`~/.xyzcli`)
    pub fn default_path() -> Option<PathBuf> {
        BaseDirs::new().map(|dirs| dirs.home_dir().join(SETTINGS_FILE_NAME))
    }

    /// Load settings; a missing or unreadable file yields defaults
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(settings) => settings,
                Err(e) => {
                    warn!("Failed to parse settings file {:?}, ignoring: {}", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read settings file {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write settings file {:?}", path))?;
        Ok(())
    }
}

/// Pick the hub root: command line (flag or `XYZ_HUB_API`), then settings, then default
pub fn resolve_hub_api(cli_value: Option<&str>, settings: &Settings) -> String {
    [cli_value, settings.hub_api.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|v| !v.is_empty())
        .unwrap_or(DEFAULT_HUB_API)
        .to_string()
}
