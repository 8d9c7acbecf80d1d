//! Proxy configuration.
//!
//! The version identifier and the seed resource list are the only knobs the
//! proxy has. Defaults are baked in; a JSON file at
//! `~/.config/offline-cache/config.json` may override them.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ProxyError;
use crate::models::Request;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "offline-cache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Bump to replace every previously cached entry on the next install/activate.
pub const DEFAULT_CACHE_NAME: &str = "devis-sbbm-v1";

pub const DEFAULT_ORIGIN: &str = "http://localhost:8000";

/// Pages and assets the application needs to start offline.
pub const DEFAULT_SEED_URLS: &[&str] = &[
    "/",
    "/devis/form",
    "/devis/historique",
    "/static/style.css",
    "/static/logo_sbbm.jpg",
    "/static/icon-192.png",
    "/static/icon-512.png",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Version identifier; also the name of the one active cache.
    pub cache_name: String,
    /// Base URL that relative seed URLs resolve against.
    pub origin: String,
    pub seed_urls: Vec<String>,
    /// `None` waits on the network indefinitely.
    pub request_timeout_secs: Option<u64>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            cache_name: DEFAULT_CACHE_NAME.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            seed_urls: DEFAULT_SEED_URLS.iter().map(|s| s.to_string()).collect(),
            request_timeout_secs: None,
        }
    }
}

impl ProxyConfig {
    pub fn new(cache_name: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            cache_name: cache_name.into(),
            origin: origin.into(),
            ..Self::default()
        }
    }

    pub fn with_seed_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.seed_urls = urls.into_iter().map(Into::into).collect();
        self
    }

    /// Load from the default location, falling back to defaults if absent.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory the on-disk cache storage lives in.
    pub fn default_cache_dir() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Resolve a path or absolute URL against the origin.
    pub fn resolve(&self, url: &str) -> Result<Url, ProxyError> {
        let invalid = |source| ProxyError::InvalidUrl {
            url: url.to_string(),
            source,
        };
        let origin = Url::parse(&self.origin).map_err(|source| ProxyError::InvalidUrl {
            url: self.origin.clone(),
            source,
        })?;
        origin.join(url).map_err(invalid)
    }

    /// GET requests for every seed URL, in list order.
    pub fn seed_requests(&self) -> Result<Vec<Request>, ProxyError> {
        self.seed_urls
            .iter()
            .map(|u| self.resolve(u).map(Request::get))
            .collect()
    }
}
