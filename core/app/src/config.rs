//! Application configuration.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use url::Url;

use lantern_cache::CacheConfig;
use lantern_common::{Error, Result, VersionTag};

/// Default configuration file name inside the data directory.
pub const CONFIG_FILENAME: &str = "lantern.json";
/// Default database file name inside the data directory.
pub const DATABASE_FILENAME: &str = "lantern.db";

/// Sync endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Bulk endpoint, relative to the cache origin or absolute.
    pub endpoint: String,
    /// Register deferred attempts instead of syncing in the foreground.
    pub deferred: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            endpoint: "/api/sync".to_string(),
            deferred: true,
        }
    }
}

/// Local store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Registered backend name ("sqlite" or "memory").
    pub backend: String,
    /// Database path for file-backed stores. Defaults under the data directory.
    pub path: Option<PathBuf>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: "sqlite".to_string(),
            path: None,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Active cache version tag.
    pub version: String,
    /// Timeout applied to every network call, in seconds.
    pub timeout_secs: u64,
    pub cache: CacheConfig,
    pub sync: SyncSettings,
    pub store: StoreSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: "v1.0.0".to_string(),
            timeout_secs: 30,
            cache: CacheConfig::default(),
            sync: SyncSettings::default(),
            store: StoreSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load from a JSON file. Missing keys take their defaults.
    ///
    /// # Errors
    /// - File cannot be read
    /// - File is not valid JSON
    /// - Resulting configuration fails [`AppConfig::validate`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());
        let data = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise use defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            debug!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Write as pretty JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Record `version` in the file at `path`, keeping every other setting.
    ///
    /// Writes a default configuration carrying `version` when no file exists.
    pub fn save_version(path: impl AsRef<Path>, version: &VersionTag) -> Result<()> {
        let path = path.as_ref();
        let mut config = Self::load_or_default(path)?;
        config.version = version.to_string();
        config.save(path)?;
        debug!("Recorded version {} in {}", version, path.display());
        Ok(())
    }

    /// Check every field that would otherwise fail at first use.
    pub fn validate(&self) -> Result<()> {
        self.version_tag()?;
        self.cache.manifest_urls()?;
        self.cache.resolve(&self.cache.offline_page)?;
        self.cache.resolve(&self.cache.placeholder_image)?;
        self.sync_endpoint()?;
        if self.store.backend.is_empty() {
            return Err(Error::Config("Store backend must not be empty".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be positive".to_string()));
        }
        Ok(())
    }

    pub fn version_tag(&self) -> Result<VersionTag> {
        VersionTag::new(self.version.as_str())
            .map_err(|e| Error::Config(format!("Invalid version tag: {}", e)))
    }

    pub fn sync_endpoint(&self) -> Result<Url> {
        self.cache.resolve(&self.sync.endpoint)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Database path, falling back to the platform data directory.
    pub fn database_path(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| default_data_dir().join(DATABASE_FILENAME))
    }

    /// Backend configuration handed to the store registry.
    pub fn store_config(&self) -> Value {
        json!({ "path": self.database_path() })
    }
}

/// Platform data directory for Lantern.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lantern")
}
