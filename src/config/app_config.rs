use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::DEFAULT_CAPACITY_BYTES;
use crate::rollup::RollupPolicy;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "AR_METRICS_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG: &str = "ar_metrics.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Service configuration.
///
/// Load with `AppConfig::load()` which searches:
/// 1. `$AR_METRICS_CONFIG` env var
/// 2. `./ar_metrics.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// Sample store location
    #[serde(default)]
    pub store: StoreConfig,

    /// Rendered report cache
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub rollup: RollupConfig,

    /// API key → tenant database mapping
    #[serde(default)]
    pub tenants: Vec<TenantConfig>,
}

impl AppConfig {
    /// Load configuration using the standard search order.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), tenants = config.tenants.len(), "Loaded config from {}", CONFIG_ENV);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV);
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(tenants = config.tenants.len(), "Loaded config from ./{}", LOCAL_CONFIG);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG);
                }
            }
        }

        info!("No {} found, using built-in defaults", LOCAL_CONFIG);
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, err) => ConfigError::Parse(path.to_path_buf(), err),
            other => other,
        })
    }

    /// Parse and validate TOML text. Unknown keys are logged, not rejected.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }
        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate values that deserialize fine but cannot run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.server.addr.parse::<SocketAddr>().is_err() {
            errors.push(format!("server.addr: '{}' is not a socket address", self.server.addr));
        }
        if self.store.collection.trim().is_empty() {
            errors.push("store.collection: must not be empty".to_string());
        }
        if self.cache.enabled {
            if self.cache.shards == 0 {
                errors.push("cache.shards: must be at least 1".to_string());
            }
            if self.cache.capacity_bytes == 0 {
                errors.push("cache.capacity_bytes: must be greater than 0".to_string());
            }
        }

        let mut seen_keys = HashSet::new();
        for (i, tenant) in self.tenants.iter().enumerate() {
            if tenant.name.trim().is_empty() {
                errors.push(format!("tenants[{i}].name: must not be empty"));
            }
            if tenant.database.trim().is_empty() {
                errors.push(format!("tenants[{i}].database: must not be empty"));
            }
            for key in &tenant.api_keys {
                if key.trim().is_empty() {
                    errors.push(format!("tenants[{i}].api_keys: empty key"));
                } else if !seen_keys.insert(key.as_str()) {
                    errors.push(format!("tenants[{i}].api_keys: key already assigned to another tenant"));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_addr")]
    pub addr: String,

    /// Gzip-compress responses when the client accepts it
    #[serde(default = "default_true")]
    pub gzip: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            gzip: true,
        }
    }
}

fn default_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// sled data directory
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Collection holding per-site daily samples
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            collection: default_collection(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./data/ar_metrics")
}

fn default_collection() -> String {
    "sites".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Byte budget shared by all shards
    #[serde(default = "default_capacity")]
    pub capacity_bytes: usize,

    #[serde(default = "default_shards")]
    pub shards: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity_bytes: default_capacity(),
            shards: default_shards(),
        }
    }
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY_BYTES
}

fn default_shards() -> usize {
    16
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollupConfig {
    #[serde(default)]
    pub policy: RollupPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    pub name: String,
    /// Database holding this tenant's samples
    pub database: String,
    #[serde(default)]
    pub api_keys: Vec<String>,
}
