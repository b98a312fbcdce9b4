//! Application configuration.
//!
//! Settings come from an optional `config.toml` plus environment overrides
//! (a `.env` file is honored via `dotenvy`). Everything has a sensible
//! default so the crate runs with no configuration at all.

/// Default category seed loading from config.toml
pub mod categories;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::errors::{Error, Result};
pub use categories::CategorySeed;

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const DEFAULT_CACHE_DIR: &str = "data/cache";
const DEFAULT_RESOLVE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_LOAD_TIMEOUT_SECS: u64 = 10;

/// Raw `config.toml` shape.
#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    cache_dir: Option<PathBuf>,
    resolve_timeout_secs: Option<u64>,
    load_timeout_secs: Option<u64>,
    default_currency: Option<String>,
    #[serde(default)]
    categories: Vec<CategorySeed>,
}

/// Resolved application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory holding the persisted per-user collection cache.
    pub cache_dir: PathBuf,
    /// Hard bound on identity/profile resolution.
    pub resolve_timeout: Duration,
    /// Hard bound on waiting for the first remote snapshots.
    pub load_timeout: Duration,
    /// Currency assumed when a profile carries no preference.
    pub default_currency: String,
    /// Category seed for brand-new users.
    pub default_categories: Vec<CategorySeed>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            resolve_timeout: Duration::from_secs(DEFAULT_RESOLVE_TIMEOUT_SECS),
            load_timeout: Duration::from_secs(DEFAULT_LOAD_TIMEOUT_SECS),
            default_currency: "USD".to_string(),
            default_categories: categories::builtin_seed(),
        }
    }
}

impl AppConfig {
    /// Parses a `config.toml` at the given path, falling back to defaults
    /// for anything the file leaves out.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
            message: format!("Failed to read config file: {e}"),
        })?;
        let file: FileConfig = toml::from_str(&contents).map_err(|e| Error::Config {
            message: format!("Failed to parse config file: {e}"),
        })?;
        Ok(Self::from_parts(file))
    }

    fn from_parts(file: FileConfig) -> Self {
        let defaults = Self::default();
        Self {
            cache_dir: file.cache_dir.unwrap_or(defaults.cache_dir),
            resolve_timeout: file
                .resolve_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.resolve_timeout),
            load_timeout: file
                .load_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.load_timeout),
            default_currency: file.default_currency.unwrap_or(defaults.default_currency),
            default_categories: if file.categories.is_empty() {
                defaults.default_categories
            } else {
                file.categories
            },
        }
    }
}

/// Loads the application configuration: `.env`, then `config.toml` (path
/// overridable through `SPENDO_CONFIG`), then environment overrides.
///
/// # Errors
/// Returns an error if a config file exists but cannot be read or parsed.
pub fn load_app_configuration() -> Result<AppConfig> {
    dotenvy::dotenv().ok();

    let path = std::env::var("SPENDO_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let mut config = if Path::new(&path).exists() {
        info!("Loading configuration from {path}");
        AppConfig::from_file(&path)?
    } else {
        debug!("No config file at {path}, using defaults");
        AppConfig::default()
    };

    if let Ok(dir) = std::env::var("SPENDO_CACHE_DIR") {
        config.cache_dir = PathBuf::from(dir);
    }

    Ok(config)
}
