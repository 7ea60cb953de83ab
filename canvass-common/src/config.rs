//! Configuration loading
//!
//! Bootstrap configuration comes from a TOML file, resolved in priority order:
//! 1. Command-line `--config` path (highest priority)
//! 2. `CANVASS_CONFIG` environment variable
//! 3. `~/.config/canvass/config.toml`, then `/etc/canvass/config.toml`
//! 4. Compiled defaults (fallback, with a warning)
//!
//! Secrets and the database path can additionally be overridden from the
//! environment after the file is loaded.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const CONFIG_ENV_VAR: &str = "CANVASS_CONFIG";
pub const DATABASE_ENV_VAR: &str = "CANVASS_DATABASE_PATH";
pub const SHEETS_TOKEN_ENV_VAR: &str = "CANVASS_SHEETS_TOKEN";
pub const COVERAGE_KEY_ENV_VAR: &str = "CANVASS_COVERAGE_API_KEY";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// UTC offset (whole hours) used when rendering timestamps into spreadsheets
    pub timezone_offset_hours: i32,

    pub logging: LoggingConfig,
    pub photos: PhotoConfig,
    pub sheets: SheetsConfig,
    pub coverage: CoverageConfig,
    pub reconcile: ReconcileConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            timezone_offset_hours: 7,
            logging: LoggingConfig::default(),
            photos: PhotoConfig::default(),
            sheets: SheetsConfig::default(),
            coverage: CoverageConfig::default(),
            reconcile: ReconcileConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Public photo URL template: `{api_url}/{path_prefix}/submissions/{id}/photos/{filename}`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PhotoConfig {
    pub api_url: String,
    /// Environment-dependent prefix; may be empty
    pub path_prefix: String,
}

impl Default for PhotoConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3000".to_string(),
            path_prefix: "api".to_string(),
        }
    }
}

/// Spreadsheet service and mirror destinations
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SheetsConfig {
    pub base_url: String,
    /// Bearer token for the spreadsheet API (override: `CANVASS_SHEETS_TOKEN`)
    pub access_token: Option<String>,
    pub all_spreadsheet_id: String,
    /// Append range of the all-operators mirror
    pub all_range: String,
    pub fs_spreadsheet_id: String,
    /// Append range of the FS mirror
    pub fs_range: String,
    /// Identifier column of the FS mirror, read in bulk to locate rows for status backfill
    pub status_id_range: String,
    /// First of the three status columns (coverage status, homepassed id, operator remarks)
    pub status_first_column: String,
    pub request_timeout_secs: u64,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://sheets.googleapis.com".to_string(),
            access_token: None,
            all_spreadsheet_id: String::new(),
            all_range: "Submissions!A:K".to_string(),
            fs_spreadsheet_id: String::new(),
            fs_range: "FS!A:J".to_string(),
            status_id_range: "FS!A:A".to_string(),
            status_first_column: "K".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Coverage-check service
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CoverageConfig {
    pub base_url: String,
    /// Static API key (override: `CANVASS_COVERAGE_API_KEY`)
    pub api_key: Option<String>,
    pub api_key_header: String,
    pub request_timeout_secs: u64,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_key: None,
            api_key_header: "x-api-key".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Reconciler timers and batch limits
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub enabled: bool,
    pub unregistered_interval_secs: u64,
    pub coverage_status_interval_secs: u64,
    pub mirror_enabled: bool,
    pub mirror_interval_secs: u64,
    /// Maximum submissions processed per reconciler run
    pub batch_size: u32,
    /// How long a claimed submission stays invisible to other runs
    pub lease_secs: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            unregistered_interval_secs: 15 * 60,
            coverage_status_interval_secs: 5 * 60,
            mirror_enabled: true,
            mirror_interval_secs: 15 * 60,
            batch_size: 10,
            lease_secs: 10 * 60,
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Resolve, load and apply environment overrides.
    ///
    /// An explicitly requested file (CLI or `CANVASS_CONFIG`) must exist. When
    /// no file is found in the standard locations the compiled defaults are used.
    pub fn load_resolved(cli_path: Option<&Path>) -> Result<Self> {
        let explicit = cli_path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => {
                let config = Self::load(&path)?;
                info!("Loaded configuration from {}", path.display());
                config
            }
            None => match standard_config_path() {
                Some(path) => {
                    let config = Self::load(&path)?;
                    info!("Loaded configuration from {}", path.display());
                    config
                }
                None => {
                    warn!("No configuration file found, using compiled defaults");
                    Self::default()
                }
            },
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Override the database path and secrets from environment variables
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var(DATABASE_ENV_VAR) {
            if !path.trim().is_empty() {
                self.database_path = PathBuf::from(path);
            }
        }
        if let Ok(token) = std::env::var(SHEETS_TOKEN_ENV_VAR) {
            if !token.trim().is_empty() {
                self.sheets.access_token = Some(token);
            }
        }
        if let Ok(key) = std::env::var(COVERAGE_KEY_ENV_VAR) {
            if !key.trim().is_empty() {
                self.coverage.api_key = Some(key);
            }
        }
    }
}

/// First existing config file among the standard locations
fn standard_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("canvass").join("config.toml"));
    let system_config = PathBuf::from("/etc/canvass/config.toml");

    user_config
        .into_iter()
        .chain(std::iter::once(system_config))
        .find(|p| p.exists())
}

/// OS-dependent default database location
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("canvass"))
        .unwrap_or_else(|| PathBuf::from("./canvass_data"))
        .join("canvass.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.timezone_offset_hours, 7);
        assert_eq!(config.reconcile.batch_size, 10);
        assert_eq!(config.reconcile.unregistered_interval_secs, 900);
        assert_eq!(config.reconcile.coverage_status_interval_secs, 300);
        assert_eq!(config.coverage.api_key_header, "x-api-key");
        assert!(config.database_path.ends_with("canvass.db"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            database_path = "/var/lib/canvass/test.db"

            [reconcile]
            batch_size = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/var/lib/canvass/test.db"));
        assert_eq!(config.reconcile.batch_size, 3);
        assert_eq!(config.reconcile.lease_secs, 600);
        assert_eq!(config.sheets.status_first_column, "K");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let result = TomlConfig::from_toml_str("reconcile = [");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
