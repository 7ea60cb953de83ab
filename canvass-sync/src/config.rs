//! Runtime settings for canvass-sync
//!
//! Validated view of the bootstrap [`TomlConfig`]: secrets present, spreadsheet
//! targets named, intervals and batch size usable. Everything here is fixed for
//! the lifetime of the process.

use crate::error::{SyncError, SyncResult};
use crate::photos::PhotoUrlTemplate;
use crate::sheets::{a1, MirrorTargets, SheetTarget, StatusTarget};
use canvass_common::config::{
    ReconcileConfig, TomlConfig, COVERAGE_KEY_ENV_VAR, SHEETS_TOKEN_ENV_VAR,
};
use canvass_common::time::offset_from_hours;
use chrono::FixedOffset;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SheetsSettings {
    pub base_url: String,
    pub access_token: String,
    pub timeout: Duration,
    pub targets: MirrorTargets,
}

#[derive(Debug, Clone)]
pub struct CoverageSettings {
    pub base_url: String,
    pub api_key: String,
    pub api_key_header: String,
    pub timeout: Duration,
}

/// Upper bound on submissions processed per reconciler pass
pub const MAX_BATCH_SIZE: u32 = 10;

/// Longest lease a claim may hold
pub const MAX_LEASE_SECS: u64 = 24 * 60 * 60;

/// Reconciler schedule and batch limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileSettings {
    pub enabled: bool,
    pub unregistered_interval: Duration,
    pub coverage_status_interval: Duration,
    pub mirror_enabled: bool,
    pub mirror_interval: Duration,
    pub batch_size: u32,
    pub lease: Duration,
}

impl ReconcileSettings {
    pub fn from_config(config: &ReconcileConfig) -> SyncResult<Self> {
        if config.batch_size == 0 || config.batch_size > MAX_BATCH_SIZE {
            return Err(SyncError::Config(format!(
                "reconcile.batch_size must be between 1 and {}, got {}",
                MAX_BATCH_SIZE, config.batch_size
            )));
        }
        if config.lease_secs > MAX_LEASE_SECS {
            return Err(SyncError::Config(format!(
                "reconcile.lease_secs must be at most {}, got {}",
                MAX_LEASE_SECS, config.lease_secs
            )));
        }
        for (name, secs) in [
            ("unregistered_interval_secs", config.unregistered_interval_secs),
            ("coverage_status_interval_secs", config.coverage_status_interval_secs),
            ("mirror_interval_secs", config.mirror_interval_secs),
            ("lease_secs", config.lease_secs),
        ] {
            if secs == 0 {
                return Err(SyncError::Config(format!("reconcile.{} must be greater than 0", name)));
            }
        }

        Ok(Self {
            enabled: config.enabled,
            unregistered_interval: Duration::from_secs(config.unregistered_interval_secs),
            coverage_status_interval: Duration::from_secs(config.coverage_status_interval_secs),
            mirror_enabled: config.mirror_enabled,
            mirror_interval: Duration::from_secs(config.mirror_interval_secs),
            batch_size: config.batch_size,
            lease: Duration::from_secs(config.lease_secs),
        })
    }
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            unregistered_interval: Duration::from_secs(15 * 60),
            coverage_status_interval: Duration::from_secs(5 * 60),
            mirror_enabled: true,
            mirror_interval: Duration::from_secs(15 * 60),
            batch_size: MAX_BATCH_SIZE,
            lease: Duration::from_secs(10 * 60),
        }
    }
}

/// Everything the sync service needs to run
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub database_path: PathBuf,
    pub offset: FixedOffset,
    pub photo_urls: PhotoUrlTemplate,
    pub sheets: SheetsSettings,
    pub coverage: CoverageSettings,
    pub reconcile: ReconcileSettings,
}

impl SyncSettings {
    pub fn from_toml(config: &TomlConfig) -> SyncResult<Self> {
        let offset = offset_from_hours(config.timezone_offset_hours).ok_or_else(|| {
            SyncError::Config(format!(
                "timezone_offset_hours {} is out of range",
                config.timezone_offset_hours
            ))
        })?;

        let sheets = &config.sheets;
        let access_token = secret(sheets.access_token.as_deref(), "sheets.access_token", SHEETS_TOKEN_ENV_VAR)?;
        let all_spreadsheet_id = required(&sheets.all_spreadsheet_id, "sheets.all_spreadsheet_id")?;
        let fs_spreadsheet_id = required(&sheets.fs_spreadsheet_id, "sheets.fs_spreadsheet_id")?;
        let all_range = required(&sheets.all_range, "sheets.all_range")?;
        let fs_range = required(&sheets.fs_range, "sheets.fs_range")?;
        let status_id_range = required(&sheets.status_id_range, "sheets.status_id_range")?;

        if a1::column_index(&sheets.status_first_column).is_none() {
            return Err(SyncError::Config(format!(
                "sheets.status_first_column '{}' is not a column label",
                sheets.status_first_column
            )));
        }
        // Indexed rows come from FS appends, so both ranges must address the same sheet
        if a1::sheet_name(&status_id_range) != a1::sheet_name(&fs_range) {
            return Err(SyncError::Config(format!(
                "sheets.status_id_range '{}' must be on the same sheet as sheets.fs_range '{}'",
                status_id_range, fs_range
            )));
        }

        let coverage = &config.coverage;
        let api_key = secret(coverage.api_key.as_deref(), "coverage.api_key", COVERAGE_KEY_ENV_VAR)?;

        Ok(Self {
            database_path: config.database_path.clone(),
            offset,
            photo_urls: PhotoUrlTemplate::from_config(&config.photos),
            sheets: SheetsSettings {
                base_url: sheets.base_url.clone(),
                access_token,
                timeout: Duration::from_secs(sheets.request_timeout_secs.max(1)),
                targets: MirrorTargets {
                    all: SheetTarget {
                        spreadsheet_id: all_spreadsheet_id,
                        range: all_range,
                    },
                    fs: SheetTarget {
                        spreadsheet_id: fs_spreadsheet_id.clone(),
                        range: fs_range,
                    },
                    status: StatusTarget {
                        spreadsheet_id: fs_spreadsheet_id,
                        id_range: status_id_range,
                        first_column: sheets.status_first_column.to_ascii_uppercase(),
                    },
                },
            },
            coverage: CoverageSettings {
                base_url: coverage.base_url.clone(),
                api_key,
                api_key_header: coverage.api_key_header.clone(),
                timeout: Duration::from_secs(coverage.request_timeout_secs.max(1)),
            },
            reconcile: ReconcileSettings::from_config(&config.reconcile)?,
        })
    }
}

fn required(value: &str, key: &str) -> SyncResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(SyncError::Config(format!("{} is not set", key)));
    }
    Ok(value.to_string())
}

fn secret(value: Option<&str>, key: &str, env_var: &str) -> SyncResult<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(SyncError::Config(format!("{} is not set (config file or {})", key, env_var))),
    }
}
