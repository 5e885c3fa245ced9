use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{anyhow, Result};
use log::{info, warn};
use nodeshare_common::{
    config::DEFAULT_MIN_WITHDRAWAL_USD,
    logger::LogLevel,
    referral::{default_member_levels, MemberLevelConfig},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{
    engine::EngineConfig,
    registry::MemberLevelRegistry,
    storage::rocksdb::{CacheMode, CompressionMode},
};

/// Default values for configuration
pub mod defaults {
    use super::*;

    pub const LOG_LEVEL: LogLevel = LogLevel::Info;
    pub const FILENAME_LOG: &str = "nodeshare-ledger.log";
    pub const LOGS_PATH: &str = "logs/";
    pub const STORAGE_PATH: &str = "storage/";

    pub const LOCK_TIMEOUT_MS: u64 = 5_000;
    pub const MAX_RETRIES: u32 = 3;
    pub const RETRY_DELAY_MS: u64 = 250;

    // RocksDB
    pub const PARALLELISM: usize = 4;
    pub const MAX_BACKGROUND_JOBS: usize = 4;
    pub const MAX_SUBCOMPACTION_JOBS: usize = 2;
    pub const LOW_PRIORITY_BACKGROUND_THREADS: usize = 2;
    pub const MAX_OPEN_FILES: i32 = 1024;
    pub const KEEP_MAX_LOG_FILES: usize = 4;
    pub const CACHE_SIZE: u64 = 64 * 1024 * 1024;
    pub const WRITE_BUFFER_SIZE: u64 = 64 * 1024 * 1024;

    // Validation limits
    pub const MIN_LOCK_TIMEOUT_MS: u64 = 10;
    pub const MAX_LOCK_TIMEOUT_MS: u64 = 600_000;
    pub const MAX_RETRIES_LIMIT: u32 = 10;
    pub const MAX_RETRY_DELAY_MS: u64 = 30_000;

    pub const AUTO_FIX_CONFIG: bool = true;
    pub const STRICT_VALIDATION: bool = false;
}

#[derive(Debug, Clone, clap::Args, Serialize, Deserialize)]
pub struct RocksDBConfig {
    /// Number of threads used by RocksDB
    #[clap(long = "rocksdb-parallelism", default_value_t = defaults::PARALLELISM)]
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    #[clap(long = "rocksdb-max-background-jobs", default_value_t = defaults::MAX_BACKGROUND_JOBS)]
    #[serde(default = "default_max_background_jobs")]
    pub max_background_jobs: usize,

    #[clap(long = "rocksdb-max-subcompaction-jobs", default_value_t = defaults::MAX_SUBCOMPACTION_JOBS)]
    #[serde(default = "default_max_subcompaction_jobs")]
    pub max_subcompaction_jobs: usize,

    #[clap(long = "rocksdb-low-priority-background-threads", default_value_t = defaults::LOW_PRIORITY_BACKGROUND_THREADS)]
    #[serde(default = "default_low_priority_background_threads")]
    pub low_priority_background_threads: usize,

    /// -1 keeps every file open
    #[clap(long = "rocksdb-max-open-files", default_value_t = defaults::MAX_OPEN_FILES, allow_negative_numbers = true)]
    #[serde(default = "default_max_open_files")]
    pub max_open_files: i32,

    #[clap(long = "rocksdb-keep-max-log-files", default_value_t = defaults::KEEP_MAX_LOG_FILES)]
    #[serde(default = "default_keep_max_log_files")]
    pub keep_max_log_files: usize,

    #[clap(long = "rocksdb-compression-mode", value_enum, default_value_t = CompressionMode::default())]
    #[serde(default)]
    pub compression_mode: CompressionMode,

    #[clap(long = "rocksdb-cache-mode", value_enum, default_value_t = CacheMode::default())]
    #[serde(default)]
    pub cache_mode: CacheMode,

    /// Block cache size in bytes
    #[clap(long = "rocksdb-cache-size", default_value_t = defaults::CACHE_SIZE)]
    #[serde(default = "default_cache_size")]
    pub cache_size: u64,

    #[clap(long = "rocksdb-write-buffer-size", default_value_t = defaults::WRITE_BUFFER_SIZE)]
    #[serde(default = "default_write_buffer_size")]
    pub write_buffer_size: u64,

    /// Share the write buffer between every column
    #[clap(long = "rocksdb-write-buffer-shared")]
    #[serde(default)]
    pub write_buffer_shared: bool,

    /// fsync every commit
    #[clap(long = "rocksdb-sync-writes")]
    #[serde(default)]
    pub sync_writes: bool,
}

impl RocksDBConfig {
    /// Small footprint for tests
    pub fn for_tests() -> Self {
        Self {
            parallelism: 2,
            max_background_jobs: 2,
            max_subcompaction_jobs: 1,
            low_priority_background_threads: 1,
            max_open_files: 100,
            keep_max_log_files: 1,
            compression_mode: CompressionMode::None,
            cache_mode: CacheMode::None,
            cache_size: 1024 * 1024,
            write_buffer_size: 1024 * 1024,
            write_buffer_shared: false,
            sync_writes: false,
        }
    }
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            parallelism: defaults::PARALLELISM,
            max_background_jobs: defaults::MAX_BACKGROUND_JOBS,
            max_subcompaction_jobs: defaults::MAX_SUBCOMPACTION_JOBS,
            low_priority_background_threads: defaults::LOW_PRIORITY_BACKGROUND_THREADS,
            max_open_files: defaults::MAX_OPEN_FILES,
            keep_max_log_files: defaults::KEEP_MAX_LOG_FILES,
            compression_mode: CompressionMode::default(),
            cache_mode: CacheMode::default(),
            cache_size: defaults::CACHE_SIZE,
            write_buffer_size: defaults::WRITE_BUFFER_SIZE,
            write_buffer_shared: false,
            sync_writes: false,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, clap::ValueEnum, Serialize, Deserialize)]
#[clap(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Rocksdb,
    // Nothing survives the process
    Memory,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    #[serde(default)]
    pub disable_file_logging: bool,

    #[serde(default)]
    pub disable_file_log_date_based: bool,

    #[serde(default)]
    pub disable_log_color: bool,

    #[serde(default = "default_filename_log")]
    pub filename_log: String,

    #[serde(default = "default_logs_path")]
    pub logs_path: String,

    #[serde(default)]
    pub storage_backend: StorageBackend,

    #[serde(default = "default_storage_path")]
    pub storage_path: String,

    #[serde(default)]
    pub rocksdb: RocksDBConfig,

    /// Deadline for acquiring the wallet locks of one mutation
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Withdrawals worth less than this are refused
    #[serde(default = "default_min_withdrawal_usd")]
    pub min_withdrawal_usd: Decimal,

    /// Whole-operation retries on retryable errors
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Seeds the member level table of an empty store
    #[serde(default = "default_member_levels")]
    pub levels: Vec<MemberLevelConfig>,

    /// Repair out-of-range values instead of rejecting them
    #[serde(default = "default_auto_fix_config")]
    pub auto_fix_config: bool,

    #[serde(default = "default_strict_validation")]
    pub strict_validation: bool,
}

fn default_log_level() -> LogLevel {
    defaults::LOG_LEVEL
}
fn default_filename_log() -> String {
    defaults::FILENAME_LOG.to_string()
}
fn default_logs_path() -> String {
    defaults::LOGS_PATH.to_string()
}
fn default_storage_path() -> String {
    defaults::STORAGE_PATH.to_string()
}
fn default_lock_timeout_ms() -> u64 {
    defaults::LOCK_TIMEOUT_MS
}
fn default_min_withdrawal_usd() -> Decimal {
    Decimal::from(DEFAULT_MIN_WITHDRAWAL_USD)
}
fn default_max_retries() -> u32 {
    defaults::MAX_RETRIES
}
fn default_retry_delay_ms() -> u64 {
    defaults::RETRY_DELAY_MS
}
fn default_parallelism() -> usize {
    defaults::PARALLELISM
}
fn default_max_background_jobs() -> usize {
    defaults::MAX_BACKGROUND_JOBS
}
fn default_max_subcompaction_jobs() -> usize {
    defaults::MAX_SUBCOMPACTION_JOBS
}
fn default_low_priority_background_threads() -> usize {
    defaults::LOW_PRIORITY_BACKGROUND_THREADS
}
fn default_max_open_files() -> i32 {
    defaults::MAX_OPEN_FILES
}
fn default_keep_max_log_files() -> usize {
    defaults::KEEP_MAX_LOG_FILES
}
fn default_cache_size() -> u64 {
    defaults::CACHE_SIZE
}
fn default_write_buffer_size() -> u64 {
    defaults::WRITE_BUFFER_SIZE
}
fn default_auto_fix_config() -> bool {
    defaults::AUTO_FIX_CONFIG
}
fn default_strict_validation() -> bool {
    defaults::STRICT_VALIDATION
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            disable_file_logging: false,
            disable_file_log_date_based: false,
            disable_log_color: false,
            filename_log: default_filename_log(),
            logs_path: default_logs_path(),
            storage_backend: StorageBackend::default(),
            storage_path: default_storage_path(),
            rocksdb: RocksDBConfig::default(),
            lock_timeout_ms: default_lock_timeout_ms(),
            min_withdrawal_usd: default_min_withdrawal_usd(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            levels: default_member_levels(),
            auto_fix_config: default_auto_fix_config(),
            strict_validation: default_strict_validation(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ConfigValidationError {
    #[error("Invalid {field}: {value} - must be between {min} and {max}")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("Invalid min_withdrawal_usd: {0} - must not be negative")]
    NegativeMinimum(Decimal),

    #[error("Invalid member levels: {0}")]
    InvalidLevels(String),

    #[error("Invalid {field}: '{path}' - {reason}")]
    InvalidPath {
        field: &'static str,
        path: String,
        reason: String,
    },
}

pub type ValidationResult<T> = std::result::Result<T, ConfigValidationError>;

pub struct ConfigValidator {
    strict_mode: bool,
    auto_fix: bool,
}

impl ConfigValidator {
    pub fn new(strict_mode: bool, auto_fix: bool) -> Self {
        Self {
            strict_mode,
            auto_fix,
        }
    }

    fn can_fix(&self) -> bool {
        self.auto_fix && !self.strict_mode
    }

    /// Validate the whole configuration, fixing what can be fixed.
    /// Returns the fixes and warnings applied.
    pub fn validate(&self, config: &mut LedgerConfig) -> Result<Vec<String>> {
        let mut warnings = Vec::new();
        let mut fixed_issues = Vec::new();

        if let Err(e) = check_range(
            "lock_timeout_ms",
            config.lock_timeout_ms,
            defaults::MIN_LOCK_TIMEOUT_MS,
            defaults::MAX_LOCK_TIMEOUT_MS,
        ) {
            if !self.can_fix() {
                return Err(anyhow!("Configuration validation failed: {}", e));
            }
            config.lock_timeout_ms = defaults::LOCK_TIMEOUT_MS;
            fixed_issues.push(format!("Fixed lock timeout to {} ms", config.lock_timeout_ms));
        }

        if let Err(e) = check_range(
            "max_retries",
            config.max_retries as u64,
            0,
            defaults::MAX_RETRIES_LIMIT as u64,
        ) {
            if !self.can_fix() {
                return Err(anyhow!("Configuration validation failed: {}", e));
            }
            config.max_retries = defaults::MAX_RETRIES;
            fixed_issues.push(format!("Fixed max retries to {}", config.max_retries));
        }

        if let Err(e) = check_range(
            "retry_delay_ms",
            config.retry_delay_ms,
            0,
            defaults::MAX_RETRY_DELAY_MS,
        ) {
            if !self.can_fix() {
                return Err(anyhow!("Configuration validation failed: {}", e));
            }
            config.retry_delay_ms = defaults::RETRY_DELAY_MS;
            fixed_issues.push(format!("Fixed retry delay to {} ms", config.retry_delay_ms));
        }

        if config.min_withdrawal_usd.is_sign_negative() {
            let e = ConfigValidationError::NegativeMinimum(config.min_withdrawal_usd);
            if !self.can_fix() {
                return Err(anyhow!("Configuration validation failed: {}", e));
            }
            config.min_withdrawal_usd = default_min_withdrawal_usd();
            fixed_issues.push(format!(
                "Fixed minimum withdrawal to {} USD",
                config.min_withdrawal_usd
            ));
        }

        // a broken tier table is never replaced silently
        if let Err(e) = MemberLevelRegistry::new(config.levels.clone()) {
            return Err(anyhow!(
                "Configuration validation failed: {}",
                ConfigValidationError::InvalidLevels(e.to_string())
            ));
        }

        if config.max_retries == 0 {
            warnings.push("Retries are disabled, lock timeouts surface directly".to_string());
        }

        if !config.disable_file_logging {
            ensure_directory_exists("logs_path", &config.logs_path, &mut fixed_issues)?;
        }
        match config.storage_backend {
            StorageBackend::Rocksdb => {
                ensure_directory_exists("storage_path", &config.storage_path, &mut fixed_issues)?
            }
            StorageBackend::Memory => {
                warnings.push("In-memory storage selected, nothing will be persisted".to_string())
            }
        }

        for fix in &fixed_issues {
            if log::log_enabled!(log::Level::Info) {
                info!("Config fix: {}", fix);
            }
        }
        for warning in &warnings {
            if log::log_enabled!(log::Level::Warn) {
                warn!("Config warning: {}", warning);
            }
        }

        let mut messages = fixed_issues;
        messages.extend(warnings);
        Ok(messages)
    }
}

fn check_range(field: &'static str, value: u64, min: u64, max: u64) -> ValidationResult<()> {
    if value < min || value > max {
        return Err(ConfigValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn ensure_directory_exists(
    field: &'static str,
    path: &str,
    fixed_issues: &mut Vec<String>,
) -> Result<()> {
    let path_buf = PathBuf::from(path);

    if !path_buf.exists() {
        std::fs::create_dir_all(&path_buf)
            .map_err(|e| anyhow!("Failed to create {} directory '{}': {}", field, path, e))?;
        fixed_issues.push(format!("Created {} directory: {}", field, path));
    } else if !path_buf.is_dir() {
        return Err(ConfigValidationError::InvalidPath {
            field,
            path: path.to_string(),
            reason: "exists but is not a directory".to_string(),
        }
        .into());
    }

    Ok(())
}

impl LedgerConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            lock_timeout: self.lock_timeout(),
            min_withdrawal_usd: self.min_withdrawal_usd,
            levels: self.levels.clone(),
        }
    }

    /// Load and validate a JSON configuration file.
    /// The flags can only tighten the file: strict mode applies when either
    /// side asks for it, auto-fix only when both allow it.
    pub fn from_file<P: AsRef<Path>>(path: P, strict_mode: bool, auto_fix: bool) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            anyhow!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            )
        })?;

        let mut config: LedgerConfig = serde_json::from_str(&content).map_err(|e| {
            anyhow!(
                "Failed to parse config file '{}': {}",
                path.as_ref().display(),
                e
            )
        })?;

        config.strict_validation |= strict_mode;
        config.auto_fix_config &= auto_fix;

        let validator = ConfigValidator::new(config.strict_validation, config.auto_fix_config);
        validator.validate(&mut config)?;

        Ok(config)
    }

    /// Write the default configuration with a short description header
    pub fn generate_template<P: AsRef<Path>>(path: P) -> Result<()> {
        let mut template = serde_json::to_value(LedgerConfig::default())?;
        if let Some(map) = template.as_object_mut() {
            map.insert(
                "_info".to_string(),
                serde_json::json!({
                    "description": "NodeShare commission ledger configuration",
                    "sections": {
                        "logging": "log_level, file logging and colors",
                        "storage": "backend, path and RocksDB tuning",
                        "ledger": "lock timeout, retries and minimum withdrawal",
                        "levels": "member tier table used when the store is empty"
                    }
                }),
            );
        }

        let content = serde_json::to_string_pretty(&template)?;
        std::fs::write(&path, content).map_err(|e| {
            anyhow!(
                "Failed to write template to '{}': {}",
                path.as_ref().display(),
                e
            )
        })?;

        if log::log_enabled!(log::Level::Info) {
            info!(
                "Configuration template generated at: {}",
                path.as_ref().display()
            );
        }
        Ok(())
    }
}
