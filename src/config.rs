//! Configuration management with validation and defaults
//!
//! Loaded from TOML, then overridden by `POINTVAULT_*` environment variables.

use crate::errors::{ConfigurationError, RewardsResult};
use crate::games::types::{GameKind, GameSettings};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Top-level service configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardsConfig {
    pub cleanup: CleanupConfig,
    pub storage: StorageConfig,
    pub api: ApiConfig,
    pub games: GamesConfig,
    pub monitoring: MonitoringConfig,
}

/// Stale game cleanup job settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub enabled: bool,
    /// How often the scanner runs
    pub interval_secs: u64,
    /// Games older than this are considered abandoned
    pub stale_after_secs: u64,
    /// Upper bound on settlements in flight at once
    pub max_concurrency: usize,
    /// Candidates fetched per game kind per run
    pub batch_limit: usize,
    pub store_timeout_ms: u64,
    pub notify_timeout_ms: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 15 * 60,
            stale_after_secs: 30 * 60,
            max_concurrency: 4,
            batch_limit: 500,
            store_timeout_ms: 10_000,
            notify_timeout_ms: 5_000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Persistent RocksDB store
    Rocks,
    /// Process-local store, lost on restart
    Memory,
}

/// Storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_directory: String,
    pub write_buffer_size_mb: usize,
    /// Whether to clear database on startup (testing only!)
    pub clear_on_start: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Rocks,
            data_directory: "./DB/pointvault".to_string(),
            write_buffer_size_mb: 64,
            clear_on_start: false,
        }
    }
}

/// HTTP API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
        }
    }
}

/// Initial per-game wager limits, written to the settings table when absent
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GamesConfig {
    pub roulette: GameSettings,
    pub blackjack: GameSettings,
    pub mines: GameSettings,
}

impl Default for GamesConfig {
    fn default() -> Self {
        Self {
            roulette: GameSettings::default(),
            blackjack: GameSettings::default(),
            mines: GameSettings::default(),
        }
    }
}

impl GamesConfig {
    pub fn for_kind(&self, kind: GameKind) -> &GameSettings {
        match kind {
            GameKind::Roulette => &self.roulette,
            GameKind::Blackjack => &self.blackjack,
            GameKind::Mines => &self.mines,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enable_metrics: bool,
    /// Fallback filter when RUST_LOG is unset
    pub log_filter: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: true,
            log_filter: "pointvault=info,tower_http=info".to_string(),
        }
    }
}

impl RewardsConfig {
    /// Persistent store, standard cleanup cadence
    pub fn production() -> Self {
        Self::default()
    }

    /// In-memory store with a fast cleanup loop
    pub fn testing() -> Self {
        Self {
            cleanup: CleanupConfig {
                interval_secs: 1,
                stale_after_secs: 30 * 60,
                ..Default::default()
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                clear_on_start: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Validate configuration for logical consistency
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.cleanup.interval_secs == 0 {
            return Err(invalid("cleanup.interval_secs", "0", "interval must be > 0"));
        }
        if self.cleanup.stale_after_secs == 0 {
            return Err(invalid("cleanup.stale_after_secs", "0", "threshold must be > 0"));
        }
        if self.cleanup.max_concurrency == 0 {
            return Err(invalid("cleanup.max_concurrency", "0", "concurrency must be > 0"));
        }
        if self.cleanup.batch_limit == 0 {
            return Err(invalid("cleanup.batch_limit", "0", "batch limit must be > 0"));
        }
        if self.storage.backend == StorageBackend::Rocks && self.storage.data_directory.is_empty() {
            return Err(ConfigurationError::MissingRequired(
                "storage.data_directory".to_string(),
            ));
        }
        if self.api.enabled && self.api.port == 0 {
            return Err(invalid(
                "api.port",
                "0",
                "API port cannot be zero when API is enabled",
            ));
        }
        for kind in GameKind::ALL {
            let settings = self.games.for_kind(kind);
            if settings.min_bet <= 0 {
                return Err(invalid(
                    &format!("games.{}.min_bet", kind),
                    &settings.min_bet.to_string(),
                    "minimum bet must be positive",
                ));
            }
            if settings.max_bet < settings.min_bet {
                return Err(ConfigurationError::ValidationFailed(format!(
                    "games.{}: max_bet {} is below min_bet {}",
                    kind, settings.max_bet, settings.min_bet
                )));
            }
        }
        Ok(())
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup.interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.cleanup.stale_after_secs)
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Configuration loader with environment variable support
#[derive(Default)]
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> RewardsResult<RewardsConfig> {
        let mut config = match self.config_path {
            Some(ref path) => self.load_from_file(path)?,
            None => RewardsConfig::default(),
        };

        self.apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> RewardsResult<RewardsConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e))
        })?;

        toml::from_str(&content).map_err(|e| {
            ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)).into()
        })
    }

    fn apply_env_overrides(&self, config: &mut RewardsConfig) -> RewardsResult<()> {
        if let Ok(dir) = env::var("POINTVAULT_DATA_DIR") {
            config.storage.data_directory = dir;
        }
        if let Ok(port) = env::var("POINTVAULT_API_PORT") {
            config.api.port = parse_env("POINTVAULT_API_PORT", port)?;
        }
        if let Ok(secs) = env::var("POINTVAULT_CLEANUP_INTERVAL_SECS") {
            config.cleanup.interval_secs = parse_env("POINTVAULT_CLEANUP_INTERVAL_SECS", secs)?;
        }
        if let Ok(secs) = env::var("POINTVAULT_STALE_AFTER_SECS") {
            config.cleanup.stale_after_secs = parse_env("POINTVAULT_STALE_AFTER_SECS", secs)?;
        }
        if let Ok(enabled) = env::var("POINTVAULT_CLEANUP_ENABLED") {
            config.cleanup.enabled = parse_env("POINTVAULT_CLEANUP_ENABLED", enabled)?;
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, config: &RewardsConfig, path: &str) -> RewardsResult<()> {
        let toml_string = toml::to_string_pretty(config).map_err(|e| {
            ConfigurationError::SaveFailed(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path, toml_string).map_err(|e| {
            ConfigurationError::SaveFailed(format!("Failed to write to {}: {}", path, e)).into()
        })
    }
}

fn parse_env<T: std::str::FromStr>(field: &str, value: String) -> RewardsResult<T> {
    value.parse().map_err(|_| {
        ConfigurationError::InvalidValue {
            field: field.to_string(),
            value,
            reason: "could not parse".to_string(),
        }
        .into()
    })
}
