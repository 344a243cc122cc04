use crate::auth::Role;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_STORE_BACKEND: &str = "sea-orm";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Persistence backend: "sea-orm" or "in-memory"
    #[serde(default = "default_store_backend")]
    #[validate(custom = "validate_store_backend")]
    pub store_backend: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    #[validate(range(min = 1))]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB pool: connect timeout (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    /// DB pool: idle timeout (seconds)
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,

    /// Attempts for a write that lost an optimistic-concurrency race
    #[serde(default = "default_conflict_retry_attempts")]
    #[validate(range(min = 1, max = 10))]
    pub conflict_retry_attempts: u32,

    /// Initial backoff between conflict retries (milliseconds)
    #[serde(default = "default_conflict_retry_backoff_ms")]
    pub conflict_retry_backoff_ms: u64,

    /// Capacity of the domain event channel
    #[serde(default = "default_event_channel_capacity")]
    #[validate(range(min = 1))]
    pub event_channel_capacity: usize,

    /// Default page size for list endpoints
    #[serde(default = "default_api_page_size")]
    pub api_default_page_size: u64,

    /// Upper bound for caller-supplied page sizes
    #[serde(default = "default_api_max_page_size")]
    pub api_max_page_size: u64,

    /// Principals and project memberships loaded at startup
    #[serde(default)]
    pub directory: Vec<DirectoryEntry>,
}

/// One known principal and the projects they belong to.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct DirectoryEntry {
    pub id: Uuid,
    pub role: Role,
    #[serde(default)]
    pub projects: Vec<Uuid>,
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn uses_in_memory_store(&self) -> bool {
        self.store_backend == "in-memory"
    }

    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn retry_config(&self) -> crate::middleware_helpers::RetryConfig {
        crate::middleware_helpers::RetryConfig::new(
            self.conflict_retry_attempts,
            self.conflict_retry_backoff_ms,
        )
    }

    /// Clamps a caller-supplied page size into `1..=api_max_page_size`.
    pub fn page_size(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.api_default_page_size)
            .clamp(1, self.api_max_page_size.max(1))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://siteflow.db?mode=rwc".to_string(),
            store_backend: default_store_backend(),
            host: "0.0.0.0".to_string(),
            port: default_port(),
            environment: DEFAULT_ENV.to_string(),
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            conflict_retry_attempts: default_conflict_retry_attempts(),
            conflict_retry_backoff_ms: default_conflict_retry_backoff_ms(),
            event_channel_capacity: default_event_channel_capacity(),
            api_default_page_size: default_api_page_size(),
            api_max_page_size: default_api_max_page_size(),
            directory: Vec::new(),
        }
    }
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_store_backend() -> String {
    DEFAULT_STORE_BACKEND.to_string()
}

fn default_db_max_connections() -> u32 {
    20
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    10
}
fn default_db_idle_timeout_secs() -> u64 {
    300
}

fn default_conflict_retry_attempts() -> u32 {
    3
}

fn default_conflict_retry_backoff_ms() -> u64 {
    25
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_api_page_size() -> u64 {
    20
}

fn default_api_max_page_size() -> u64 {
    100
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_store_backend(backend: &str) -> Result<(), ValidationError> {
    match backend {
        "sea-orm" | "in-memory" => Ok(()),
        _ => {
            let mut err = ValidationError::new("store_backend");
            err.message = Some("Must be one of: sea-orm, in-memory".into());
            Err(err)
        }
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("siteflow_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let defaults = AppConfig::default();
    let config = Config::builder()
        .set_default("database_url", defaults.database_url)?
        .set_default("store_backend", defaults.store_backend)?
        .set_default("host", defaults.host)?
        .set_default("port", i64::from(defaults.port))?
        .set_default("environment", run_env.clone())?
        .set_default("log_level", defaults.log_level)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.conflict_retry_attempts, 3);
        assert!(!config.uses_in_memory_store());
    }

    #[test]
    fn rejects_unknown_store_backend() {
        let config = AppConfig {
            store_backend: "redis".into(),
            ..AppConfig::default()
        };
        let errors = config.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("store_backend"));
    }

    #[test]
    fn rejects_bad_log_level() {
        let config = AppConfig {
            log_level: "verbose".into(),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn page_size_is_clamped() {
        let config = AppConfig::default();
        assert_eq!(config.page_size(None), 20);
        assert_eq!(config.page_size(Some(0)), 1);
        assert_eq!(config.page_size(Some(5000)), 100);
    }

    #[test]
    fn directory_entries_deserialize_from_toml() {
        let raw = r#"
            [[directory]]
            id = "6f1c4b1e-3c1a-4c55-9d1e-1f5b2a7c9e01"
            role = "procurement_officer"
            projects = ["0b7f4a0e-5d8c-4f0a-8f44-2f1c7e3d9a10"]
        "#;
        let config = Config::builder()
            .add_source(File::from_str(raw, config::FileFormat::Toml))
            .build()
            .unwrap();
        let entries: Vec<DirectoryEntry> = config.get("directory").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].role, Role::ProcurementOfficer);
        assert_eq!(entries[0].projects.len(), 1);
    }

    #[test]
    fn cors_origins_are_split_and_trimmed() {
        let config = AppConfig {
            cors_allowed_origins: Some("https://a.example, https://b.example,".into()),
            ..AppConfig::default()
        };
        assert_eq!(
            config.cors_origins(),
            vec!["https://a.example", "https://b.example"]
        );
    }
}
