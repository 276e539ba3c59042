//! Runtime configuration read from environment variables.

use std::path::PathBuf;

use log::info;

use crate::error::{ConfigError, StoreError};
use crate::store::{ArchiveStore, JsonStore, MemoryStore, ResultStore, SqliteStore, StoreKind};

pub const DEFAULT_DATA_DIR: &str = "database";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_SESSION_HOURS: u64 = 24;

const SQLITE_FILE: &str = "results.db";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// `STORE_BACKEND`: json, archive, sqlite or memory
    pub backend: StoreKind,
    /// `DATA_DIR`: where file-backed stores keep their data
    pub data_dir: PathBuf,
    /// `BIND_ADDR`: address the web server listens on
    pub bind_addr: String,
    /// `SESSION_HOURS`: lifetime of a login session
    pub session_hours: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            backend: StoreKind::Json,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            session_hours: DEFAULT_SESSION_HOURS,
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key lookup; unset or blank keys keep
    /// their defaults
    ///
    /// # Examples
    /// ```
    /// use student_analytics::config::AppConfig;
    /// use student_analytics::store::StoreKind;
    ///
    /// let config = AppConfig::from_lookup(|key| match key {
    ///     "STORE_BACKEND" => Some("sqlite".to_string()),
    ///     _ => None,
    /// })
    /// .unwrap();
    /// assert_eq!(config.backend, StoreKind::Sqlite);
    /// assert_eq!(config.bind_addr, "127.0.0.1:3000");
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = AppConfig::default();

        if let Some(value) = get("STORE_BACKEND") {
            config.backend = value.parse()?;
        }
        if let Some(value) = get("DATA_DIR") {
            config.data_dir = PathBuf::from(value.trim());
        }
        if let Some(value) = get("BIND_ADDR") {
            config.bind_addr = value.trim().to_string();
        }
        if let Some(value) = get("SESSION_HOURS") {
            config.session_hours = value
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|hours| *hours > 0)
                .ok_or(ConfigError::InvalidValue {
                    key: "SESSION_HOURS".to_string(),
                    value,
                })?;
        }

        Ok(config)
    }
}

/// Construct the configured backend.
pub fn open_store(config: &AppConfig) -> Result<Box<dyn ResultStore + Send>, StoreError> {
    info!("Using {} store in {}", config.backend, config.data_dir.display());
    let store: Box<dyn ResultStore + Send> = match config.backend {
        StoreKind::Memory => Box::new(MemoryStore::new()),
        StoreKind::Json => Box::new(JsonStore::open(&config.data_dir)?),
        StoreKind::Archive => Box::new(ArchiveStore::open(
            config.data_dir.join(crate::store::archive::ARCHIVE_FILE),
        )?),
        StoreKind::Sqlite => Box::new(SqliteStore::open(config.data_dir.join(SQLITE_FILE))?),
    };
    Ok(store)
}
