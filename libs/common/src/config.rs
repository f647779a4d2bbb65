//! Environment-variable-driven configuration.
//!
//! This is the core-facing half of `ConfigLoader`: the handful of knobs the
//! engine, scheduler, and reconciler need to start. Admin configuration
//! files, TLS, and secret storage remain external per the stated non-goals.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
}

/// Database connection settings, read from `DB_*`.
#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    #[serde(default = "DbConfig::default_host")]
    pub host: String,
    #[serde(default = "DbConfig::default_port")]
    pub port: u16,
    #[serde(default = "DbConfig::default_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "DbConfig::default_name")]
    pub name: String,
    #[serde(default = "DbConfig::default_sslmode")]
    pub sslmode: String,
}

impl DbConfig {
    fn default_host() -> String {
        "localhost".to_string()
    }
    const fn default_port() -> u16 {
        5432
    }
    fn default_user() -> String {
        "postgres".to_string()
    }
    fn default_name() -> String {
        "platform_core".to_string()
    }
    fn default_sslmode() -> String {
        "prefer".to_string()
    }

    #[must_use]
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.user, self.password, self.host, self.port, self.name, self.sslmode
        )
    }
}

/// Core-wide runtime configuration assembled from environment variables
/// (optionally preceded by a `.env` file, loaded by the caller via
/// `dotenvy::dotenv()`).
#[derive(Debug, Clone, Deserialize)]
pub struct CoreConfig {
    #[serde(default = "CoreConfig::default_core_version")]
    pub core_version: String,
    #[serde(default = "CoreConfig::default_reconciler_interval_secs")]
    pub reconciler_interval_secs: u64,
    #[serde(default = "CoreConfig::default_workflow_timeout_secs")]
    pub workflow_timeout_default_secs: u64,
    #[serde(default = "CoreConfig::default_step_timeout_secs")]
    pub step_timeout_default_secs: u64,
    #[serde(default = "CoreConfig::default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,
    #[serde(default = "CoreConfig::default_queue_depth")]
    pub queue_depth: usize,
    /// `STRICT_PROPERTIES`: reject the legacy `params` alias instead of
    /// rewriting it on ingest.
    #[serde(default)]
    pub strict_properties: bool,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub log_format: String,
    #[serde(default)]
    pub log_level: String,
}

impl CoreConfig {
    fn default_core_version() -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }
    const fn default_reconciler_interval_secs() -> u64 {
        5
    }
    const fn default_workflow_timeout_secs() -> u64 {
        60 * 60
    }
    const fn default_step_timeout_secs() -> u64 {
        30 * 60
    }
    const fn default_max_concurrent_runs() -> usize {
        32
    }
    const fn default_queue_depth() -> usize {
        1024
    }

    /// Load configuration from the process environment. Prefixed variables
    /// (`DB_HOST`, `DB_PORT`, ...) are nested under `db` by the `config`
    /// crate's separator handling.
    pub fn load() -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .try_parsing(true)
                    .separator("_"),
            )
            .build()?;

        // `config::Environment` flattens `DB_HOST` into `db.host` only when
        // the prefix convention is requested explicitly below.
        let db = config::Config::builder()
            .add_source(config::Environment::with_prefix("DB").try_parsing(true))
            .build()
            .map(|c| c.try_deserialize::<DbConfig>().unwrap_or_default())
            .unwrap_or_default();

        let mut cfg: Self = settings.try_deserialize().unwrap_or_else(|_| Self::defaults());
        cfg.db = db;
        Ok(cfg)
    }

    fn defaults() -> Self {
        Self {
            core_version: Self::default_core_version(),
            reconciler_interval_secs: Self::default_reconciler_interval_secs(),
            workflow_timeout_default_secs: Self::default_workflow_timeout_secs(),
            step_timeout_default_secs: Self::default_step_timeout_secs(),
            max_concurrent_runs: Self::default_max_concurrent_runs(),
            queue_depth: Self::default_queue_depth(),
            strict_properties: false,
            db: DbConfig::default(),
            log_format: "console".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            user: Self::default_user(),
            password: String::new(),
            name: Self::default_name(),
            sslmode: Self::default_sslmode(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_config_default_connection_string_uses_localhost() {
        let db = DbConfig::default();
        assert!(db.connection_string().contains("localhost:5432"));
    }

    #[test]
    fn core_config_defaults_match_spec_defaults() {
        let cfg = CoreConfig::defaults();
        assert_eq!(cfg.reconciler_interval_secs, 5);
        assert_eq!(cfg.max_concurrent_runs, 32);
        assert_eq!(cfg.queue_depth, 1024);
    }
}
