//! Application configuration management.

use std::time::Duration;

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// First-start seeding configuration.
    #[serde(default)]
    pub seed: SeedConfig,
    /// Inventory ledger rules.
    #[serde(default)]
    pub inventory: InventoryConfig,
    /// Retry budget for lock contention.
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path of the SQLite database file. `:memory:` opens a private in-memory store.
    #[serde(default = "default_path")]
    pub path: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// How long a connection waits on a locked database before reporting busy.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_path() -> String {
    "tally.db".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl DatabaseConfig {
    /// Busy timeout as a `Duration`.
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Seeding configuration, consumed once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedConfig {
    /// Username of the administrative account.
    #[serde(default = "default_admin_username")]
    pub admin_username: String,
    /// Administrator password override (`TALLY__SEED__ADMIN_PASSWORD`).
    #[serde(default)]
    pub admin_password: Option<String>,
}

fn default_admin_username() -> String {
    "admin".to_string()
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            admin_username: default_admin_username(),
            admin_password: None,
        }
    }
}

/// Inventory ledger rules.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct InventoryConfig {
    /// Lets decreases take a balance below zero.
    #[serde(default)]
    pub allow_negative_stock: bool,
}

/// Bounded retry on lock contention.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// First backoff delay in milliseconds.
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    /// Backoff ceiling in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> usize {
    3
}

fn default_min_delay_ms() -> u64 {
    20
}

fn default_max_delay_ms() -> u64 {
    500
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("TALLY").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_sources() {
        temp_env::with_vars_unset(
            ["TALLY__SEED__ADMIN_PASSWORD", "TALLY__DATABASE__PATH", "RUN_MODE"],
            || {
                let config = AppConfig::load().unwrap();
                assert_eq!(config.database.path, "tally.db");
                assert_eq!(config.database.busy_timeout(), Duration::from_secs(5));
                assert_eq!(config.seed.admin_username, "admin");
                assert!(config.seed.admin_password.is_none());
                assert!(!config.inventory.allow_negative_stock);
                assert_eq!(config.retry.max_retries, 3);
            },
        );
    }

    #[test]
    fn test_admin_password_from_environment() {
        temp_env::with_vars(
            [
                ("TALLY__SEED__ADMIN_PASSWORD", Some("from-env")),
                ("TALLY__DATABASE__PATH", Some("/tmp/ledger.db")),
            ],
            || {
                let config = AppConfig::load().unwrap();
                assert_eq!(config.seed.admin_password.as_deref(), Some("from-env"));
                assert_eq!(config.database.path, "/tmp/ledger.db");
            },
        );
    }
}
