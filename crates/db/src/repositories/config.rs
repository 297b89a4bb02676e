//! Configuration parameter repository.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, DbErr, EntityTrait, QueryOrder, Set};
use tally_core::pricing::ConfigSnapshot;
use tally_shared::AppError;
use tracing::{info, warn};

use crate::entities::config_parameters;

/// Error types for configuration parameters.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Key is blank.
    #[error("Configuration key must not be blank")]
    BlankKey,

    /// Stored value is not a number.
    #[error("Configuration value for '{key}' is not a number: '{value}'")]
    Unparsable {
        /// Parameter key.
        key: String,
        /// Stored text.
        value: String,
    },

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::BlankKey => Self::Validation(err.to_string()),
            ConfigError::Unparsable { .. } => Self::Config(err.to_string()),
            ConfigError::Database(_) => Self::Database(err.to_string()),
        }
    }
}

/// Repository for the `config_parameters` table.
#[derive(Debug, Clone)]
pub struct ConfigRepository {
    db: DatabaseConnection,
}

impl ConfigRepository {
    /// Creates a new configuration repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Inserts or replaces a parameter. The value is stored exactly.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::BlankKey` for a blank key.
    pub async fn set(&self, key: &str, value: Decimal) -> Result<(), ConfigError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::BlankKey);
        }

        let row = config_parameters::ActiveModel {
            key: Set(key.to_string()),
            numeric_value: Set(value.normalize().to_string()),
            updated_at: Set(Utc::now()),
        };
        config_parameters::Entity::insert(row)
            .on_conflict(
                OnConflict::column(config_parameters::Column::Key)
                    .update_columns([
                        config_parameters::Column::NumericValue,
                        config_parameters::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;

        info!(key, value = %value, "Configuration parameter set");
        Ok(())
    }

    /// Reads one parameter.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Unparsable` if the stored text is not a number.
    pub async fn get(&self, key: &str) -> Result<Option<Decimal>, ConfigError> {
        let Some(row) = config_parameters::Entity::find_by_id(key.trim().to_string())
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };
        row.decimal().map(Some).ok_or(ConfigError::Unparsable {
            key: row.key,
            value: row.numeric_value,
        })
    }

    /// Reads every parameter into an immutable snapshot.
    ///
    /// Rows whose text is not a number are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn snapshot(&self) -> Result<ConfigSnapshot, ConfigError> {
        let rows = config_parameters::Entity::find()
            .order_by_asc(config_parameters::Column::Key)
            .all(&self.db)
            .await?;

        let values = rows.into_iter().filter_map(|row| match row.decimal() {
            Some(value) => Some((row.key, value)),
            None => {
                warn!(key = %row.key, value = %row.numeric_value, "Skipping unparsable configuration value");
                None
            }
        });
        Ok(ConfigSnapshot::new(values))
    }
}
