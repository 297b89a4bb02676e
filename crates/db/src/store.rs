//! Opened store: schema ensured, repositories wired.

use sea_orm::DatabaseConnection;
use tally_shared::{AppConfig, AppError};

use crate::repositories::{AuditLedger, ConfigRepository, CredentialStore, InventoryLedger};
use crate::retry::RetryPolicy;

/// Every repository over one database.
///
/// Obtained only through [`Store::open`] or [`Store::from_connection`], which
/// bring the schema up to date first.
#[derive(Debug, Clone)]
pub struct Store {
    db: DatabaseConnection,
    /// Accounts and login.
    pub credentials: CredentialStore,
    /// Audit log and soft delete.
    pub audit: AuditLedger,
    /// Items and movements.
    pub inventory: InventoryLedger,
    /// Numeric configuration parameters.
    pub config: ConfigRepository,
}

impl Store {
    /// Connects, migrates, and seeds the administrator account.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SchemaMigration` if migration fails, which is fatal.
    pub async fn open(config: &AppConfig) -> Result<Self, AppError> {
        let db = crate::connect(&config.database)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        let store = Self::from_connection(db, config).await?;
        store
            .credentials
            .seed_admin(config.seed.admin_password.as_deref())
            .await?;
        Ok(store)
    }

    /// Migrates an existing connection and wires the repositories. Does not seed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SchemaMigration` if migration fails.
    pub async fn from_connection(
        db: DatabaseConnection,
        config: &AppConfig,
    ) -> Result<Self, AppError> {
        crate::ensure_schema(&db).await?;

        let retry = RetryPolicy::from(&config.retry);
        Ok(Self {
            credentials: CredentialStore::new(db.clone(), retry)
                .with_admin_username(config.seed.admin_username.as_str()),
            audit: AuditLedger::new(db.clone(), retry),
            inventory: InventoryLedger::new(db.clone(), &config.inventory, retry),
            config: ConfigRepository::new(db.clone()),
            db,
        })
    }

    /// The underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}
