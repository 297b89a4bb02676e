//! Database migrations.
//!
//! Migrations are managed using sea-orm-migration and are forward-only: none
//! of them defines `down`. Every step is idempotent, so running the whole set
//! against a fresh, a current, or a legacy database converges on the same
//! schema.

pub use sea_orm_migration::prelude::*;

use sea_orm_migration::sea_orm::{DatabaseConnection, TransactionTrait};
use tally_shared::AppError;

mod m20261017_000001_accounts;
mod m20261017_000002_inventory;
mod m20261017_000003_audit_log;
mod m20261017_000004_config_parameters;
mod m20261017_000005_retrofit_columns;
mod m20261017_000006_soft_delete;
mod m20261017_000007_indexes;
mod m20261017_000008_opening_balances;

/// Migrator for running database migrations.
pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261017_000001_accounts::Migration),
            Box::new(m20261017_000002_inventory::Migration),
            Box::new(m20261017_000003_audit_log::Migration),
            Box::new(m20261017_000004_config_parameters::Migration),
            Box::new(m20261017_000005_retrofit_columns::Migration),
            Box::new(m20261017_000006_soft_delete::Migration),
            Box::new(m20261017_000007_indexes::Migration),
            Box::new(m20261017_000008_opening_balances::Migration),
        ]
    }
}

/// Schema migration failure. Fatal at startup.
#[derive(Debug, thiserror::Error)]
#[error("Schema migration failed: {0}")]
pub struct SchemaError(#[from] pub DbErr);

impl From<SchemaError> for AppError {
    fn from(err: SchemaError) -> Self {
        Self::SchemaMigration(err.0.to_string())
    }
}

/// Brings the schema up to date.
///
/// All pending migrations run inside one transaction: either every step is
/// applied or the database is left exactly as it was.
///
/// # Errors
///
/// Returns `SchemaError` if any step fails; nothing is committed in that case.
pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), SchemaError> {
    let txn = db.begin().await?;
    Migrator::up(&txn, None).await?;
    txn.commit().await?;

    tracing::info!("Schema is up to date");
    Ok(())
}

/// Names of the migrations already applied, oldest first.
///
/// # Errors
///
/// Returns `SchemaError` if the migration table cannot be read.
pub async fn applied_migrations(db: &DatabaseConnection) -> Result<Vec<String>, SchemaError> {
    let applied = Migrator::get_applied_migrations(db).await?;
    Ok(applied.iter().map(|m| m.name().to_string()).collect())
}
