//! Database layer with `SeaORM` entities, migrations, and ledgers.
//!
//! This crate provides:
//! - `SeaORM` entity definitions
//! - Versioned, idempotent schema migrations
//! - The credential store, audit ledger, inventory ledger and configuration
//!   repository
//! - Bounded retry for write-lock contention

pub mod entities;
pub mod migration;
pub mod repositories;
pub mod retry;
mod store;

pub use migration::{SchemaError, ensure_schema};
pub use repositories::{
    AuditLedger, ConfigRepository, CredentialStore, InventoryLedger, Visibility,
};
pub use retry::RetryPolicy;
pub use store::Store;

use std::str::FromStr;

use sea_orm::{DatabaseConnection, DbErr, RuntimeErr, SqlxSqliteConnector};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tally_shared::config::DatabaseConfig;

/// In-memory database path.
pub const MEMORY_PATH: &str = ":memory:";

/// Opens the SQLite database described by `config`.
///
/// File databases are created if missing and use the WAL journal, so readers
/// never block the single writer. Every connection enforces foreign keys and
/// waits up to the configured busy timeout for a contended write lock.
///
/// # Errors
///
/// Returns an error if the database cannot be opened.
pub async fn connect(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    if config.path == MEMORY_PATH {
        return connect_in_memory().await;
    }

    let options = SqliteConnectOptions::new()
        .filename(&config.path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(config.busy_timeout());

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .connect_with(options)
        .await
        .map_err(|e| DbErr::Conn(RuntimeErr::SqlxError(e)))?;

    tracing::info!(path = %config.path, max_connections = config.max_connections, "Database connected");
    Ok(SqlxSqliteConnector::from_sqlx_sqlite_pool(pool))
}

/// Opens a private in-memory database.
///
/// The pool holds exactly one connection that is never recycled, since each
/// SQLite in-memory connection is its own database.
///
/// # Errors
///
/// Returns an error if the database cannot be opened.
pub async fn connect_in_memory() -> Result<DatabaseConnection, DbErr> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|e| DbErr::Conn(RuntimeErr::SqlxError(e)))?
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .map_err(|e| DbErr::Conn(RuntimeErr::SqlxError(e)))?;

    Ok(SqlxSqliteConnector::from_sqlx_sqlite_pool(pool))
}
