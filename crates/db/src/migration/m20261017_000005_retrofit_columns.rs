//! Adds canonical columns missing from tables created by older releases.
//!
//! `CREATE TABLE IF NOT EXISTS` leaves a pre-existing table untouched, so a
//! database from an older release can lack any column added since. Each
//! missing column is added with a safe default and then backfilled.

use chrono::Utc;
use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Statement;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// How existing rows are filled after a column is added.
#[derive(Debug, Clone, Copy)]
enum Backfill {
    /// Rows keep the column default.
    Default,
    /// Copy another column of the same row.
    FromColumn(&'static str),
    /// Stamp the migration time.
    Now,
}

struct RetrofitColumn {
    table: &'static str,
    column: &'static str,
    definition: &'static str,
    backfill: Backfill,
}

const fn retrofit(
    table: &'static str,
    column: &'static str,
    definition: &'static str,
    backfill: Backfill,
) -> RetrofitColumn {
    RetrofitColumn {
        table,
        column,
        definition,
        backfill,
    }
}

// SQLite cannot add a column with a non-constant default, so timestamps are
// added nullable and stamped afterwards.
const RETROFITS: &[RetrofitColumn] = &[
    retrofit("accounts", "display_name", "TEXT", Backfill::FromColumn("username")),
    retrofit("accounts", "role", "TEXT NOT NULL DEFAULT 'staff'", Backfill::Default),
    retrofit("accounts", "password_hash", "TEXT", Backfill::Default),
    retrofit("accounts", "legacy_password", "TEXT", Backfill::Default),
    retrofit("accounts", "created_at", "TEXT", Backfill::Now),
    retrofit("accounts", "updated_at", "TEXT", Backfill::Now),
    retrofit("inventory_items", "quantity", "INTEGER NOT NULL DEFAULT 0", Backfill::Default),
    retrofit("inventory_items", "unit", "TEXT NOT NULL DEFAULT 'unit'", Backfill::Default),
    retrofit("inventory_items", "unit_price", "TEXT NOT NULL DEFAULT '0.00'", Backfill::Default),
    retrofit("inventory_items", "min_threshold", "INTEGER NOT NULL DEFAULT 0", Backfill::Default),
    retrofit("inventory_items", "created_at", "TEXT", Backfill::Now),
    retrofit("inventory_items", "updated_at", "TEXT", Backfill::Now),
    retrofit("inventory_movements", "movement_type", "TEXT NOT NULL DEFAULT 'ADJUSTMENT'", Backfill::Default),
    retrofit("inventory_movements", "delta", "INTEGER NOT NULL DEFAULT 0", Backfill::Default),
    retrofit("inventory_movements", "reason", "TEXT NOT NULL DEFAULT ''", Backfill::Default),
    retrofit("inventory_movements", "actor", "TEXT NOT NULL DEFAULT 'system'", Backfill::Default),
    retrofit("inventory_movements", "created_at", "TEXT", Backfill::Now),
    retrofit("audit_log", "actor", "TEXT NOT NULL DEFAULT 'system'", Backfill::Default),
    retrofit("audit_log", "before_snapshot", "TEXT", Backfill::Default),
    retrofit("audit_log", "after_snapshot", "TEXT", Backfill::Default),
    retrofit("audit_log", "created_at", "TEXT", Backfill::Now),
    retrofit("config_parameters", "updated_at", "TEXT", Backfill::Now),
];

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for spec in RETROFITS {
            if manager.has_column(spec.table, spec.column).await? {
                continue;
            }
            add_column(manager, spec).await?;
            tracing::info!(
                table = spec.table,
                column = spec.column,
                "Added missing column"
            );
        }
        Ok(())
    }
}

async fn add_column(manager: &SchemaManager<'_>, spec: &RetrofitColumn) -> Result<(), DbErr> {
    let db = manager.get_connection();
    let RetrofitColumn {
        table,
        column,
        definition,
        backfill,
    } = spec;

    db.execute_unprepared(&format!(
        "ALTER TABLE {table} ADD COLUMN {column} {definition}"
    ))
    .await?;

    match backfill {
        Backfill::Default => {}
        Backfill::FromColumn(source) => {
            db.execute_unprepared(&format!(
                "UPDATE {table} SET {column} = {source} WHERE {column} IS NULL"
            ))
            .await?;
        }
        Backfill::Now => {
            db.execute(Statement::from_sql_and_values(
                manager.get_database_backend(),
                format!("UPDATE {table} SET {column} = ? WHERE {column} IS NULL"),
                [Utc::now().into()],
            ))
            .await?;
        }
    }
    Ok(())
}
