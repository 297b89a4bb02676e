//! Guarantees the `active` flag on every soft-delete-enabled table.

use sea_orm_migration::prelude::*;
use tally_core::audit::SoftDeleteTable;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        for table in SoftDeleteTable::ALL {
            let name = table.table_name();
            if !manager.has_column(name, "active").await? {
                db.execute_unprepared(&format!(
                    "ALTER TABLE {name} ADD COLUMN active BOOLEAN NOT NULL DEFAULT 1"
                ))
                .await?;
                tracing::info!(table = name, "Added soft delete flag");
            }
            // Older releases created the flag nullable.
            db.execute_unprepared(&format!(
                "UPDATE {name} SET active = 1 WHERE active IS NULL"
            ))
            .await?;
        }
        Ok(())
    }
}
