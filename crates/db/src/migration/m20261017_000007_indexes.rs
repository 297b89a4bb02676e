//! Lookup indexes. Created after the retrofit so legacy tables have the columns.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(INDEXES_SQL).await?;
        Ok(())
    }
}

const INDEXES_SQL: &str = r"
-- Movement history and reconciliation per item
CREATE INDEX IF NOT EXISTS idx_inventory_movements_item ON inventory_movements(item_id, id);

-- Audit history per record
CREATE INDEX IF NOT EXISTS idx_audit_log_record ON audit_log(table_name, record_id, created_at, id);

-- Active-only listings
CREATE INDEX IF NOT EXISTS idx_inventory_items_active ON inventory_items(active, name);
CREATE INDEX IF NOT EXISTS idx_accounts_active ON accounts(active, username);
";
