//! Opening balance movements for items whose cached quantity predates the ledger.
//!
//! Older releases stored only the cached `quantity`. An item with stock but no
//! movement rows gets one `ADJUSTMENT` row, with its `STOCK_MOVEMENT` audit
//! entry, so the balance is re-derivable from movements from here on.
//!
//! Items that already have movements are left alone even when their sum
//! disagrees with the cache: that is drift, and reconciliation reports it.

use chrono::Utc;
use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Statement;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        let backend = manager.get_database_backend();

        let result = db
            .execute(Statement::from_sql_and_values(
                backend,
                OPENING_BALANCES_SQL,
                [Utc::now().into()],
            ))
            .await?;
        if result.rows_affected() > 0 {
            db.execute_unprepared(OPENING_BALANCE_AUDIT_SQL).await?;
            tracing::info!(
                items = result.rows_affected(),
                "Recorded opening balance movements"
            );
        }

        let drifted = db
            .query_one(Statement::from_string(backend, DRIFTED_ITEMS_SQL))
            .await?
            .map(|row| row.try_get::<i64>("", "drifted"))
            .transpose()?
            .unwrap_or(0);
        if drifted > 0 {
            tracing::warn!(
                items = drifted,
                "Cached stock differs from existing movement history; left for reconciliation"
            );
        }
        Ok(())
    }
}

const OPENING_BALANCES_SQL: &str = r"
INSERT INTO inventory_movements (item_id, movement_type, delta, reason, actor, created_at)
SELECT i.id, 'ADJUSTMENT', i.quantity, 'opening balance', 'system', ?
FROM inventory_items i
LEFT JOIN inventory_movements m ON m.item_id = i.id
GROUP BY i.id, i.quantity
HAVING COUNT(m.id) = 0 AND i.quantity <> 0
";

const OPENING_BALANCE_AUDIT_SQL: &str = r"
INSERT INTO audit_log (actor, action, table_name, record_id, before_snapshot, after_snapshot, created_at)
SELECT 'system', 'STOCK_MOVEMENT', 'inventory_items', m.item_id, NULL,
       json_object('id', i.id, 'quantity', i.quantity, 'movement_id', m.id),
       m.created_at
FROM inventory_movements m
JOIN inventory_items i ON i.id = m.item_id
WHERE m.reason = 'opening balance'
  AND NOT EXISTS (
      SELECT 1 FROM audit_log a
      WHERE a.table_name = 'inventory_items'
        AND a.record_id = m.item_id
        AND a.action = 'STOCK_MOVEMENT'
  )
";

const DRIFTED_ITEMS_SQL: &str = r"
SELECT COUNT(*) AS drifted FROM (
    SELECT i.id
    FROM inventory_items i
    JOIN inventory_movements m ON m.item_id = i.id
    GROUP BY i.id, i.quantity
    HAVING i.quantity <> SUM(m.delta)
)
";
