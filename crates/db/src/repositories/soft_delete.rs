//! Generic soft delete over the business tables that carry an `active` flag.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter};
use serde::Serialize;
use tally_core::audit::{AuditAction, SoftDeleteTable, soft_delete_marker};

use super::audit::{AuditError, NewAuditEntry, append, snapshot};
use crate::entities::{accounts, audit_log, inventory_items};

/// An entity whose rows are deactivated instead of deleted.
pub trait SoftDeletable: EntityTrait {
    /// The table this entity maps.
    const TABLE: SoftDeleteTable;

    /// Integer primary key.
    fn id_column() -> Self::Column;

    /// The `active` flag.
    fn active_column() -> Self::Column;

    /// Last-modified timestamp.
    fn updated_at_column() -> Self::Column;

    /// Reads the flag off a loaded row.
    fn is_active(model: &Self::Model) -> bool;
}

impl SoftDeletable for accounts::Entity {
    const TABLE: SoftDeleteTable = SoftDeleteTable::Accounts;

    fn id_column() -> Self::Column {
        accounts::Column::Id
    }

    fn active_column() -> Self::Column {
        accounts::Column::Active
    }

    fn updated_at_column() -> Self::Column {
        accounts::Column::UpdatedAt
    }

    fn is_active(model: &Self::Model) -> bool {
        model.active
    }
}

impl SoftDeletable for inventory_items::Entity {
    const TABLE: SoftDeleteTable = SoftDeleteTable::InventoryItems;

    fn id_column() -> Self::Column {
        inventory_items::Column::Id
    }

    fn active_column() -> Self::Column {
        inventory_items::Column::Active
    }

    fn updated_at_column() -> Self::Column {
        inventory_items::Column::UpdatedAt
    }

    fn is_active(model: &Self::Model) -> bool {
        model.active
    }
}

/// Claims the write lock on one row.
///
/// The no-op update is the first write of the transaction, so a concurrent
/// writer to the same database waits here (or fails busy) before reading any
/// state. Returns false if the row does not exist.
pub(crate) async fn lock_row<E, C>(conn: &C, id: i64) -> Result<bool, DbErr>
where
    E: SoftDeletable,
    C: ConnectionTrait,
{
    let result = E::update_many()
        .col_expr(E::active_column(), Expr::col(E::active_column()).into())
        .filter(E::id_column().eq(id))
        .exec(conn)
        .await?;
    Ok(result.rows_affected > 0)
}

/// Deactivates one row and records it, inside the caller's transaction.
///
/// The audit entry carries the full row before the change and
/// `{"active": false}` after it.
pub(crate) async fn soft_delete_row<E, C>(
    conn: &C,
    id: i64,
    actor: &str,
) -> Result<audit_log::Model, AuditError>
where
    E: SoftDeletable,
    E::Model: Serialize,
    C: ConnectionTrait,
{
    let table = E::TABLE;
    if !lock_row::<E, _>(conn, id).await? {
        return Err(AuditError::RecordNotFound { table, id });
    }

    let row = E::find()
        .filter(E::id_column().eq(id))
        .one(conn)
        .await?
        .ok_or(AuditError::RecordNotFound { table, id })?;
    if !E::is_active(&row) {
        return Err(AuditError::AlreadyInactive { table, id });
    }
    let before = snapshot(&row)?;

    E::update_many()
        .col_expr(E::active_column(), Expr::value(false))
        .col_expr(E::updated_at_column(), Expr::value(Utc::now()))
        .filter(E::id_column().eq(id))
        .exec(conn)
        .await?;

    let entry = append(
        conn,
        NewAuditEntry {
            actor,
            action: AuditAction::SoftDelete,
            table_name: table.table_name(),
            record_id: id,
            before: Some(before),
            after: Some(soft_delete_marker()),
        },
    )
    .await?;
    Ok(entry)
}
