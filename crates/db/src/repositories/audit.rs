//! Audit ledger: append-only change log and soft delete.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use serde_json::Value;
use tally_core::audit::{AuditAction, AuditRuleError, SoftDeleteTable, replay};
use tally_shared::AppError;
use tracing::info;

use super::actor_or_system;
use super::soft_delete::soft_delete_row;
use crate::entities::{accounts, audit_log, inventory_items};
use crate::retry::{RetryPolicy, Transient, is_transient};

/// Error types for audit operations.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// No row with that id.
    #[error("{table} record {id} not found")]
    RecordNotFound {
        /// Table searched.
        table: SoftDeleteTable,
        /// Requested id.
        id: i64,
    },

    /// The row is already deactivated.
    #[error("{table} record {id} is already inactive")]
    AlreadyInactive {
        /// Table of the row.
        table: SoftDeleteTable,
        /// Row id.
        id: i64,
    },

    /// Unknown table or action name.
    #[error(transparent)]
    Rule(#[from] AuditRuleError),

    /// Row could not be serialized into a snapshot.
    #[error("Snapshot serialization failed: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// Write lock still contended after every retry.
    #[error("Store busy after {attempts} attempts")]
    Busy {
        /// Attempts made.
        attempts: usize,
    },

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

impl Transient for AuditError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Database(e) if is_transient(e))
    }

    fn exhausted(self, attempts: usize) -> Self {
        Self::Busy { attempts }
    }
}

impl From<AuditError> for AppError {
    fn from(err: AuditError) -> Self {
        match err {
            AuditError::RecordNotFound { .. } => Self::NotFound(err.to_string()),
            AuditError::AlreadyInactive { .. } => Self::Conflict(err.to_string()),
            AuditError::Rule(_) => Self::Validation(err.to_string()),
            AuditError::Snapshot(_) => Self::Internal(err.to_string()),
            AuditError::Busy { .. } => Self::TransientLock(err.to_string()),
            AuditError::Database(_) => Self::Database(err.to_string()),
        }
    }
}

/// Input for one audit entry.
#[derive(Debug, Clone)]
pub struct NewAuditEntry<'a> {
    /// Who made the change.
    pub actor: &'a str,
    /// What kind of change.
    pub action: AuditAction,
    /// Table of the changed row.
    pub table_name: &'a str,
    /// Id of the changed row.
    pub record_id: i64,
    /// Row before the change.
    pub before: Option<Value>,
    /// Row, or the changed keys, after the change.
    pub after: Option<Value>,
}

/// Serializes a row for an audit snapshot.
pub(crate) fn snapshot<M: Serialize>(model: &M) -> Result<Value, serde_json::Error> {
    serde_json::to_value(model)
}

/// Appends an entry on `conn`, normally the transaction of the mutation it
/// records. Entries are never updated or deleted.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub async fn append<C: ConnectionTrait>(
    conn: &C,
    entry: NewAuditEntry<'_>,
) -> Result<audit_log::Model, DbErr> {
    audit_log::ActiveModel {
        actor: Set(actor_or_system(entry.actor).to_string()),
        action: Set(entry.action.as_str().to_string()),
        table_name: Set(entry.table_name.to_string()),
        record_id: Set(entry.record_id),
        before_snapshot: Set(entry.before.map(|v| v.to_string())),
        after_snapshot: Set(entry.after.map(|v| v.to_string())),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(conn)
    .await
}

/// Audit ledger over the `audit_log` table.
#[derive(Debug, Clone)]
pub struct AuditLedger {
    db: DatabaseConnection,
    retry: RetryPolicy,
}

impl AuditLedger {
    /// Creates a new audit ledger.
    #[must_use]
    pub const fn new(db: DatabaseConnection, retry: RetryPolicy) -> Self {
        Self { db, retry }
    }

    /// Appends a standalone entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn log(&self, entry: NewAuditEntry<'_>) -> Result<audit_log::Model, AuditError> {
        Ok(append(&self.db, entry).await?)
    }

    /// Deactivates a row of a soft-delete-enabled table.
    ///
    /// The flag flip and its `SOFT_DELETE` entry commit together. A missing
    /// or already inactive row is rejected with no side effects.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Rule` for a table without soft delete,
    /// `AuditError::RecordNotFound` or `AuditError::AlreadyInactive` for a bad
    /// target, and `AuditError::Busy` if the row stays locked.
    pub async fn soft_delete(
        &self,
        table: &str,
        id: i64,
        actor: &str,
    ) -> Result<audit_log::Model, AuditError> {
        let table: SoftDeleteTable = table.parse()?;
        let entry = self
            .retry
            .run("soft_delete", || self.soft_delete_once(table, id, actor))
            .await?;

        info!(table = %table, id, actor = %entry.actor, "Record deactivated");
        Ok(entry)
    }

    async fn soft_delete_once(
        &self,
        table: SoftDeleteTable,
        id: i64,
        actor: &str,
    ) -> Result<audit_log::Model, AuditError> {
        let txn = self.db.begin().await?;
        let entry = match table {
            SoftDeleteTable::Accounts => {
                soft_delete_row::<accounts::Entity, _>(&txn, id, actor).await?
            }
            SoftDeleteTable::InventoryItems => {
                soft_delete_row::<inventory_items::Entity, _>(&txn, id, actor).await?
            }
        };
        txn.commit().await?;
        Ok(entry)
    }

    /// Every entry for one record, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn history(
        &self,
        table: &str,
        record_id: i64,
    ) -> Result<Vec<audit_log::Model>, AuditError> {
        Ok(audit_log::Entity::find()
            .filter(audit_log::Column::TableName.eq(table))
            .filter(audit_log::Column::RecordId.eq(record_id))
            .order_by_asc(audit_log::Column::CreatedAt)
            .order_by_asc(audit_log::Column::Id)
            .all(&self.db)
            .await?)
    }

    /// Last known state of a record, rebuilt from its history alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or an entry has an unknown action.
    pub async fn reconstruct(
        &self,
        table: &str,
        record_id: i64,
    ) -> Result<Option<Value>, AuditError> {
        let events = self
            .history(table, record_id)
            .await?
            .iter()
            .map(audit_log::Model::to_event)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(replay(&events))
    }

    /// Every entry for a table, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn entries_for_table(&self, table: &str) -> Result<Vec<audit_log::Model>, AuditError> {
        Ok(audit_log::Entity::find()
            .filter(audit_log::Column::TableName.eq(table))
            .order_by_asc(audit_log::Column::CreatedAt)
            .order_by_asc(audit_log::Column::Id)
            .all(&self.db)
            .await?)
    }

    /// Number of entries for one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count_for(&self, table: &str, record_id: i64) -> Result<u64, AuditError> {
        Ok(audit_log::Entity::find()
            .filter(audit_log::Column::TableName.eq(table))
            .filter(audit_log::Column::RecordId.eq(record_id))
            .count(&self.db)
            .await?)
    }
}
