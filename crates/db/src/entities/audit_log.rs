//! `SeaORM` Entity for audit_log table.

use sea_orm::entity::prelude::*;
use serde::Serialize;
use serde_json::Value;
use tally_core::audit::{AuditAction, AuditEvent, AuditRuleError};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "audit_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub actor: String,
    pub action: String,
    pub table_name: String,
    pub record_id: i64,
    /// JSON text of the row before the mutation.
    pub before_snapshot: Option<String>,
    /// JSON text of the row (or the changed keys) after the mutation.
    pub after_snapshot: Option<String>,
    pub created_at: DateTimeUtc,
}

impl Model {
    /// Parsed action.
    ///
    /// # Errors
    ///
    /// Returns `AuditRuleError::UnknownAction` for an unrecognized action.
    pub fn audit_action(&self) -> Result<AuditAction, AuditRuleError> {
        self.action.parse()
    }

    /// Decoded `before` snapshot. Text that is not valid JSON reads as absent.
    #[must_use]
    pub fn before(&self) -> Option<Value> {
        decode(self.before_snapshot.as_deref())
    }

    /// Decoded `after` snapshot.
    #[must_use]
    pub fn after(&self) -> Option<Value> {
        decode(self.after_snapshot.as_deref())
    }

    /// The entry as a replayable event.
    ///
    /// # Errors
    ///
    /// Returns `AuditRuleError::UnknownAction` for an unrecognized action.
    pub fn to_event(&self) -> Result<AuditEvent, AuditRuleError> {
        Ok(AuditEvent {
            action: self.audit_action()?,
            before: self.before(),
            after: self.after(),
        })
    }
}

fn decode(text: Option<&str>) -> Option<Value> {
    text.and_then(|text| serde_json::from_str(text).ok())
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
