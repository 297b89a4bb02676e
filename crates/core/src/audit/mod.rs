//! Audit trail rules.
//!
//! This module provides:
//! - The action kinds written to the audit log
//! - The set of tables that support soft delete
//! - History replay: folding a record's audit entries back into its state

mod history;

pub use history::{AuditEvent, replay};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

/// Errors from audit rule checks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditRuleError {
    /// Table name is not a soft-delete-enabled business table.
    #[error("Table '{0}' does not support soft delete")]
    UnknownTable(String),

    /// Action name is not one the log writes.
    #[error("Unknown audit action '{0}'")]
    UnknownAction(String),
}

/// Kind of mutation recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    /// Row inserted.
    Create,
    /// Fields changed.
    Update,
    /// Row deactivated.
    SoftDelete,
    /// Cached stock balance changed by a movement.
    StockMovement,
}

impl AuditAction {
    /// Stored form of the action.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::SoftDelete => "SOFT_DELETE",
            Self::StockMovement => "STOCK_MOVEMENT",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuditAction {
    type Err = AuditRuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(Self::Create),
            "UPDATE" => Ok(Self::Update),
            "SOFT_DELETE" => Ok(Self::SoftDelete),
            "STOCK_MOVEMENT" => Ok(Self::StockMovement),
            _ => Err(AuditRuleError::UnknownAction(s.to_string())),
        }
    }
}

/// Business tables whose rows are deactivated instead of deleted.
///
/// The configuration table, the audit log and the movement ledger are
/// deliberately absent: they carry no `active` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoftDeleteTable {
    /// User accounts.
    Accounts,
    /// Inventory items.
    InventoryItems,
}

impl SoftDeleteTable {
    /// Every soft-delete-enabled table.
    pub const ALL: [Self; 2] = [Self::Accounts, Self::InventoryItems];

    /// Table name in the schema.
    #[must_use]
    pub const fn table_name(&self) -> &'static str {
        match self {
            Self::Accounts => "accounts",
            Self::InventoryItems => "inventory_items",
        }
    }
}

impl std::fmt::Display for SoftDeleteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table_name())
    }
}

impl std::str::FromStr for SoftDeleteTable {
    type Err = AuditRuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|table| table.table_name() == s)
            .ok_or_else(|| AuditRuleError::UnknownTable(s.to_string()))
    }
}

/// Key naming the movement in a `STOCK_MOVEMENT` entry's `after` snapshot.
///
/// It points at a movement row, not an item column, so replay skips it.
pub const MOVEMENT_ID_KEY: &str = "movement_id";

/// The `after` snapshot written by a soft delete.
#[must_use]
pub fn soft_delete_marker() -> Value {
    json!({ "active": false })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_roundtrip() {
        for action in [
            AuditAction::Create,
            AuditAction::Update,
            AuditAction::SoftDelete,
            AuditAction::StockMovement,
        ] {
            assert_eq!(action.as_str().parse::<AuditAction>().unwrap(), action);
        }
        assert!("DELETE".parse::<AuditAction>().is_err());
    }

    #[test]
    fn test_soft_delete_tables() {
        assert_eq!(
            "inventory_items".parse::<SoftDeleteTable>().unwrap(),
            SoftDeleteTable::InventoryItems
        );
        assert_eq!(
            "audit_log".parse::<SoftDeleteTable>(),
            Err(AuditRuleError::UnknownTable("audit_log".to_string()))
        );
        assert!("config_parameters".parse::<SoftDeleteTable>().is_err());
        assert!("accounts; DROP TABLE accounts".parse::<SoftDeleteTable>().is_err());
    }
}
