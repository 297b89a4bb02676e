//! Repository abstractions for data access.
//!
//! Every mutation runs in one transaction that first claims the write lock
//! of the row it changes, and writes its audit entry before committing.

pub mod audit;
pub mod config;
pub mod credential;
pub mod inventory;
pub mod soft_delete;

pub use audit::{AuditError, AuditLedger, NewAuditEntry};
pub use config::{ConfigError, ConfigRepository};
pub use credential::{CredentialError, CredentialStore, NewAccount, SeedOutcome};
pub use inventory::{
    InventoryError, InventoryLedger, ItemUpdate, MovementReceipt, MovementRequest, NewItem,
};
pub use soft_delete::SoftDeletable;

use sea_orm::{ColumnTrait, DbErr, QueryFilter, Select, SqlErr};

/// Whether read accessors return deactivated rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Visibility {
    /// Only rows with `active = true`.
    #[default]
    ActiveOnly,
    /// Every row, for audit and recovery tooling.
    IncludeInactive,
}

impl Visibility {
    pub(crate) fn apply<E: SoftDeletable>(self, select: Select<E>) -> Select<E> {
        match self {
            Self::ActiveOnly => select.filter(E::active_column().eq(true)),
            Self::IncludeInactive => select,
        }
    }
}

/// Actor recorded when the caller gives none.
pub const SYSTEM_ACTOR: &str = "system";

pub(crate) fn actor_or_system(actor: &str) -> &str {
    let actor = actor.trim();
    if actor.is_empty() { SYSTEM_ACTOR } else { actor }
}

/// Returns true if the error is a UNIQUE constraint violation.
///
/// Name checks run before inserts, but a concurrent writer can still claim
/// the name between the check and the insert.
pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}
