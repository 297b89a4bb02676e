//! `SeaORM` Entity for accounts table.

use sea_orm::entity::prelude::*;
use serde::Serialize;

/// A user account.
///
/// Serialized snapshots (as written to the audit log) never carry the
/// password hash or the legacy plaintext.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub username: String,
    pub display_name: String,
    pub role: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    #[serde(skip_serializing)]
    pub legacy_password: Option<String>,
    pub active: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// The stored hash, if it is non-empty.
    #[must_use]
    pub fn stored_hash(&self) -> Option<&str> {
        self.password_hash.as_deref().filter(|hash| !hash.is_empty())
    }

    /// The legacy plaintext credential, if it is non-empty.
    #[must_use]
    pub fn stored_legacy_password(&self) -> Option<&str> {
        self.legacy_password
            .as_deref()
            .filter(|password| !password.is_empty())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
