//! `SeaORM` Entity for inventory_movements table.
//!
//! Movements are append-only: rows are never updated or deleted.

use sea_orm::entity::prelude::*;
use serde::Serialize;
use tally_core::inventory::{InventoryRuleError, MovementType};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "inventory_movements")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub item_id: i64,
    pub movement_type: String,
    /// Signed change applied to the item balance.
    pub delta: i64,
    pub reason: String,
    pub actor: String,
    pub created_at: DateTimeUtc,
}

impl Model {
    /// Parsed type tag.
    ///
    /// # Errors
    ///
    /// Returns `InventoryRuleError::UnknownMovementType` for an unrecognized tag.
    pub fn kind(&self) -> Result<MovementType, InventoryRuleError> {
        self.movement_type.parse()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::inventory_items::Entity",
        from = "Column::ItemId",
        to = "super::inventory_items::Column::Id"
    )]
    InventoryItems,
}

impl Related<super::inventory_items::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InventoryItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
