//! `SeaORM` Entity for inventory_items table.

use sea_orm::entity::prelude::*;
use serde::Serialize;
use tally_shared::types::Amount;

/// A stocked item with its cached balance.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "inventory_items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub name: String,
    pub quantity: i64,
    pub unit: String,
    /// Quantized decimal text, e.g. `"12.50"`.
    pub unit_price: String,
    pub min_threshold: i64,
    pub active: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// Unit price as an amount. Unparsable legacy text reads as zero.
    #[must_use]
    pub fn price(&self) -> Amount {
        Amount::lenient(self.unit_price.as_str())
    }

    /// Returns true if the cached balance is at or below the reorder threshold.
    #[must_use]
    pub const fn is_low_stock(&self) -> bool {
        self.quantity <= self.min_threshold
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::inventory_movements::Entity")]
    InventoryMovements,
}

impl Related<super::inventory_movements::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InventoryMovements.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
