//! `SeaORM` Entity for config_parameters table.

use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::Serialize;
use tally_shared::types::ToDecimal;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "config_parameters")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,
    /// Decimal text, stored in the `value` column.
    #[sea_orm(column_name = "value")]
    pub numeric_value: String,
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// Parsed value, or `None` if the stored text is not a number.
    #[must_use]
    pub fn decimal(&self) -> Option<Decimal> {
        self.numeric_value.as_str().to_decimal()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
