//! `SeaORM` entity definitions.

pub mod prelude;

pub mod accounts;
pub mod audit_log;
pub mod config_parameters;
pub mod inventory_items;
pub mod inventory_movements;
