//! Entity re-exports.

pub use super::accounts::Entity as Accounts;
pub use super::audit_log::Entity as AuditLog;
pub use super::config_parameters::Entity as ConfigParameters;
pub use super::inventory_items::Entity as InventoryItems;
pub use super::inventory_movements::Entity as InventoryMovements;
