//! Inventory rule errors.

use thiserror::Error;

/// Errors raised by the stock rules before anything is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryRuleError {
    /// Movement quantity must be strictly positive.
    #[error("Movement quantity must be positive, got {0}")]
    InvalidQuantity(i64),

    /// A decrease would take the balance below zero.
    #[error("Insufficient stock: {available} available, {requested} requested")]
    InsufficientStock {
        /// Balance before the movement.
        available: i64,
        /// Units the movement tried to take.
        requested: u64,
    },

    /// Balance arithmetic left the representable range.
    #[error("Stock balance overflow")]
    Overflow,

    /// Stored movement tag is not recognised.
    #[error("Unknown movement type '{0}'")]
    UnknownMovementType(String),
}
