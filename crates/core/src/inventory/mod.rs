//! Movement-sourced stock balances.
//!
//! This module implements the pure inventory rules:
//! - Movement types and explicit signing of quantities
//! - The non-negative balance rule and its override
//! - Re-deriving balances from movements and reporting drift

pub mod error;
pub mod movement;
pub mod reconcile;

#[cfg(test)]
mod movement_props;

pub use error::InventoryRuleError;
pub use movement::{Direction, MovementKind, MovementType, StockRules, derive_balance};
pub use reconcile::{DataIntegrityWarning, Reconciliation};
