//! Stock movement types and the sign rules that turn them into deltas.

use serde::{Deserialize, Serialize};

use super::error::InventoryRuleError;

/// Type tag persisted on every movement row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementType {
    /// Goods received.
    In,
    /// Goods issued.
    Out,
    /// Manual correction, either direction.
    Adjustment,
}

impl MovementType {
    /// Stored form of the tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::In => "IN",
            Self::Out => "OUT",
            Self::Adjustment => "ADJUSTMENT",
        }
    }
}

impl std::fmt::Display for MovementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MovementType {
    type Err = InventoryRuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "IN" => Ok(Self::In),
            "OUT" => Ok(Self::Out),
            "ADJUSTMENT" => Ok(Self::Adjustment),
            _ => Err(InventoryRuleError::UnknownMovementType(s.to_string())),
        }
    }
}

/// Direction of an adjustment. Adjustments never infer their sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Adds to the balance.
    Increase,
    /// Takes from the balance.
    Decrease,
}

/// A requested movement kind, carrying everything needed to sign the quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementKind {
    /// Goods received, positive delta.
    In,
    /// Goods issued, negative delta.
    Out,
    /// Correction with an explicit direction.
    Adjustment(Direction),
}

impl MovementKind {
    /// Tag written to the movement row.
    #[must_use]
    pub const fn movement_type(&self) -> MovementType {
        match self {
            Self::In => MovementType::In,
            Self::Out => MovementType::Out,
            Self::Adjustment(_) => MovementType::Adjustment,
        }
    }

    /// Returns true if the movement takes stock away.
    #[must_use]
    pub const fn is_decrease(&self) -> bool {
        matches!(self, Self::Out | Self::Adjustment(Direction::Decrease))
    }

    /// Signs a positive quantity.
    ///
    /// # Errors
    ///
    /// Returns `InventoryRuleError::InvalidQuantity` unless `quantity > 0`.
    pub fn signed_delta(&self, quantity: i64) -> Result<i64, InventoryRuleError> {
        if quantity <= 0 {
            return Err(InventoryRuleError::InvalidQuantity(quantity));
        }
        if self.is_decrease() {
            Ok(-quantity)
        } else {
            Ok(quantity)
        }
    }
}

/// Rules applied when a delta is posted against a balance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StockRules {
    /// Lets decreases take the balance below zero.
    pub allow_negative: bool,
}

impl StockRules {
    /// Computes the balance after applying `delta`.
    ///
    /// # Errors
    ///
    /// Returns `InventoryRuleError::InsufficientStock` when a decrease would go
    /// below zero and negatives are not allowed, and
    /// `InventoryRuleError::Overflow` if the balance leaves the `i64` range.
    pub fn apply(self, current: i64, delta: i64) -> Result<i64, InventoryRuleError> {
        let next = current
            .checked_add(delta)
            .ok_or(InventoryRuleError::Overflow)?;
        if delta < 0 && next < 0 && !self.allow_negative {
            return Err(InventoryRuleError::InsufficientStock {
                available: current,
                requested: delta.unsigned_abs(),
            });
        }
        Ok(next)
    }
}

/// Balance re-derived from movement deltas.
///
/// # Errors
///
/// Returns `InventoryRuleError::Overflow` if the sum leaves the `i64` range.
pub fn derive_balance<I>(deltas: I) -> Result<i64, InventoryRuleError>
where
    I: IntoIterator<Item = i64>,
{
    deltas
        .into_iter()
        .try_fold(0_i64, |sum, delta| sum.checked_add(delta))
        .ok_or(InventoryRuleError::Overflow)
}
