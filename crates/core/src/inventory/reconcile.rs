//! Comparison of cached balances against their movement history.

use serde::Serialize;
use tally_shared::types::ItemId;

/// Cached balance disagrees with the sum of movements.
///
/// Non-fatal: it is reported for an operator to investigate and the cached
/// value is left as it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DataIntegrityWarning {
    /// Affected item.
    pub item_id: ItemId,
    /// Balance stored on the item row.
    pub cached: i64,
    /// Balance re-derived from movements.
    pub derived: i64,
}

impl DataIntegrityWarning {
    /// Signed difference `cached - derived`.
    #[must_use]
    pub const fn drift(&self) -> i64 {
        self.cached - self.derived
    }
}

impl std::fmt::Display for DataIntegrityWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "item {} cached balance {} differs from movement sum {} (drift {})",
            self.item_id,
            self.cached,
            self.derived,
            self.drift()
        )
    }
}

/// Outcome of reconciling one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Reconciliation {
    /// Cached balance matches the movement sum.
    Consistent {
        /// Affected item.
        item_id: ItemId,
        /// The agreed balance.
        balance: i64,
    },
    /// Cached balance has drifted.
    Drift(DataIntegrityWarning),
}

impl Reconciliation {
    /// Compares a cached balance with a derived one.
    #[must_use]
    pub const fn compare(item_id: ItemId, cached: i64, derived: i64) -> Self {
        if cached == derived {
            Self::Consistent {
                item_id,
                balance: cached,
            }
        } else {
            Self::Drift(DataIntegrityWarning {
                item_id,
                cached,
                derived,
            })
        }
    }

    /// Returns true if no drift was found.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        matches!(self, Self::Consistent { .. })
    }

    /// Returns the warning, if any.
    #[must_use]
    pub const fn warning(&self) -> Option<&DataIntegrityWarning> {
        match self {
            Self::Consistent { .. } => None,
            Self::Drift(warning) => Some(warning),
        }
    }
}
