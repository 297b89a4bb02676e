//! Price computations over an explicit configuration snapshot.
//!
//! Tax and surcharge rates come from the configuration table, but they are
//! read once into a [`ConfigSnapshot`] and passed in; nothing here reads
//! shared state. Every intermediate figure is kept at full precision and each
//! reported amount is quantized exactly once.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;
use tally_shared::types::Amount;

/// Configuration key for the sales tax rate (a fraction, e.g. `0.16`).
pub const TAX_RATE: &str = "tax_rate";

/// Configuration key for the payment surcharge rate, applied to the taxed amount.
pub const SURCHARGE_RATE: &str = "surcharge_rate";

/// Immutable copy of the numeric configuration parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSnapshot {
    values: BTreeMap<String, Decimal>,
}

impl ConfigSnapshot {
    /// Creates a snapshot from key/value pairs.
    pub fn new<K, I>(values: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Decimal)>,
    {
        Self {
            values: values.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Returns a copy with one value replaced.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: Decimal) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    /// Looks up a parameter.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Decimal> {
        self.values.get(key).copied()
    }

    /// Looks up a rate, treating a missing key as zero.
    #[must_use]
    pub fn rate(&self, key: &str) -> Decimal {
        self.get(key).unwrap_or(Decimal::ZERO)
    }

    /// Sales tax rate.
    #[must_use]
    pub fn tax_rate(&self) -> Decimal {
        self.rate(TAX_RATE)
    }

    /// Payment surcharge rate.
    #[must_use]
    pub fn surcharge_rate(&self) -> Decimal {
        self.rate(SURCHARGE_RATE)
    }

    /// Number of parameters in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the snapshot holds no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One priced line: a quantity of units at a unit price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceLine {
    /// Units sold.
    pub quantity: i64,
    /// Price per unit.
    pub unit_price: Amount,
}

impl PriceLine {
    /// Unquantized line total.
    #[must_use]
    pub fn raw_total(&self) -> Decimal {
        self.unit_price.value() * Decimal::from(self.quantity)
    }
}

/// Quantized figures of a priced sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceBreakdown {
    /// Sum of the lines.
    pub subtotal: Amount,
    /// Tax on the subtotal.
    pub tax: Amount,
    /// Surcharge on subtotal plus tax.
    pub surcharge: Amount,
    /// Grand total, rounded from the unrounded parts.
    pub total: Amount,
}

impl PriceBreakdown {
    /// Computes the breakdown for a raw subtotal.
    ///
    /// The displayed parts are rounded independently from the total, so they
    /// may differ from it by a cent; the total is the authoritative figure.
    #[must_use]
    pub fn compute(subtotal: Decimal, config: &ConfigSnapshot) -> Self {
        let tax = subtotal * config.tax_rate();
        let surcharge = (subtotal + tax) * config.surcharge_rate();
        let total = subtotal + tax + surcharge;

        Self {
            subtotal: Amount::quantize(subtotal),
            tax: Amount::quantize(tax),
            surcharge: Amount::quantize(surcharge),
            total: Amount::quantize(total),
        }
    }

    /// Computes the breakdown for a set of lines.
    #[must_use]
    pub fn for_lines(lines: &[PriceLine], config: &ConfigSnapshot) -> Self {
        let subtotal = lines.iter().map(PriceLine::raw_total).sum();
        Self::compute(subtotal, config)
    }
}
