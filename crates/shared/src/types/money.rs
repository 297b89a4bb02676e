//! Money policy: exact decimal parsing and the single rounding rule.
//!
//! CRITICAL: Never use floating-point for money calculations.
//! Every monetary value that is persisted or compared is the output of
//! [`quantize`]. Multi-step computations stay at full precision and are
//! quantized once, at the end.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of fractional digits kept for every monetary amount.
pub const MONEY_SCALE: u32 = 2;

/// Errors from strict money parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    /// Input is not a decimal number.
    #[error("not a decimal amount: {0:?}")]
    Unparsable(String),
}

/// Conversion of loosely typed input into an exact decimal.
///
/// Returns `None` when the input has no decimal interpretation.
pub trait ToDecimal {
    /// Converts to an exact decimal, if possible.
    fn to_decimal(&self) -> Option<Decimal>;
}

impl ToDecimal for Decimal {
    fn to_decimal(&self) -> Option<Decimal> {
        Some(*self)
    }
}

impl ToDecimal for str {
    fn to_decimal(&self) -> Option<Decimal> {
        let trimmed = self.trim();
        if trimmed.is_empty() {
            return None;
        }
        Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .ok()
    }
}

impl ToDecimal for String {
    fn to_decimal(&self) -> Option<Decimal> {
        self.as_str().to_decimal()
    }
}

impl ToDecimal for f64 {
    /// Goes through the shortest decimal representation of the float, so
    /// `12.345_f64` becomes exactly `12.345`, not its binary approximation.
    fn to_decimal(&self) -> Option<Decimal> {
        if self.is_finite() {
            self.to_string().as_str().to_decimal()
        } else {
            None
        }
    }
}

impl ToDecimal for f32 {
    fn to_decimal(&self) -> Option<Decimal> {
        if self.is_finite() {
            self.to_string().as_str().to_decimal()
        } else {
            None
        }
    }
}

macro_rules! integer_to_decimal {
    ($($ty:ty),*) => {
        $(
            impl ToDecimal for $ty {
                fn to_decimal(&self) -> Option<Decimal> {
                    Some(Decimal::from(*self))
                }
            }
        )*
    };
}

integer_to_decimal!(i32, i64, u32, u64);

impl<T: ToDecimal> ToDecimal for Option<T> {
    fn to_decimal(&self) -> Option<Decimal> {
        self.as_ref().and_then(ToDecimal::to_decimal)
    }
}

impl<T: ToDecimal + ?Sized> ToDecimal for &T {
    fn to_decimal(&self) -> Option<Decimal> {
        (**self).to_decimal()
    }
}

/// Parses `value` into an exact decimal, yielding `default` on any failure.
///
/// # Example
///
/// ```
/// use rust_decimal::Decimal;
/// use tally_shared::types::money::to_decimal;
///
/// assert_eq!(to_decimal("19.99", Decimal::ZERO), Decimal::new(1999, 2));
/// assert_eq!(to_decimal("n/a", Decimal::ONE), Decimal::ONE);
/// ```
pub fn to_decimal<V: ToDecimal>(value: V, default: Decimal) -> Decimal {
    value.to_decimal().unwrap_or(default)
}

/// Quantizes an exact decimal to two fractional digits, round-half-up.
///
/// Half-up means midpoints move away from zero, so `-0.005` becomes `-0.01`.
/// The result always carries scale 2 (`5` becomes `5.00`).
#[must_use]
pub fn quantize(value: Decimal) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_SCALE);
    rounded
}

/// Parses and quantizes in one step. Unparsable input rounds to `0.00`.
///
/// # Example
///
/// ```
/// use rust_decimal::Decimal;
/// use tally_shared::types::money::round;
///
/// assert_eq!(round("12.345"), Decimal::new(1235, 2));
/// assert_eq!(round(None::<&str>).to_string(), "0.00");
/// ```
pub fn round<V: ToDecimal>(value: V) -> Decimal {
    quantize(to_decimal(value, Decimal::ZERO))
}

/// A monetary amount that has already been quantized.
///
/// The only constructors quantize, so any `Amount` is safe to persist or
/// compare. Addition and subtraction keep the scale; there is deliberately no
/// multiplication, which must happen on raw decimals before quantizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    /// The zero amount, `0.00`.
    pub const ZERO: Self = Self(Decimal::from_parts(0, 0, 0, false, MONEY_SCALE));

    /// Quantizes an exact decimal into an amount.
    #[must_use]
    pub fn quantize(value: Decimal) -> Self {
        Self(quantize(value))
    }

    /// Lenient constructor: parses anything, unparsable input becomes `0.00`.
    pub fn lenient<V: ToDecimal>(value: V) -> Self {
        Self(round(value))
    }

    /// Returns the quantized decimal.
    #[must_use]
    pub const fn value(self) -> Decimal {
        self.0
    }

    /// Returns true if the amount is zero.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the amount is negative.
    #[must_use]
    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Self::quantize(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl FromStr for Amount {
    type Err = MoneyError;

    /// Strict parse, used when reading stored amounts back.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.to_decimal()
            .map(Self::quantize)
            .ok_or_else(|| MoneyError::Unparsable(s.to_string()))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for Amount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Amount {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Neg for Amount {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case("12.345", dec!(12.35))]
    #[case("12.344", dec!(12.34))]
    #[case("0.005", dec!(0.01))]
    #[case("-0.005", dec!(-0.01))]
    #[case("  7 ", dec!(7.00))]
    #[case("1e2", dec!(100.00))]
    #[case("abc", dec!(0.00))]
    #[case("", dec!(0.00))]
    fn test_round_text(#[case] input: &str, #[case] expected: Decimal) {
        assert_eq!(round(input), expected);
    }

    #[test]
    fn test_round_float_uses_shortest_representation() {
        // 12.345_f64 is 12.3449999... in binary; the policy must still round up.
        assert_eq!(round(12.345_f64), dec!(12.35));
        assert_eq!(round(2.675_f64), dec!(2.68));
    }

    #[test]
    fn test_round_none_and_non_finite() {
        assert_eq!(round(None::<&str>).to_string(), "0.00");
        assert_eq!(round(None::<Decimal>), Decimal::ZERO);
        assert_eq!(round(f64::NAN).to_string(), "0.00");
        assert_eq!(round(f64::INFINITY).to_string(), "0.00");
    }

    #[test]
    fn test_round_always_scale_two() {
        assert_eq!(round(5_i64).to_string(), "5.00");
        assert_eq!(round(dec!(1.1)).to_string(), "1.10");
    }

    #[test]
    fn test_to_decimal_default() {
        assert_eq!(to_decimal("oops", dec!(3)), dec!(3));
        assert_eq!(to_decimal(Some("1.5"), dec!(3)), dec!(1.5));
        assert_eq!(to_decimal(Some(String::from("2.25")), dec!(0)), dec!(2.25));
        assert_eq!(to_decimal(42_u32, dec!(0)), dec!(42));
    }

    #[test]
    fn test_amount_strict_parse() {
        assert_eq!("19.999".parse::<Amount>().unwrap().to_string(), "20.00");
        assert!(matches!(
            "ten".parse::<Amount>(),
            Err(MoneyError::Unparsable(_))
        ));
    }

    #[test]
    fn test_amount_sum_keeps_scale() {
        let total: Amount = ["0.10", "0.20", "0.30"]
            .iter()
            .map(|s| Amount::lenient(*s))
            .sum();
        assert_eq!(total.to_string(), "0.60");
        assert_eq!(Amount::ZERO.to_string(), "0.00");
    }

    #[test]
    fn test_amount_sign() {
        assert!(Amount::lenient("-1.00").is_negative());
        assert!(!Amount::ZERO.is_negative());
        assert!(Amount::lenient("0.001").is_zero());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Quantizing twice changes nothing.
        #[test]
        fn prop_quantize_idempotent(units in -1_000_000_000i64..1_000_000_000i64, scale in 0u32..8) {
            let value = Decimal::new(units, scale);
            let once = quantize(value);
            prop_assert_eq!(quantize(once), once);
            prop_assert_eq!(once.scale(), MONEY_SCALE);
        }

        /// The rounding error never exceeds half a cent.
        #[test]
        fn prop_quantize_error_bounded(units in -1_000_000_000i64..1_000_000_000i64, scale in 0u32..8) {
            let value = Decimal::new(units, scale);
            prop_assert!((quantize(value) - value).abs() <= dec!(0.005));
        }
    }
}
