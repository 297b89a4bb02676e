//! Property-based tests for the stock balance rules.
//!
//! Balance invariant: after any sequence of accepted movements, the running
//! balance equals the signed sum of the accepted deltas, and without the
//! negative-stock override it never drops below zero.

use proptest::prelude::*;

use super::movement::{Direction, MovementKind, StockRules, derive_balance};
use super::InventoryRuleError;

/// Strategy to generate a movement kind.
fn kind_strategy() -> impl Strategy<Value = MovementKind> {
    prop_oneof![
        Just(MovementKind::In),
        Just(MovementKind::Out),
        Just(MovementKind::Adjustment(Direction::Increase)),
        Just(MovementKind::Adjustment(Direction::Decrease)),
    ]
}

/// Strategy to generate a sequence of movement requests.
fn movements_strategy() -> impl Strategy<Value = Vec<(MovementKind, i64)>> {
    prop::collection::vec((kind_strategy(), 1i64..500), 0..60)
}

/// Posts every movement, skipping rejected ones, like the ledger does.
fn post_all(rules: StockRules, movements: &[(MovementKind, i64)]) -> (i64, Vec<i64>) {
    let mut balance = 0_i64;
    let mut accepted = Vec::new();
    for (kind, quantity) in movements {
        let delta = kind.signed_delta(*quantity).unwrap();
        match rules.apply(balance, delta) {
            Ok(next) => {
                balance = next;
                accepted.push(delta);
            }
            Err(InventoryRuleError::InsufficientStock { available, .. }) => {
                assert_eq!(available, balance);
            }
            Err(other) => panic!("unexpected rule error: {other}"),
        }
    }
    (balance, accepted)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// The running balance is always re-derivable from accepted deltas.
    #[test]
    fn prop_balance_equals_sum_of_deltas(movements in movements_strategy()) {
        let (balance, accepted) = post_all(StockRules::default(), &movements);
        prop_assert_eq!(derive_balance(accepted).unwrap(), balance);
    }

    /// Without the override the balance never goes negative.
    #[test]
    fn prop_balance_never_negative(movements in movements_strategy()) {
        let rules = StockRules::default();
        let mut balance = 0_i64;
        for (kind, quantity) in &movements {
            let delta = kind.signed_delta(*quantity).unwrap();
            if let Ok(next) = rules.apply(balance, delta) {
                balance = next;
            }
            prop_assert!(balance >= 0);
        }
    }

    /// With the override every movement is accepted.
    #[test]
    fn prop_override_accepts_everything(movements in movements_strategy()) {
        let rules = StockRules { allow_negative: true };
        let (_, accepted) = post_all(rules, &movements);
        prop_assert_eq!(accepted.len(), movements.len());
    }

    /// Increases are never rejected.
    #[test]
    fn prop_increases_always_accepted(start in -1_000i64..1_000, quantity in 1i64..1_000) {
        let delta = MovementKind::In.signed_delta(quantity).unwrap();
        prop_assert_eq!(StockRules::default().apply(start, delta), Ok(start + quantity));
    }
}
