use crate::error::SettlementError;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Represents a positive monetary amount for settlement operations.
///
/// This is a wrapper around `rust_decimal::Decimal` to enforce domain-specific
/// rules and provide type safety for financial calculations: credits, debits
/// and withdrawal requests must always be strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, SettlementError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(SettlementError::Validation(
                "amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = SettlementError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Rounds a monetary value to the currency's minor unit (2 decimal places for
/// NGN-like currencies), half away from zero.
pub fn round_minor(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Tolerance for the ledger balance invariant. Aggregates are rounded at the
/// point of aggregation, so independent legs may drift by at most one minor
/// unit against each other.
pub fn balance_tolerance() -> Decimal {
    Decimal::new(1, 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(1.0)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.0)),
            Err(SettlementError::Validation(_))
        ));
        assert!(matches!(
            Amount::new(dec!(-1.0)),
            Err(SettlementError::Validation(_))
        ));
    }

    #[test]
    fn test_round_minor_half_away_from_zero() {
        assert_eq!(round_minor(dec!(806.2500)), dec!(806.25));
        assert_eq!(round_minor(dec!(0.005)), dec!(0.01));
        assert_eq!(round_minor(dec!(1.004)), dec!(1.00));
        assert_eq!(round_minor(dec!(-0.005)), dec!(-0.01));
    }

    #[test]
    fn test_balance_tolerance_is_one_minor_unit() {
        assert_eq!(balance_tolerance(), dec!(0.01));
    }
}
