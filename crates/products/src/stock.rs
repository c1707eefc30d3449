//! Derived catalog values: stock state classification and profit margin.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockroom_core::DomainError;

/// Classification of on-hand quantity against the minimum threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockState {
    Available,
    LowStock,
    OutOfStock,
}

impl StockState {
    /// Pure function of `(quantity_on_hand, minimum_quantity)`.
    pub fn classify(quantity_on_hand: Decimal, minimum_quantity: Decimal) -> Self {
        if quantity_on_hand <= Decimal::ZERO {
            StockState::OutOfStock
        } else if quantity_on_hand <= minimum_quantity {
            StockState::LowStock
        } else {
            StockState::Available
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StockState::Available => "available",
            StockState::LowStock => "low_stock",
            StockState::OutOfStock => "out_of_stock",
        }
    }
}

impl core::fmt::Display for StockState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a product's on-hand quantity moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockMovementReason {
    PurchaseReceipt,
    SaleConfirmation,
    SaleCancellation,
    ManualAdjustment,
}

/// Profit margin in percent: `(selling - cost) / cost * 100`, or 0 when cost <= 0.
pub fn profit_margin(cost_price: Decimal, selling_price: Decimal) -> Result<Decimal, DomainError> {
    if cost_price <= Decimal::ZERO {
        return Ok(Decimal::ZERO);
    }
    selling_price
        .checked_sub(cost_price)
        .and_then(|gain| gain.checked_div(cost_price))
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .ok_or_else(DomainError::amount_out_of_range)
}

/// Prices cannot be negative, and their margin must be representable.
pub fn validate_prices(cost_price: Decimal, selling_price: Decimal) -> Result<(), DomainError> {
    if selling_price < Decimal::ZERO || cost_price < Decimal::ZERO {
        return Err(DomainError::validation("prices cannot be negative"));
    }
    profit_margin(cost_price, selling_price)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn zero_or_less_is_out_of_stock() {
        assert_eq!(StockState::classify(dec!(0), dec!(10)), StockState::OutOfStock);
        assert_eq!(StockState::classify(dec!(-1), dec!(10)), StockState::OutOfStock);
    }

    #[test]
    fn at_or_below_minimum_is_low_stock() {
        assert_eq!(StockState::classify(dec!(5), dec!(10)), StockState::LowStock);
        assert_eq!(StockState::classify(dec!(10), dec!(10)), StockState::LowStock);
    }

    #[test]
    fn above_minimum_is_available() {
        assert_eq!(StockState::classify(dec!(10.5), dec!(10)), StockState::Available);
    }

    #[test]
    fn zero_minimum_makes_any_positive_quantity_available() {
        assert_eq!(StockState::classify(dec!(1), dec!(0)), StockState::Available);
    }

    #[test]
    fn margin_is_zero_without_cost() {
        assert_eq!(profit_margin(dec!(0), dec!(50)), Ok(Decimal::ZERO));
    }

    #[test]
    fn margin_is_relative_to_cost() {
        assert_eq!(profit_margin(dec!(80), dec!(100)), Ok(dec!(25)));
        assert_eq!(profit_margin(dec!(100), dec!(80)), Ok(dec!(-20)));
    }

    #[test]
    fn unrepresentable_margin_rejects_the_prices() {
        assert_eq!(
            validate_prices(dec!(0.0001), Decimal::MAX),
            Err(DomainError::amount_out_of_range())
        );
    }

    #[test]
    fn negative_prices_are_rejected() {
        assert!(validate_prices(dec!(-0.01), dec!(1)).is_err());
        assert!(validate_prices(dec!(1), dec!(-5)).is_err());
        assert!(validate_prices(dec!(0), dec!(0)).is_ok());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 512,
            ..ProptestConfig::default()
        })]

        /// Property: the classification partitions quantities exactly at 0 and at the minimum.
        #[test]
        fn classification_matches_thresholds(qty in -1_000i64..10_000i64, min in 0i64..5_000i64) {
            let state = StockState::classify(Decimal::from(qty), Decimal::from(min));
            let expected = if qty <= 0 {
                StockState::OutOfStock
            } else if qty <= min {
                StockState::LowStock
            } else {
                StockState::Available
            };
            prop_assert_eq!(state, expected);
        }
    }
}
