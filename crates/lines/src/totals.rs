//! Document-level money: tax rate and order totals.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, ValueObject};

/// Tax rate as a decimal fraction (`0.15` = 15%).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxRate(Decimal);

impl TaxRate {
    /// 15%.
    pub const DEFAULT: TaxRate = TaxRate(Decimal::from_parts(15, 0, 0, false, 2));

    pub fn new(rate: Decimal) -> Result<Self, DomainError> {
        if rate < Decimal::ZERO || rate > Decimal::ONE {
            return Err(DomainError::validation(format!(
                "tax rate must be a fraction between 0 and 1, got {rate}"
            )));
        }
        Ok(Self(rate))
    }

    pub fn rate(&self) -> Decimal {
        self.0
    }

    pub fn tax_on(&self, amount: Decimal) -> Result<Decimal, DomainError> {
        amount
            .checked_mul(self.0)
            .ok_or_else(DomainError::amount_out_of_range)
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl ValueObject for TaxRate {}

impl core::fmt::Display for TaxRate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}%", self.0 * Decimal::ONE_HUNDRED)
    }
}

/// Subtotal, tax, discount and total of an order.
///
/// `total_amount = subtotal + tax_amount - discount_amount`, with
/// `tax_amount = subtotal * rate`. Purchase orders pass a zero discount.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTotals {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
}

impl DocumentTotals {
    pub fn compute(
        subtotals: impl IntoIterator<Item = Decimal>,
        tax_rate: TaxRate,
        discount_amount: Decimal,
    ) -> Result<Self, DomainError> {
        let subtotal = subtotals
            .into_iter()
            .try_fold(Decimal::ZERO, |acc, s| acc.checked_add(s))
            .ok_or_else(DomainError::amount_out_of_range)?;
        let tax_amount = tax_rate.tax_on(subtotal)?;
        let total_amount = subtotal
            .checked_add(tax_amount)
            .and_then(|t| t.checked_sub(discount_amount))
            .ok_or_else(DomainError::amount_out_of_range)?;
        Ok(Self {
            subtotal,
            tax_amount,
            discount_amount,
            total_amount,
        })
    }
}

impl ValueObject for DocumentTotals {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn default_rate_is_fifteen_percent() {
        assert_eq!(TaxRate::default().rate(), dec!(0.15));
        assert!(TaxRate::default().to_string().starts_with("15"));
    }

    #[test]
    fn rate_outside_unit_interval_is_rejected() {
        assert!(TaxRate::new(dec!(-0.01)).is_err());
        assert!(TaxRate::new(dec!(1.5)).is_err());
        assert!(TaxRate::new(dec!(0)).is_ok());
    }

    #[test]
    fn sale_totals_net_of_discount() {
        let totals = DocumentTotals::compute([dec!(30), dec!(70)], TaxRate::default(), dec!(5)).unwrap();
        assert_eq!(totals.subtotal, dec!(100));
        assert_eq!(totals.tax_amount, dec!(15));
        assert_eq!(totals.total_amount, dec!(110));
    }

    #[test]
    fn empty_document_is_all_zero_without_discount() {
        let totals = DocumentTotals::compute(std::iter::empty(), TaxRate::default(), Decimal::ZERO);
        assert_eq!(totals, Ok(DocumentTotals::default()));
    }

    #[test]
    fn totals_that_do_not_fit_are_rejected() {
        let err = DocumentTotals::compute([Decimal::MAX, dec!(1)], TaxRate::default(), Decimal::ZERO)
            .unwrap_err();
        assert_eq!(err, DomainError::amount_out_of_range());

        // The subtotal fits, adding tax on top does not.
        let err = DocumentTotals::compute([Decimal::MAX], TaxRate::default(), Decimal::ZERO)
            .unwrap_err();
        assert_eq!(err, DomainError::amount_out_of_range());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: totals always satisfy total = subtotal + tax - discount with tax = rate * subtotal.
        #[test]
        fn totals_identity_holds(
            subtotals in prop::collection::vec(0i64..1_000_000, 0..20),
            rate_bp in 0i64..=10_000,
            discount_cents in 0i64..100_000,
        ) {
            let rate = TaxRate::new(Decimal::new(rate_bp, 4)).unwrap();
            let discount = Decimal::new(discount_cents, 2);
            let values: Vec<Decimal> = subtotals.iter().map(|c| Decimal::new(*c, 2)).collect();
            let totals = DocumentTotals::compute(values.clone(), rate, discount).unwrap();

            let expected_subtotal: Decimal = values.into_iter().sum();
            prop_assert_eq!(totals.subtotal, expected_subtotal);
            prop_assert_eq!(totals.tax_amount, expected_subtotal * rate.rate());
            prop_assert_eq!(totals.total_amount, totals.subtotal + totals.tax_amount - totals.discount_amount);
        }
    }
}
