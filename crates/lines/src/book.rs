use std::collections::BTreeMap;

use rust_decimal::Decimal;

use stockroom_core::DomainError;
use stockroom_products::{ProductId, ProductRef};

use crate::line::{LineChanges, OrderLine};
use crate::totals::{DocumentTotals, TaxRate};

/// Lines owned by one order, numbered from 1.
///
/// Line numbers are never reused: removing line 2 and adding another line
/// yields line 3. Drafting methods (`draft_*`) are pure and return the line an
/// event should carry; mutating methods are for `apply`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLines<L> {
    lines: Vec<L>,
    last_line_no: u32,
}

impl<L: OrderLine> Default for OrderLines<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: OrderLine> OrderLines<L> {
    pub fn new() -> Self {
        Self {
            lines: Vec::new(),
            last_line_no: 0,
        }
    }

    pub fn as_slice(&self) -> &[L] {
        &self.lines
    }

    pub fn iter(&self) -> impl Iterator<Item = &L> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn get(&self, line_no: u32) -> Option<&L> {
        self.lines.iter().find(|l| l.line_no() == line_no)
    }

    /// Build (and validate) the next line without storing it.
    pub fn draft_add(&self, product: &ProductRef, changes: &LineChanges) -> Result<L, DomainError> {
        let mut line = L::for_product(self.last_line_no + 1, product)?;
        line.apply_changes(changes)?;
        line.validate()?;
        Ok(line)
    }

    /// Build (and validate) the edited version of an existing line without storing it.
    pub fn draft_update(&self, line_no: u32, changes: &LineChanges) -> Result<L, DomainError> {
        if changes.is_empty() {
            return Err(DomainError::validation("line edit has no changes"));
        }
        let mut line = self
            .get(line_no)
            .cloned()
            .ok_or_else(|| DomainError::validation(format!("order has no line {line_no}")))?;
        line.apply_changes(changes)?;
        line.validate()?;
        Ok(line)
    }

    pub fn ensure_exists(&self, line_no: u32) -> Result<(), DomainError> {
        match self.get(line_no) {
            Some(_) => Ok(()),
            None => Err(DomainError::validation(format!("order has no line {line_no}"))),
        }
    }

    pub fn insert(&mut self, line: L) {
        self.last_line_no = self.last_line_no.max(line.line_no());
        self.lines.push(line);
    }

    pub fn replace(&mut self, line: L) {
        if let Some(slot) = self.lines.iter_mut().find(|l| l.line_no() == line.line_no()) {
            *slot = line;
        }
    }

    pub fn remove(&mut self, line_no: u32) {
        self.lines.retain(|l| l.line_no() != line_no);
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Total quantity per product, across all lines.
    pub fn demand_by_product(&self) -> Result<BTreeMap<ProductId, Decimal>, DomainError> {
        let mut demand = BTreeMap::new();
        for line in &self.lines {
            let total = demand.entry(line.product_id()).or_insert(Decimal::ZERO);
            *total = total
                .checked_add(line.quantity())
                .ok_or_else(DomainError::amount_out_of_range)?;
        }
        Ok(demand)
    }

    pub fn totals(&self, tax_rate: TaxRate, discount: Decimal) -> Result<DocumentTotals, DomainError> {
        DocumentTotals::compute(self.lines.iter().map(|l| l.subtotal()), tax_rate, discount)
    }

    /// Totals as they would be with `line` added, or replacing the line with
    /// the same number.
    pub fn totals_with(
        &self,
        line: &L,
        tax_rate: TaxRate,
        discount: Decimal,
    ) -> Result<DocumentTotals, DomainError> {
        let others = self
            .lines
            .iter()
            .filter(|l| l.line_no() != line.line_no())
            .map(|l| l.subtotal());
        DocumentTotals::compute(others.chain([line.subtotal()]), tax_rate, discount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::{PurchaseLine, SaleLine};
    use rust_decimal_macros::dec;

    fn product(cost: Decimal, selling: Decimal) -> ProductRef {
        ProductRef {
            product_id: ProductId::generate(),
            code: "P".to_string(),
            name: "Product".to_string(),
            description: None,
            cost_price: cost,
            selling_price: selling,
        }
    }

    #[test]
    fn line_numbers_are_not_reused() {
        let mut book: OrderLines<PurchaseLine> = OrderLines::new();
        let p = product(dec!(2), dec!(3));
        let first = book.draft_add(&p, &LineChanges::quantity(dec!(1))).unwrap();
        book.insert(first);
        let second = book.draft_add(&p, &LineChanges::quantity(dec!(1))).unwrap();
        book.insert(second);
        book.remove(2);

        let third = book.draft_add(&p, &LineChanges::quantity(dec!(1))).unwrap();
        assert_eq!(third.line_no(), 3);
    }

    #[test]
    fn draft_add_rejects_invalid_quantity() {
        let book: OrderLines<SaleLine> = OrderLines::new();
        let err = book
            .draft_add(&product(dec!(1), dec!(2)), &LineChanges::quantity(dec!(0)))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn draft_update_does_not_mutate() {
        let mut book: OrderLines<SaleLine> = OrderLines::new();
        let line = book
            .draft_add(&product(dec!(1), dec!(2)), &LineChanges::quantity(dec!(5)))
            .unwrap();
        book.insert(line);

        let edited = book.draft_update(1, &LineChanges::quantity(dec!(7))).unwrap();
        assert_eq!(edited.quantity(), dec!(7));
        assert_eq!(book.get(1).map(|l| l.quantity()), Some(dec!(5)));

        book.replace(edited);
        assert_eq!(book.get(1).map(|l| l.quantity()), Some(dec!(7)));
    }

    #[test]
    fn unknown_line_is_a_validation_error() {
        let book: OrderLines<SaleLine> = OrderLines::new();
        assert!(matches!(
            book.draft_update(9, &LineChanges::quantity(dec!(1))),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn demand_sums_lines_per_product() {
        let mut book: OrderLines<SaleLine> = OrderLines::new();
        let a = product(dec!(1), dec!(2));
        let b = product(dec!(1), dec!(2));
        for (p, q) in [(&a, dec!(2)), (&b, dec!(1)), (&a, dec!(3))] {
            let line = book.draft_add(p, &LineChanges::quantity(q)).unwrap();
            book.insert(line);
        }

        let demand = book.demand_by_product().unwrap();
        assert_eq!(demand.get(&a.product_id), Some(&dec!(5)));
        assert_eq!(demand.get(&b.product_id), Some(&dec!(1)));
    }

    #[test]
    fn totals_follow_lines() {
        let mut book: OrderLines<PurchaseLine> = OrderLines::new();
        let line = book
            .draft_add(&product(dec!(10), dec!(12)), &LineChanges::quantity(dec!(3)))
            .unwrap();
        book.insert(line);

        let totals = book.totals(TaxRate::default(), Decimal::ZERO).unwrap();
        assert_eq!(totals.subtotal, dec!(30));
        assert_eq!(totals.tax_amount, dec!(4.5));
        assert_eq!(totals.total_amount, dec!(34.5));
    }

    #[test]
    fn overflowing_demand_and_totals_are_errors() {
        let mut book: OrderLines<PurchaseLine> = OrderLines::new();
        let p = product(Decimal::ONE, dec!(2));
        let line = book.draft_add(&p, &LineChanges::quantity(Decimal::MAX)).unwrap();
        book.insert(line);
        let line = book.draft_add(&p, &LineChanges::quantity(dec!(1))).unwrap();

        assert!(book.totals_with(&line, TaxRate::default(), Decimal::ZERO).is_err());
        book.insert(line);
        assert_eq!(book.demand_by_product(), Err(DomainError::amount_out_of_range()));
        assert_eq!(
            book.totals(TaxRate::default(), Decimal::ZERO),
            Err(DomainError::amount_out_of_range())
        );
    }

    #[test]
    fn totals_with_replaces_a_line_of_the_same_number() {
        let mut book: OrderLines<PurchaseLine> = OrderLines::new();
        let p = product(dec!(10), dec!(12));
        let line = book.draft_add(&p, &LineChanges::quantity(dec!(3))).unwrap();
        book.insert(line);

        let edited = book.draft_update(1, &LineChanges::quantity(dec!(5))).unwrap();
        let totals = book.totals_with(&edited, TaxRate::default(), Decimal::ZERO).unwrap();
        assert_eq!(totals.subtotal, dec!(50));
    }
}
