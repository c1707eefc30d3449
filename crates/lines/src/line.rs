//! Purchase and sale lines.
//!
//! Fields are private so the subtotal cannot drift from its inputs: every
//! setter that touches quantity, unit price or discount recomputes it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, Entity};
use stockroom_products::{ProductId, ProductRef};

/// `quantity * unit_price`.
pub fn purchase_subtotal(quantity: Decimal, unit_price: Decimal) -> Result<Decimal, DomainError> {
    quantity
        .checked_mul(unit_price)
        .ok_or_else(DomainError::amount_out_of_range)
}

/// `quantity * unit_price * (1 - discount / 100)`, discount in percent.
pub fn sale_subtotal(
    quantity: Decimal,
    unit_price: Decimal,
    discount: Decimal,
) -> Result<Decimal, DomainError> {
    let factor = discount
        .checked_div(Decimal::ONE_HUNDRED)
        .and_then(|d| Decimal::ONE.checked_sub(d))
        .ok_or_else(DomainError::amount_out_of_range)?;
    purchase_subtotal(quantity, unit_price)?
        .checked_mul(factor)
        .ok_or_else(DomainError::amount_out_of_range)
}

/// Partial edit of a line. `None` keeps the current value.
///
/// A product change runs `set_product` first, so explicit `unit_price` or
/// `description` values in the same edit win over the product's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineChanges {
    pub product: Option<ProductRef>,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub discount: Option<Decimal>,
    pub description: Option<String>,
}

impl LineChanges {
    pub fn quantity(quantity: Decimal) -> Self {
        Self {
            quantity: Some(quantity),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.product.is_none()
            && self.quantity.is_none()
            && self.unit_price.is_none()
            && self.discount.is_none()
            && self.description.is_none()
    }
}

/// Behavior every order line shares, used by [`crate::OrderLines`].
pub trait OrderLine: Entity<Id = u32> + Clone {
    /// New line for `product`, quantity 1, prices pre-filled from the product.
    fn for_product(line_no: u32, product: &ProductRef) -> Result<Self, DomainError>;

    fn line_no(&self) -> u32;
    fn product_id(&self) -> ProductId;
    fn quantity(&self) -> Decimal;
    fn subtotal(&self) -> Decimal;

    /// Apply an edit, recomputing the subtotal. Does not validate, but fails
    /// when the subtotal does not fit.
    fn apply_changes(&mut self, changes: &LineChanges) -> Result<(), DomainError>;

    fn validate(&self) -> Result<(), DomainError>;
}

fn validate_common(line_no: u32, quantity: Decimal, unit_price: Decimal) -> Result<(), DomainError> {
    if quantity <= Decimal::ZERO {
        return Err(DomainError::validation(format!(
            "line {line_no}: quantity must be positive"
        )));
    }
    if unit_price < Decimal::ZERO {
        return Err(DomainError::validation(format!(
            "line {line_no}: unit price cannot be negative"
        )));
    }
    Ok(())
}

/// Purchase order line, priced at the product's cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseLine {
    line_no: u32,
    product_id: ProductId,
    description: Option<String>,
    quantity: Decimal,
    unit_price: Decimal,
    subtotal: Decimal,
}

impl PurchaseLine {
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    /// Overwrites unit price with the cost price and copies the description.
    pub fn set_product(&mut self, product: &ProductRef) -> Result<(), DomainError> {
        self.subtotal = purchase_subtotal(self.quantity, product.cost_price)?;
        self.product_id = product.product_id;
        self.unit_price = product.cost_price;
        self.description = product.description.clone();
        Ok(())
    }

    pub fn set_quantity(&mut self, quantity: Decimal) -> Result<(), DomainError> {
        self.subtotal = purchase_subtotal(quantity, self.unit_price)?;
        self.quantity = quantity;
        Ok(())
    }

    pub fn set_unit_price(&mut self, unit_price: Decimal) -> Result<(), DomainError> {
        self.subtotal = purchase_subtotal(self.quantity, unit_price)?;
        self.unit_price = unit_price;
        Ok(())
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
    }
}

impl Entity for PurchaseLine {
    type Id = u32;

    fn id(&self) -> &Self::Id {
        &self.line_no
    }
}

impl OrderLine for PurchaseLine {
    fn for_product(line_no: u32, product: &ProductRef) -> Result<Self, DomainError> {
        let mut line = Self {
            line_no,
            product_id: product.product_id,
            description: None,
            quantity: Decimal::ONE,
            unit_price: Decimal::ZERO,
            subtotal: Decimal::ZERO,
        };
        line.set_product(product)?;
        Ok(line)
    }

    fn line_no(&self) -> u32 {
        self.line_no
    }

    fn product_id(&self) -> ProductId {
        self.product_id
    }

    fn quantity(&self) -> Decimal {
        self.quantity
    }

    fn subtotal(&self) -> Decimal {
        self.subtotal
    }

    fn apply_changes(&mut self, changes: &LineChanges) -> Result<(), DomainError> {
        if changes.discount.is_some() {
            return Err(DomainError::validation("purchase lines do not take a discount"));
        }
        if let Some(product) = &changes.product {
            self.set_product(product)?;
        }
        if let Some(quantity) = changes.quantity {
            self.set_quantity(quantity)?;
        }
        if let Some(unit_price) = changes.unit_price {
            self.set_unit_price(unit_price)?;
        }
        if let Some(description) = &changes.description {
            self.set_description(Some(description.clone()));
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), DomainError> {
        validate_common(self.line_no, self.quantity, self.unit_price)
    }
}

/// Sale order line, priced at the product's selling price, with a percent discount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLine {
    line_no: u32,
    product_id: ProductId,
    description: Option<String>,
    quantity: Decimal,
    unit_price: Decimal,
    discount: Decimal,
    subtotal: Decimal,
}

impl SaleLine {
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    pub fn discount(&self) -> Decimal {
        self.discount
    }

    /// Overwrites unit price with the selling price and copies the description.
    /// Quantity and discount are left alone.
    pub fn set_product(&mut self, product: &ProductRef) -> Result<(), DomainError> {
        self.subtotal = sale_subtotal(self.quantity, product.selling_price, self.discount)?;
        self.product_id = product.product_id;
        self.unit_price = product.selling_price;
        self.description = product.description.clone();
        Ok(())
    }

    pub fn set_quantity(&mut self, quantity: Decimal) -> Result<(), DomainError> {
        self.subtotal = sale_subtotal(quantity, self.unit_price, self.discount)?;
        self.quantity = quantity;
        Ok(())
    }

    pub fn set_unit_price(&mut self, unit_price: Decimal) -> Result<(), DomainError> {
        self.subtotal = sale_subtotal(self.quantity, unit_price, self.discount)?;
        self.unit_price = unit_price;
        Ok(())
    }

    pub fn set_discount(&mut self, discount: Decimal) -> Result<(), DomainError> {
        self.subtotal = sale_subtotal(self.quantity, self.unit_price, discount)?;
        self.discount = discount;
        Ok(())
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
    }
}

impl Entity for SaleLine {
    type Id = u32;

    fn id(&self) -> &Self::Id {
        &self.line_no
    }
}

impl OrderLine for SaleLine {
    fn for_product(line_no: u32, product: &ProductRef) -> Result<Self, DomainError> {
        let mut line = Self {
            line_no,
            product_id: product.product_id,
            description: None,
            quantity: Decimal::ONE,
            unit_price: Decimal::ZERO,
            discount: Decimal::ZERO,
            subtotal: Decimal::ZERO,
        };
        line.set_product(product)?;
        Ok(line)
    }

    fn line_no(&self) -> u32 {
        self.line_no
    }

    fn product_id(&self) -> ProductId {
        self.product_id
    }

    fn quantity(&self) -> Decimal {
        self.quantity
    }

    fn subtotal(&self) -> Decimal {
        self.subtotal
    }

    fn apply_changes(&mut self, changes: &LineChanges) -> Result<(), DomainError> {
        if let Some(product) = &changes.product {
            self.set_product(product)?;
        }
        if let Some(quantity) = changes.quantity {
            self.set_quantity(quantity)?;
        }
        if let Some(unit_price) = changes.unit_price {
            self.set_unit_price(unit_price)?;
        }
        if let Some(discount) = changes.discount {
            self.set_discount(discount)?;
        }
        if let Some(description) = &changes.description {
            self.set_description(Some(description.clone()));
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), DomainError> {
        validate_common(self.line_no, self.quantity, self.unit_price)?;
        if self.discount < Decimal::ZERO || self.discount > Decimal::ONE_HUNDRED {
            return Err(DomainError::validation(format!(
                "line {}: discount must be between 0 and 100",
                self.line_no
            )));
        }
        Ok(())
    }
}
