use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockroom_core::{Aggregate, AggregateRoot, DomainError};
use stockroom_events::Event;

use crate::stock::{StockMovementReason, StockState, profit_margin, validate_prices};

stockroom_core::aggregate_id!(
    /// Product identifier.
    ProductId
);

pub const DEFAULT_MINIMUM_QUANTITY: Decimal = Decimal::TEN;
pub const DEFAULT_MAXIMUM_QUANTITY: Decimal = Decimal::ONE_THOUSAND;

/// Product category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductCategory {
    Electronics,
    Clothing,
    Food,
    Furniture,
    #[default]
    Other,
}

/// Snapshot of the product fields an order line copies on product selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRef {
    pub product_id: ProductId,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
}

/// Aggregate root: Product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    code: String,
    name: String,
    description: Option<String>,
    category: ProductCategory,
    cost_price: Decimal,
    selling_price: Decimal,
    profit_margin: Decimal,
    quantity_on_hand: Decimal,
    minimum_quantity: Decimal,
    maximum_quantity: Decimal,
    stock_state: StockState,
    active: bool,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            code: String::new(),
            name: String::new(),
            description: None,
            category: ProductCategory::Other,
            cost_price: Decimal::ZERO,
            selling_price: Decimal::ZERO,
            profit_margin: Decimal::ZERO,
            quantity_on_hand: Decimal::ZERO,
            minimum_quantity: DEFAULT_MINIMUM_QUANTITY,
            maximum_quantity: DEFAULT_MAXIMUM_QUANTITY,
            stock_state: StockState::OutOfStock,
            active: true,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn category(&self) -> ProductCategory {
        self.category
    }

    pub fn cost_price(&self) -> Decimal {
        self.cost_price
    }

    pub fn selling_price(&self) -> Decimal {
        self.selling_price
    }

    pub fn profit_margin(&self) -> Decimal {
        self.profit_margin
    }

    pub fn quantity_on_hand(&self) -> Decimal {
        self.quantity_on_hand
    }

    pub fn minimum_quantity(&self) -> Decimal {
        self.minimum_quantity
    }

    pub fn maximum_quantity(&self) -> Decimal {
        self.maximum_quantity
    }

    pub fn stock_state(&self) -> StockState {
        self.stock_state
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Fields copied onto an order line when this product is selected.
    pub fn line_ref(&self) -> ProductRef {
        ProductRef {
            product_id: self.id,
            code: self.code.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            cost_price: self.cost_price,
            selling_price: self.selling_price,
        }
    }

    fn recompute_profit_margin(&mut self) {
        self.profit_margin = profit_margin(self.cost_price, self.selling_price).unwrap_or_default();
    }

    fn recompute_stock_state(&mut self) {
        self.stock_state = StockState::classify(self.quantity_on_hand, self.minimum_quantity);
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub product_id: ProductId,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub category: ProductCategory,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
    pub quantity_on_hand: Decimal,
    pub minimum_quantity: Decimal,
    pub maximum_quantity: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateProductDetails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProductDetails {
    pub product_id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub category: ProductCategory,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdatePrices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePrices {
    pub product_id: ProductId,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetStockThresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetStockThresholds {
    pub product_id: ProductId,
    pub minimum_quantity: Decimal,
    pub maximum_quantity: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdjustStock.
///
/// Positive `delta` adds stock, negative removes it. `reference` names the
/// document that caused the movement (e.g. a sale order reference).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub product_id: ProductId,
    pub delta: Decimal,
    pub reason: StockMovementReason,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ArchiveProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveProduct {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReactivateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactivateProduct {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    UpdateProductDetails(UpdateProductDetails),
    UpdatePrices(UpdatePrices),
    SetStockThresholds(SetStockThresholds),
    AdjustStock(AdjustStock),
    ArchiveProduct(ArchiveProduct),
    ReactivateProduct(ReactivateProduct),
}

/// Event: ProductCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub product_id: ProductId,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub category: ProductCategory,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
    pub quantity_on_hand: Decimal,
    pub minimum_quantity: Decimal,
    pub maximum_quantity: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductDetailsUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetailsUpdated {
    pub product_id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub category: ProductCategory,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PricesUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricesUpdated {
    pub product_id: ProductId,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockThresholdsUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockThresholdsUpdated {
    pub product_id: ProductId,
    pub minimum_quantity: Decimal,
    pub maximum_quantity: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockAdjusted.
///
/// `quantity_on_hand` is the resulting level; `handle` computed it with
/// checked arithmetic and `apply` takes it as is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjusted {
    pub product_id: ProductId,
    pub delta: Decimal,
    pub quantity_on_hand: Decimal,
    pub reason: StockMovementReason,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductArchived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductArchived {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductReactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductReactivated {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    ProductDetailsUpdated(ProductDetailsUpdated),
    PricesUpdated(PricesUpdated),
    StockThresholdsUpdated(StockThresholdsUpdated),
    StockAdjusted(StockAdjusted),
    ProductArchived(ProductArchived),
    ProductReactivated(ProductReactivated),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "products.product.created",
            ProductEvent::ProductDetailsUpdated(_) => "products.product.details_updated",
            ProductEvent::PricesUpdated(_) => "products.product.prices_updated",
            ProductEvent::StockThresholdsUpdated(_) => "products.product.thresholds_updated",
            ProductEvent::StockAdjusted(_) => "products.product.stock_adjusted",
            ProductEvent::ProductArchived(_) => "products.product.archived",
            ProductEvent::ProductReactivated(_) => "products.product.reactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::ProductDetailsUpdated(e) => e.occurred_at,
            ProductEvent::PricesUpdated(e) => e.occurred_at,
            ProductEvent::StockThresholdsUpdated(e) => e.occurred_at,
            ProductEvent::StockAdjusted(e) => e.occurred_at,
            ProductEvent::ProductArchived(e) => e.occurred_at,
            ProductEvent::ProductReactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.id = e.product_id;
                self.code = e.code.clone();
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.category = e.category;
                self.cost_price = e.cost_price;
                self.selling_price = e.selling_price;
                self.quantity_on_hand = e.quantity_on_hand;
                self.minimum_quantity = e.minimum_quantity;
                self.maximum_quantity = e.maximum_quantity;
                self.active = true;
                self.created = true;
                self.recompute_profit_margin();
                self.recompute_stock_state();
            }
            ProductEvent::ProductDetailsUpdated(e) => {
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.category = e.category;
            }
            ProductEvent::PricesUpdated(e) => {
                self.cost_price = e.cost_price;
                self.selling_price = e.selling_price;
                self.recompute_profit_margin();
            }
            ProductEvent::StockThresholdsUpdated(e) => {
                self.minimum_quantity = e.minimum_quantity;
                self.maximum_quantity = e.maximum_quantity;
                self.recompute_stock_state();
            }
            ProductEvent::StockAdjusted(e) => {
                self.quantity_on_hand = e.quantity_on_hand;
                self.recompute_stock_state();
            }
            ProductEvent::ProductArchived(_) => {
                self.active = false;
            }
            ProductEvent::ProductReactivated(_) => {
                self.active = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::CreateProduct(cmd) => self.handle_create(cmd),
            ProductCommand::UpdateProductDetails(cmd) => self.handle_update_details(cmd),
            ProductCommand::UpdatePrices(cmd) => self.handle_update_prices(cmd),
            ProductCommand::SetStockThresholds(cmd) => self.handle_set_thresholds(cmd),
            ProductCommand::AdjustStock(cmd) => self.handle_adjust_stock(cmd),
            ProductCommand::ArchiveProduct(cmd) => self.handle_archive(cmd),
            ProductCommand::ReactivateProduct(cmd) => self.handle_reactivate(cmd),
        }
    }
}

fn validate_thresholds(minimum: Decimal, maximum: Decimal) -> Result<(), DomainError> {
    if minimum < Decimal::ZERO {
        return Err(DomainError::validation("minimum quantity cannot be negative"));
    }
    if maximum < minimum {
        return Err(DomainError::validation(
            "maximum quantity cannot be below minimum quantity",
        ));
    }
    Ok(())
}

impl Product {
    fn ensure_exists(&self, product_id: ProductId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        if cmd.code.trim().is_empty() {
            return Err(DomainError::validation("product code cannot be empty"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        validate_prices(cmd.cost_price, cmd.selling_price)?;
        if cmd.quantity_on_hand < Decimal::ZERO {
            return Err(DomainError::validation(
                "initial quantity on hand cannot be negative",
            ));
        }
        validate_thresholds(cmd.minimum_quantity, cmd.maximum_quantity)?;

        // Code uniqueness needs a view across all products; the catalog
        // service reserves the code before dispatching this command.
        Ok(vec![ProductEvent::ProductCreated(ProductCreated {
            product_id: cmd.product_id,
            code: cmd.code.trim().to_string(),
            name: cmd.name.trim().to_string(),
            description: cmd.description.clone(),
            category: cmd.category,
            cost_price: cmd.cost_price,
            selling_price: cmd.selling_price,
            quantity_on_hand: cmd.quantity_on_hand,
            minimum_quantity: cmd.minimum_quantity,
            maximum_quantity: cmd.maximum_quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_details(
        &self,
        cmd: &UpdateProductDetails,
    ) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists(cmd.product_id)?;
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        Ok(vec![ProductEvent::ProductDetailsUpdated(ProductDetailsUpdated {
            product_id: cmd.product_id,
            name: cmd.name.trim().to_string(),
            description: cmd.description.clone(),
            category: cmd.category,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_prices(&self, cmd: &UpdatePrices) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists(cmd.product_id)?;
        validate_prices(cmd.cost_price, cmd.selling_price)?;

        Ok(vec![ProductEvent::PricesUpdated(PricesUpdated {
            product_id: cmd.product_id,
            cost_price: cmd.cost_price,
            selling_price: cmd.selling_price,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_thresholds(
        &self,
        cmd: &SetStockThresholds,
    ) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists(cmd.product_id)?;
        validate_thresholds(cmd.minimum_quantity, cmd.maximum_quantity)?;

        Ok(vec![ProductEvent::StockThresholdsUpdated(StockThresholdsUpdated {
            product_id: cmd.product_id,
            minimum_quantity: cmd.minimum_quantity,
            maximum_quantity: cmd.maximum_quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_adjust_stock(&self, cmd: &AdjustStock) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists(cmd.product_id)?;

        if cmd.delta.is_zero() {
            return Err(DomainError::validation("delta cannot be zero"));
        }

        let new_quantity = self
            .quantity_on_hand
            .checked_add(cmd.delta)
            .ok_or_else(DomainError::amount_out_of_range)?;
        if new_quantity < Decimal::ZERO {
            return Err(DomainError::insufficient_stock(
                self.name.clone(),
                self.quantity_on_hand,
                -cmd.delta,
            ));
        }

        Ok(vec![ProductEvent::StockAdjusted(StockAdjusted {
            product_id: cmd.product_id,
            delta: cmd.delta,
            quantity_on_hand: new_quantity,
            reason: cmd.reason,
            reference: cmd.reference.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_archive(&self, cmd: &ArchiveProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists(cmd.product_id)?;
        if !self.active {
            return Err(DomainError::invalid_transition("archived", "archive"));
        }

        Ok(vec![ProductEvent::ProductArchived(ProductArchived {
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reactivate(
        &self,
        cmd: &ReactivateProduct,
    ) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists(cmd.product_id)?;
        if self.active {
            return Err(DomainError::invalid_transition("active", "reactivate"));
        }

        Ok(vec![ProductEvent::ProductReactivated(ProductReactivated {
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
