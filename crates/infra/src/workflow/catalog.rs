use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use stockroom_events::{EventBus, EventEnvelope};
use stockroom_products::{
    ArchiveProduct, CreateProduct, Product, ProductCategory, ProductCommand, ProductId,
    ReactivateProduct, SetStockThresholds, UpdatePrices, UpdateProductDetails,
    DEFAULT_MAXIMUM_QUANTITY, DEFAULT_MINIMUM_QUANTITY,
};

use super::{PRODUCT_AGGREGATE, Workflows, product_shell};
use crate::command_dispatcher::DispatchError;
use crate::event_store::EventStore;
use crate::unique::CodeScope;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub category: ProductCategory,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
    pub quantity_on_hand: Decimal,
    pub minimum_quantity: Decimal,
    pub maximum_quantity: Decimal,
}

impl NewProduct {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            description: None,
            category: ProductCategory::default(),
            cost_price: Decimal::ZERO,
            selling_price: Decimal::ZERO,
            quantity_on_hand: Decimal::ZERO,
            minimum_quantity: DEFAULT_MINIMUM_QUANTITY,
            maximum_quantity: DEFAULT_MAXIMUM_QUANTITY,
        }
    }
}

impl<S, B> Workflows<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Register a product. Its code must be unique across the catalog.
    pub fn create_product(&self, new: NewProduct) -> Result<Product, DispatchError> {
        let product_id = ProductId::generate();
        let code = new.code.trim().to_string();
        self.codes
            .reserve(CodeScope::Product, &code, product_id.aggregate_id())?;

        let command = ProductCommand::CreateProduct(CreateProduct {
            product_id,
            code: code.clone(),
            name: new.name,
            description: new.description,
            category: new.category,
            cost_price: new.cost_price,
            selling_price: new.selling_price,
            quantity_on_hand: new.quantity_on_hand,
            minimum_quantity: new.minimum_quantity,
            maximum_quantity: new.maximum_quantity,
            occurred_at: Utc::now(),
        });

        match self.execute(product_id.aggregate_id(), PRODUCT_AGGREGATE, command, product_shell) {
            Ok(product) => {
                tracing::info!(
                    product_id = %product_id,
                    code = %product.code(),
                    stock_state = ?product.stock_state(),
                    "product created"
                );
                Ok(product)
            }
            Err(err) => {
                self.codes
                    .release(CodeScope::Product, &code, product_id.aggregate_id());
                Err(err)
            }
        }
    }

    pub fn update_product_details(
        &self,
        product_id: ProductId,
        name: impl Into<String>,
        description: Option<String>,
        category: ProductCategory,
    ) -> Result<Product, DispatchError> {
        let command = ProductCommand::UpdateProductDetails(UpdateProductDetails {
            product_id,
            name: name.into(),
            description,
            category,
            occurred_at: Utc::now(),
        });
        self.execute(product_id.aggregate_id(), PRODUCT_AGGREGATE, command, product_shell)
    }

    pub fn update_product_prices(
        &self,
        product_id: ProductId,
        cost_price: Decimal,
        selling_price: Decimal,
    ) -> Result<Product, DispatchError> {
        let command = ProductCommand::UpdatePrices(UpdatePrices {
            product_id,
            cost_price,
            selling_price,
            occurred_at: Utc::now(),
        });
        let product = self.execute(product_id.aggregate_id(), PRODUCT_AGGREGATE, command, product_shell)?;
        tracing::info!(
            product_id = %product_id,
            profit_margin = %product.profit_margin(),
            "product prices updated"
        );
        Ok(product)
    }

    pub fn set_stock_thresholds(
        &self,
        product_id: ProductId,
        minimum_quantity: Decimal,
        maximum_quantity: Decimal,
    ) -> Result<Product, DispatchError> {
        let command = ProductCommand::SetStockThresholds(SetStockThresholds {
            product_id,
            minimum_quantity,
            maximum_quantity,
            occurred_at: Utc::now(),
        });
        self.execute(product_id.aggregate_id(), PRODUCT_AGGREGATE, command, product_shell)
    }

    /// Archived products stay on existing lines but cannot be ordered again.
    pub fn archive_product(&self, product_id: ProductId) -> Result<Product, DispatchError> {
        let command = ProductCommand::ArchiveProduct(ArchiveProduct {
            product_id,
            occurred_at: Utc::now(),
        });
        let product = self.execute(product_id.aggregate_id(), PRODUCT_AGGREGATE, command, product_shell)?;
        tracing::info!(product_id = %product_id, "product archived");
        Ok(product)
    }

    pub fn reactivate_product(&self, product_id: ProductId) -> Result<Product, DispatchError> {
        let command = ProductCommand::ReactivateProduct(ReactivateProduct {
            product_id,
            occurred_at: Utc::now(),
        });
        let product = self.execute(product_id.aggregate_id(), PRODUCT_AGGREGATE, command, product_shell)?;
        tracing::info!(product_id = %product_id, "product reactivated");
        Ok(product)
    }

    pub fn product(&self, product_id: ProductId) -> Result<Product, DispatchError> {
        let product = self.load_product(product_id)?.into_inner();
        if !product.is_created() {
            return Err(DispatchError::NotFound);
        }
        Ok(product)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::tests::workflows;
    use rust_decimal_macros::dec;
    use stockroom_products::StockState;

    #[test]
    fn create_applies_catalog_defaults() {
        let (wf, _) = workflows();
        let product = wf.create_product(NewProduct::new("WID-1", "Widget")).unwrap();

        assert_eq!(product.code(), "WID-1");
        assert_eq!(product.quantity_on_hand(), Decimal::ZERO);
        assert_eq!(product.minimum_quantity(), dec!(10));
        assert_eq!(product.maximum_quantity(), dec!(1000));
        assert_eq!(product.category(), ProductCategory::Other);
        assert_eq!(product.stock_state(), StockState::OutOfStock);
        assert!(product.is_active());
    }

    #[test]
    fn product_codes_are_unique() {
        let (wf, _) = workflows();
        wf.create_product(NewProduct::new("WID-1", "Widget")).unwrap();
        let err = wf
            .create_product(NewProduct::new("WID-1", "Other widget"))
            .unwrap_err();
        assert!(matches!(err, DispatchError::ConstraintViolation(_)));
    }

    #[test]
    fn failed_create_frees_the_code() {
        let (wf, _) = workflows();
        let mut bad = NewProduct::new("WID-1", "Widget");
        bad.cost_price = dec!(-1);
        let err = wf.create_product(bad).unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));

        wf.create_product(NewProduct::new("WID-1", "Widget")).unwrap();
    }

    #[test]
    fn price_update_recomputes_margin() {
        let (wf, _) = workflows();
        let product = wf.create_product(NewProduct::new("WID-1", "Widget")).unwrap();
        let product = wf
            .update_product_prices(product.id_typed(), dec!(80), dec!(100))
            .unwrap();
        assert_eq!(product.profit_margin(), dec!(25));

        let err = wf
            .update_product_prices(product.id_typed(), dec!(80), dec!(-1))
            .unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
    }

    #[test]
    fn details_and_thresholds_are_editable() {
        let (wf, _) = workflows();
        let mut new = NewProduct::new("WID-1", "Widget");
        new.quantity_on_hand = dec!(20);
        let id = wf.create_product(new).unwrap().id_typed();

        let product = wf
            .update_product_details(id, " Blue widget ", Some("Anodised".into()), ProductCategory::Electronics)
            .unwrap();
        assert_eq!(product.name(), "Blue widget");
        assert_eq!(product.description(), Some("Anodised"));
        assert_eq!(product.category(), ProductCategory::Electronics);
        assert_eq!(product.code(), "WID-1");

        assert_eq!(product.stock_state(), StockState::Available);
        let product = wf.set_stock_thresholds(id, dec!(25), dec!(100)).unwrap();
        assert_eq!(product.stock_state(), StockState::LowStock);

        let err = wf.set_stock_thresholds(id, dec!(50), dec!(10)).unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
        let err = wf
            .update_product_details(id, "  ", None, ProductCategory::Other)
            .unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
    }

    #[test]
    fn archive_and_reactivate_round_trip() {
        let (wf, _) = workflows();
        let product = wf.create_product(NewProduct::new("WID-1", "Widget")).unwrap();
        let id = product.id_typed();

        assert!(!wf.archive_product(id).unwrap().is_active());
        let err = wf.archive_product(id).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidTransition { .. }));
        assert!(wf.reactivate_product(id).unwrap().is_active());
    }

    #[test]
    fn unknown_product_is_not_found() {
        let (wf, _) = workflows();
        let id = ProductId::generate();
        assert!(matches!(wf.product(id), Err(DispatchError::NotFound)));
        assert!(matches!(wf.archive_product(id), Err(DispatchError::NotFound)));
    }
}
