//! Stock movements. Every change to `quantity_on_hand` goes through an
//! `AdjustStock` command, whether it is a manual correction or part of an
//! order workflow.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use stockroom_events::{EventBus, EventEnvelope};
use stockroom_products::{AdjustStock, Product, ProductCommand, ProductId, StockMovementReason};

use super::{PRODUCT_AGGREGATE, Workflows, product_shell};
use crate::command_dispatcher::{DispatchError, Loaded, Transaction};
use crate::event_store::EventStore;

impl<S, B> Workflows<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Move stock of one product by `delta`. Stock can never go below zero.
    pub fn adjust_stock(
        &self,
        product_id: ProductId,
        delta: Decimal,
        reason: StockMovementReason,
        reference: Option<String>,
    ) -> Result<Product, DispatchError> {
        let command = ProductCommand::AdjustStock(AdjustStock {
            product_id,
            delta,
            reason,
            reference,
            occurred_at: Utc::now(),
        });
        let product = self.execute(product_id.aggregate_id(), PRODUCT_AGGREGATE, command, product_shell)?;
        tracing::info!(
            product_id = %product_id,
            %delta,
            quantity_on_hand = %product.quantity_on_hand(),
            stock_state = ?product.stock_state(),
            "stock adjusted"
        );
        Ok(product)
    }

    pub(super) fn load_products(
        &self,
        product_ids: impl IntoIterator<Item = ProductId>,
    ) -> Result<BTreeMap<ProductId, Loaded<Product>>, DispatchError> {
        let mut products = BTreeMap::new();
        for product_id in product_ids {
            if !products.contains_key(&product_id) {
                products.insert(product_id, self.load_product(product_id)?);
            }
        }
        Ok(products)
    }
}

/// Stage one `AdjustStock` per movement. Movements for the same product
/// accumulate on its loaded state.
pub(super) fn stage_adjustments(
    tx: &mut Transaction,
    products: &mut BTreeMap<ProductId, Loaded<Product>>,
    movements: &[(ProductId, Decimal)],
    reason: StockMovementReason,
    reference: &str,
    occurred_at: DateTime<Utc>,
) -> Result<(), DispatchError> {
    for (product_id, delta) in movements {
        let product = products.get_mut(product_id).ok_or_else(|| {
            DispatchError::InvariantViolation(format!("product {product_id} was not loaded"))
        })?;
        let command = ProductCommand::AdjustStock(AdjustStock {
            product_id: *product_id,
            delta: *delta,
            reason,
            reference: Some(reference.to_string()),
            occurred_at,
        });
        tx.stage(product, PRODUCT_AGGREGATE, &command)?;
    }
    Ok(())
}
