//! Application workflows over the event-sourced aggregates.
//!
//! Each public method is one user-level action. Actions that move stock
//! (`receive_purchase_order`, `confirm_sale_order`, `cancel_sale_order`,
//! `adjust_stock`) stage every affected aggregate into one
//! [`Transaction`](crate::command_dispatcher::Transaction) and commit it with a
//! single atomic append. When that append loses a race the whole action is
//! reloaded and decided again, up to `max_commit_attempts` times.

mod catalog;
mod customers;
mod purchasing;
mod sales;
mod stock;

pub use catalog::NewProduct;
pub use customers::NewCustomer;
pub use purchasing::NewPurchaseOrder;
pub use sales::NewSaleOrder;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::sync::Arc;

use stockroom_core::{Aggregate, AggregateId, DomainError};
use stockroom_customers::{Customer, CustomerId};
use stockroom_events::{EventBus, EventEnvelope};
use stockroom_invoicing::{InMemoryInvoiceGateway, InvoiceGateway};
use stockroom_lines::LineChanges;
use stockroom_products::{Product, ProductId, ProductRef};
use stockroom_purchasing::{PurchaseOrder, PurchaseOrderId};
use stockroom_sales::{SaleOrder, SaleOrderId};

use crate::audit::{AuditNote, AuditSink, TracingAuditSink};
use crate::command_dispatcher::{CommandDispatcher, DispatchError, Loaded};
use crate::config::WorkflowConfig;
use crate::event_store::EventStore;
use crate::sequence::{InMemorySequence, SequenceService};
use crate::unique::UniqueCodeIndex;

pub const PRODUCT_AGGREGATE: &str = "products.product";
pub const CUSTOMER_AGGREGATE: &str = "customers.customer";
pub const PURCHASE_ORDER_AGGREGATE: &str = "purchasing.order";
pub const SALE_ORDER_AGGREGATE: &str = "sales.order";

/// External services the workflows call out to.
#[derive(Clone)]
pub struct Collaborators {
    pub sequences: Arc<dyn SequenceService>,
    pub invoices: Arc<dyn InvoiceGateway>,
    pub audit: Arc<dyn AuditSink>,
}

impl Collaborators {
    /// In-process numbering and invoicing, audit notes to `tracing`.
    pub fn in_memory() -> Self {
        Self {
            sequences: Arc::new(InMemorySequence::new()),
            invoices: Arc::new(InMemoryInvoiceGateway::new()),
            audit: Arc::new(TracingAuditSink),
        }
    }
}

impl core::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// A product line to add to an order. Price and description default to the
/// product's own values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLine {
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub unit_price: Option<Decimal>,
    pub discount: Option<Decimal>,
    pub description: Option<String>,
}

impl NewLine {
    pub fn new(product_id: ProductId, quantity: Decimal) -> Self {
        Self {
            product_id,
            quantity,
            unit_price: None,
            discount: None,
            description: None,
        }
    }
}

/// Changes to an existing line. A new `product_id` re-prices the line before
/// the explicit overrides are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineEdit {
    pub product_id: Option<ProductId>,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub discount: Option<Decimal>,
    pub description: Option<String>,
}

#[derive(Debug)]
pub struct Workflows<S, B> {
    dispatcher: CommandDispatcher<S, B>,
    collaborators: Collaborators,
    codes: UniqueCodeIndex,
    config: WorkflowConfig,
}

impl<S, B> Workflows<S, B> {
    pub fn new(dispatcher: CommandDispatcher<S, B>, collaborators: Collaborators, config: WorkflowConfig) -> Self {
        Self {
            dispatcher,
            collaborators,
            codes: UniqueCodeIndex::new(),
            config,
        }
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<S, B> {
        &self.dispatcher
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    fn audit(&self, aggregate_type: &str, aggregate_id: AggregateId, reference: &str, message: &str) {
        self.collaborators.audit.note(AuditNote {
            aggregate_type: aggregate_type.to_string(),
            aggregate_id,
            reference: reference.to_string(),
            message: message.to_string(),
            occurred_at: Utc::now(),
        });
    }
}

impl<S, B> Workflows<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Run `attempt` until it succeeds, fails for a reason other than a lost
    /// concurrency race, or runs out of attempts.
    fn with_retry<T>(
        &self,
        action: &str,
        mut attempt: impl FnMut() -> Result<T, DispatchError>,
    ) -> Result<T, DispatchError> {
        let max_attempts = self.config.max_commit_attempts.max(1);
        let mut tries = 1;
        loop {
            match attempt() {
                Err(DispatchError::Concurrency(reason)) if tries < max_attempts => {
                    tracing::warn!(action, attempt = tries, %reason, "concurrent modification, retrying");
                    tries += 1;
                }
                outcome => return outcome,
            }
        }
    }

    /// Load, decide and commit one command against one aggregate, with retry.
    fn execute<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl Fn(AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: stockroom_events::Event + Serialize + DeserializeOwned,
    {
        self.with_retry(aggregate_type, || {
            let mut loaded = self.dispatcher.load(aggregate_id, &make_aggregate)?;
            let mut tx = self.dispatcher.begin();
            tx.stage(&mut loaded, aggregate_type, &command)?;
            self.dispatcher.commit(tx)?;
            Ok(loaded.into_inner())
        })
    }

    fn load_product(&self, product_id: ProductId) -> Result<Loaded<Product>, DispatchError> {
        self.dispatcher.load(product_id.aggregate_id(), product_shell)
    }

    fn load_customer(&self, customer_id: CustomerId) -> Result<Loaded<Customer>, DispatchError> {
        self.dispatcher.load(customer_id.aggregate_id(), customer_shell)
    }

    fn load_purchase_order(&self, order_id: PurchaseOrderId) -> Result<Loaded<PurchaseOrder>, DispatchError> {
        self.dispatcher.load(order_id.aggregate_id(), purchase_order_shell)
    }

    fn load_sale_order(&self, order_id: SaleOrderId) -> Result<Loaded<SaleOrder>, DispatchError> {
        self.dispatcher.load(order_id.aggregate_id(), sale_order_shell)
    }

    /// Snapshot of a product that may go on a new or re-pointed line.
    fn orderable_product(&self, product_id: ProductId) -> Result<ProductRef, DispatchError> {
        let product = self.load_product(product_id)?.into_inner();
        if !product.is_created() {
            return Err(DispatchError::Validation(format!("product {product_id} does not exist")));
        }
        if !product.is_active() {
            return Err(DispatchError::Validation(format!(
                "product {} is archived",
                product.code()
            )));
        }
        Ok(product.line_ref())
    }

    fn new_line_changes(&self, line: NewLine) -> Result<(ProductRef, LineChanges), DispatchError> {
        let product = self.orderable_product(line.product_id)?;
        let changes = LineChanges {
            product: None,
            quantity: Some(line.quantity),
            unit_price: line.unit_price,
            discount: line.discount,
            description: line.description,
        };
        Ok((product, changes))
    }

    fn line_edit_changes(&self, edit: LineEdit) -> Result<LineChanges, DispatchError> {
        let product = edit
            .product_id
            .map(|id| self.orderable_product(id))
            .transpose()?;
        Ok(LineChanges {
            product,
            quantity: edit.quantity,
            unit_price: edit.unit_price,
            discount: edit.discount,
            description: edit.description,
        })
    }
}

fn product_shell(id: AggregateId) -> Product {
    Product::empty(ProductId::new(id))
}

fn customer_shell(id: AggregateId) -> Customer {
    Customer::empty(CustomerId::new(id))
}

fn purchase_order_shell(id: AggregateId) -> PurchaseOrder {
    PurchaseOrder::empty(PurchaseOrderId::new(id))
}

fn sale_order_shell(id: AggregateId) -> SaleOrder {
    SaleOrder::empty(SaleOrderId::new(id))
}
