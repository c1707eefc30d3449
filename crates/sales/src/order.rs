use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockroom_core::{Aggregate, AggregateRoot, DomainError};
use stockroom_customers::CustomerId;
use stockroom_events::Event;
use stockroom_invoicing::{InvoiceId, InvoiceRequest};
use stockroom_lines::{DocumentTotals, LineChanges, OrderLine, OrderLines, SaleLine, TaxRate};
use stockroom_products::{ProductId, ProductRef};

stockroom_core::aggregate_id!(
    /// Sale order identifier.
    SaleOrderId
);

/// Sale order status lifecycle.
///
/// `draft -> confirmed -> delivered`, or `draft | confirmed -> cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaleOrderStatus {
    Draft,
    Confirmed,
    Delivered,
    Cancelled,
}

impl SaleOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleOrderStatus::Draft => "draft",
            SaleOrderStatus::Confirmed => "confirmed",
            SaleOrderStatus::Delivered => "delivered",
            SaleOrderStatus::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for SaleOrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stock on hand for one product, as read just before confirming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity_on_hand: Decimal,
}

/// Aggregate root: SaleOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleOrder {
    id: SaleOrderId,
    reference: String,
    customer_id: Option<CustomerId>,
    order_date: Option<NaiveDate>,
    discount_amount: Decimal,
    notes: Option<String>,
    tax_rate: TaxRate,
    status: SaleOrderStatus,
    lines: OrderLines<SaleLine>,
    totals: DocumentTotals,
    invoice_id: Option<InvoiceId>,
    version: u64,
    created: bool,
    deleted: bool,
}

impl SaleOrder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: SaleOrderId) -> Self {
        Self {
            id,
            reference: String::new(),
            customer_id: None,
            order_date: None,
            discount_amount: Decimal::ZERO,
            notes: None,
            tax_rate: TaxRate::default(),
            status: SaleOrderStatus::Draft,
            lines: OrderLines::new(),
            totals: DocumentTotals::default(),
            invoice_id: None,
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn id_typed(&self) -> SaleOrderId {
        self.id
    }

    /// Created and not deleted.
    pub fn exists(&self) -> bool {
        self.created && !self.deleted
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    pub fn order_date(&self) -> Option<NaiveDate> {
        self.order_date
    }

    pub fn discount_amount(&self) -> Decimal {
        self.discount_amount
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn tax_rate(&self) -> TaxRate {
        self.tax_rate
    }

    pub fn status(&self) -> SaleOrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[SaleLine] {
        self.lines.as_slice()
    }

    pub fn totals(&self) -> DocumentTotals {
        self.totals
    }

    pub fn invoice_id(&self) -> Option<InvoiceId> {
        self.invoice_id
    }

    pub fn is_modifiable(&self) -> bool {
        matches!(self.status, SaleOrderStatus::Draft)
    }

    pub fn is_invoice_allowed(&self) -> bool {
        matches!(
            self.status,
            SaleOrderStatus::Confirmed | SaleOrderStatus::Delivered
        )
    }

    /// Quantity per product that confirming takes out of stock (and cancelling
    /// a confirmed order puts back).
    pub fn stock_demand(&self) -> Result<BTreeMap<ProductId, Decimal>, DomainError> {
        self.lines.demand_by_product()
    }

    /// Invoice summary for this order, issued and due on `issue_date`.
    pub fn invoice_request(&self, issue_date: NaiveDate) -> Result<InvoiceRequest, DomainError> {
        let customer_id = self
            .customer_id
            .ok_or_else(|| DomainError::invariant("sale order has no customer"))?;
        Ok(InvoiceRequest {
            customer_id,
            sale_order_id: self.id.aggregate_id(),
            order_reference: self.reference.clone(),
            issue_date,
            due_date: issue_date,
            subtotal: self.totals.subtotal,
            tax_amount: self.totals.tax_amount,
            total_amount: self.totals.total_amount,
            balance_due: self.totals.total_amount,
        })
    }

    /// Keeps the previous totals when the new ones do not fit; `handle`
    /// rejects such edits.
    fn recompute_totals(&mut self) {
        if let Ok(totals) = self.lines.totals(self.tax_rate, self.discount_amount) {
            self.totals = totals;
        }
    }
}

impl AggregateRoot for SaleOrder {
    type Id = SaleOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateSaleOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSaleOrder {
    pub order_id: SaleOrderId,
    pub reference: String,
    pub customer_id: CustomerId,
    pub order_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub tax_rate: TaxRate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddLine.
///
/// The line starts from `product` (selling price, description); `changes`
/// overrides quantity, price, discount or description. Quantity defaults to 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLine {
    pub order_id: SaleOrderId,
    pub product: ProductRef,
    pub changes: LineChanges,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateLine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLine {
    pub order_id: SaleOrderId,
    pub line_no: u32,
    pub changes: LineChanges,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveLine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveLine {
    pub order_id: SaleOrderId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetDiscount (document-level amount, not a percentage).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetDiscount {
    pub order_id: SaleOrderId,
    pub discount_amount: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConfirmOrder.
///
/// `stock` must hold a level for every product on the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmOrder {
    pub order_id: SaleOrderId,
    pub stock: Vec<StockLevel>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordInvoice.
///
/// Recording the invoice that is already linked emits nothing; any other
/// invoice is a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordInvoice {
    pub order_id: SaleOrderId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeliverOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverOrder {
    pub order_id: SaleOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: SaleOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOrder {
    pub order_id: SaleOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleOrderCommand {
    CreateSaleOrder(CreateSaleOrder),
    AddLine(AddLine),
    UpdateLine(UpdateLine),
    RemoveLine(RemoveLine),
    SetDiscount(SetDiscount),
    ConfirmOrder(ConfirmOrder),
    RecordInvoice(RecordInvoice),
    DeliverOrder(DeliverOrder),
    CancelOrder(CancelOrder),
    DeleteOrder(DeleteOrder),
}

/// Event: SaleOrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleOrderCreated {
    pub order_id: SaleOrderId,
    pub reference: String,
    pub customer_id: CustomerId,
    pub order_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub tax_rate: TaxRate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineAdded (full line snapshot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAdded {
    pub order_id: SaleOrderId,
    pub line: SaleLine,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineUpdated (full line snapshot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineUpdated {
    pub order_id: SaleOrderId,
    pub line: SaleLine,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRemoved {
    pub order_id: SaleOrderId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DiscountSet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountSet {
    pub order_id: SaleOrderId,
    pub discount_amount: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderConfirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderConfirmed {
    pub order_id: SaleOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceLinked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLinked {
    pub order_id: SaleOrderId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderDelivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDelivered {
    pub order_id: SaleOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderCancelled.
///
/// `previous_status == Confirmed` means stock was restored alongside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: SaleOrderId,
    pub previous_status: SaleOrderStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderDeleted. The order and its lines are gone afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDeleted {
    pub order_id: SaleOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleOrderEvent {
    SaleOrderCreated(SaleOrderCreated),
    LineAdded(LineAdded),
    LineUpdated(LineUpdated),
    LineRemoved(LineRemoved),
    DiscountSet(DiscountSet),
    OrderConfirmed(OrderConfirmed),
    InvoiceLinked(InvoiceLinked),
    OrderDelivered(OrderDelivered),
    OrderCancelled(OrderCancelled),
    OrderDeleted(OrderDeleted),
}

impl Event for SaleOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SaleOrderEvent::SaleOrderCreated(_) => "sales.order.created",
            SaleOrderEvent::LineAdded(_) => "sales.order.line_added",
            SaleOrderEvent::LineUpdated(_) => "sales.order.line_updated",
            SaleOrderEvent::LineRemoved(_) => "sales.order.line_removed",
            SaleOrderEvent::DiscountSet(_) => "sales.order.discount_set",
            SaleOrderEvent::OrderConfirmed(_) => "sales.order.confirmed",
            SaleOrderEvent::InvoiceLinked(_) => "sales.order.invoice_linked",
            SaleOrderEvent::OrderDelivered(_) => "sales.order.delivered",
            SaleOrderEvent::OrderCancelled(_) => "sales.order.cancelled",
            SaleOrderEvent::OrderDeleted(_) => "sales.order.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SaleOrderEvent::SaleOrderCreated(e) => e.occurred_at,
            SaleOrderEvent::LineAdded(e) => e.occurred_at,
            SaleOrderEvent::LineUpdated(e) => e.occurred_at,
            SaleOrderEvent::LineRemoved(e) => e.occurred_at,
            SaleOrderEvent::DiscountSet(e) => e.occurred_at,
            SaleOrderEvent::OrderConfirmed(e) => e.occurred_at,
            SaleOrderEvent::InvoiceLinked(e) => e.occurred_at,
            SaleOrderEvent::OrderDelivered(e) => e.occurred_at,
            SaleOrderEvent::OrderCancelled(e) => e.occurred_at,
            SaleOrderEvent::OrderDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for SaleOrder {
    type Command = SaleOrderCommand;
    type Event = SaleOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SaleOrderEvent::SaleOrderCreated(e) => {
                self.id = e.order_id;
                self.reference = e.reference.clone();
                self.customer_id = Some(e.customer_id);
                self.order_date = e.order_date;
                self.notes = e.notes.clone();
                self.tax_rate = e.tax_rate;
                self.discount_amount = Decimal::ZERO;
                self.status = SaleOrderStatus::Draft;
                self.lines = OrderLines::new();
                self.invoice_id = None;
                self.created = true;
                self.recompute_totals();
            }
            SaleOrderEvent::LineAdded(e) => {
                self.lines.insert(e.line.clone());
                self.recompute_totals();
            }
            SaleOrderEvent::LineUpdated(e) => {
                self.lines.replace(e.line.clone());
                self.recompute_totals();
            }
            SaleOrderEvent::LineRemoved(e) => {
                self.lines.remove(e.line_no);
                self.recompute_totals();
            }
            SaleOrderEvent::DiscountSet(e) => {
                self.discount_amount = e.discount_amount;
                self.recompute_totals();
            }
            SaleOrderEvent::OrderConfirmed(_) => {
                self.status = SaleOrderStatus::Confirmed;
            }
            SaleOrderEvent::InvoiceLinked(e) => {
                self.invoice_id = Some(e.invoice_id);
            }
            SaleOrderEvent::OrderDelivered(_) => {
                self.status = SaleOrderStatus::Delivered;
            }
            SaleOrderEvent::OrderCancelled(_) => {
                self.status = SaleOrderStatus::Cancelled;
            }
            SaleOrderEvent::OrderDeleted(_) => {
                self.lines.clear();
                self.recompute_totals();
                self.deleted = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SaleOrderCommand::CreateSaleOrder(cmd) => self.handle_create(cmd),
            SaleOrderCommand::AddLine(cmd) => self.handle_add_line(cmd),
            SaleOrderCommand::UpdateLine(cmd) => self.handle_update_line(cmd),
            SaleOrderCommand::RemoveLine(cmd) => self.handle_remove_line(cmd),
            SaleOrderCommand::SetDiscount(cmd) => self.handle_set_discount(cmd),
            SaleOrderCommand::ConfirmOrder(cmd) => self.handle_confirm(cmd),
            SaleOrderCommand::RecordInvoice(cmd) => self.handle_record_invoice(cmd),
            SaleOrderCommand::DeliverOrder(cmd) => self.handle_deliver(cmd),
            SaleOrderCommand::CancelOrder(cmd) => self.handle_cancel(cmd),
            SaleOrderCommand::DeleteOrder(cmd) => self.handle_delete(cmd),
        }
    }
}

impl SaleOrder {
    fn ensure_exists(&self, order_id: SaleOrderId) -> Result<(), DomainError> {
        if !self.exists() {
            return Err(DomainError::not_found());
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_status(&self, allowed: &[SaleOrderStatus], action: &str) -> Result<(), DomainError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(DomainError::invalid_transition(self.status, action))
        }
    }

    fn handle_create(&self, cmd: &CreateSaleOrder) -> Result<Vec<SaleOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("sale order already exists"));
        }
        if cmd.reference.trim().is_empty() {
            return Err(DomainError::validation("reference cannot be empty"));
        }

        Ok(vec![SaleOrderEvent::SaleOrderCreated(SaleOrderCreated {
            order_id: cmd.order_id,
            reference: cmd.reference.clone(),
            customer_id: cmd.customer_id,
            order_date: cmd.order_date,
            notes: cmd.notes.clone(),
            tax_rate: cmd.tax_rate,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_line(&self, cmd: &AddLine) -> Result<Vec<SaleOrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.ensure_status(&[SaleOrderStatus::Draft], "add lines")?;

        let line = self.lines.draft_add(&cmd.product, &cmd.changes)?;
        self.lines.totals_with(&line, self.tax_rate, self.discount_amount)?;

        Ok(vec![SaleOrderEvent::LineAdded(LineAdded {
            order_id: cmd.order_id,
            line,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_line(&self, cmd: &UpdateLine) -> Result<Vec<SaleOrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.ensure_status(&[SaleOrderStatus::Draft], "edit lines")?;

        let line = self.lines.draft_update(cmd.line_no, &cmd.changes)?;
        self.lines.totals_with(&line, self.tax_rate, self.discount_amount)?;

        Ok(vec![SaleOrderEvent::LineUpdated(LineUpdated {
            order_id: cmd.order_id,
            line,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_line(&self, cmd: &RemoveLine) -> Result<Vec<SaleOrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.ensure_status(&[SaleOrderStatus::Draft], "remove lines")?;
        self.lines.ensure_exists(cmd.line_no)?;

        Ok(vec![SaleOrderEvent::LineRemoved(LineRemoved {
            order_id: cmd.order_id,
            line_no: cmd.line_no,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_discount(&self, cmd: &SetDiscount) -> Result<Vec<SaleOrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.ensure_status(&[SaleOrderStatus::Draft], "change the discount")?;
        if cmd.discount_amount < Decimal::ZERO {
            return Err(DomainError::validation("discount amount cannot be negative"));
        }
        self.lines.totals(self.tax_rate, cmd.discount_amount)?;

        Ok(vec![SaleOrderEvent::DiscountSet(DiscountSet {
            order_id: cmd.order_id,
            discount_amount: cmd.discount_amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    /// All lines are checked before anything is emitted; the first product
    /// (in line order) whose summed demand exceeds its stock fails the command.
    fn handle_confirm(&self, cmd: &ConfirmOrder) -> Result<Vec<SaleOrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.ensure_status(&[SaleOrderStatus::Draft], "confirm")?;

        let demand = self.stock_demand()?;
        for line in self.lines.iter() {
            let product_id = line.product_id();
            let level = cmd
                .stock
                .iter()
                .find(|s| s.product_id == product_id)
                .ok_or_else(|| {
                    DomainError::invariant(format!("no stock level supplied for product {product_id}"))
                })?;
            let requested = demand.get(&product_id).copied().unwrap_or(Decimal::ZERO);
            if level.quantity_on_hand < requested {
                return Err(DomainError::insufficient_stock(
                    level.product_name.clone(),
                    level.quantity_on_hand,
                    requested,
                ));
            }
        }

        Ok(vec![SaleOrderEvent::OrderConfirmed(OrderConfirmed {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_invoice(
        &self,
        cmd: &RecordInvoice,
    ) -> Result<Vec<SaleOrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        if !self.is_invoice_allowed() {
            return Err(DomainError::invalid_transition(self.status, "invoice"));
        }
        match self.invoice_id {
            Some(linked) if linked == cmd.invoice_id => return Ok(Vec::new()),
            Some(_) => return Err(DomainError::conflict("sale order already has an invoice")),
            None => {}
        }

        Ok(vec![SaleOrderEvent::InvoiceLinked(InvoiceLinked {
            order_id: cmd.order_id,
            invoice_id: cmd.invoice_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deliver(&self, cmd: &DeliverOrder) -> Result<Vec<SaleOrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.ensure_status(&[SaleOrderStatus::Confirmed], "deliver")?;

        Ok(vec![SaleOrderEvent::OrderDelivered(OrderDelivered {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<SaleOrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.ensure_status(&[SaleOrderStatus::Draft, SaleOrderStatus::Confirmed], "cancel")?;

        Ok(vec![SaleOrderEvent::OrderCancelled(OrderCancelled {
            order_id: cmd.order_id,
            previous_status: self.status,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteOrder) -> Result<Vec<SaleOrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.ensure_status(&[SaleOrderStatus::Draft, SaleOrderStatus::Cancelled], "delete")?;

        Ok(vec![SaleOrderEvent::OrderDeleted(OrderDeleted {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
