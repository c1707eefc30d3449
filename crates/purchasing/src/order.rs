use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockroom_core::{Aggregate, AggregateRoot, DomainError};
use stockroom_events::Event;
use stockroom_lines::{DocumentTotals, LineChanges, OrderLine, OrderLines, PurchaseLine, TaxRate};
use stockroom_products::{ProductId, ProductRef};

stockroom_core::aggregate_id!(
    /// Purchase order identifier.
    PurchaseOrderId
);

/// Purchase order status lifecycle.
///
/// `draft -> confirmed -> received`, or `draft | confirmed -> cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseOrderStatus {
    Draft,
    Confirmed,
    Received,
    Cancelled,
}

impl PurchaseOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseOrderStatus::Draft => "draft",
            PurchaseOrderStatus::Confirmed => "confirmed",
            PurchaseOrderStatus::Received => "received",
            PurchaseOrderStatus::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for PurchaseOrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate root: PurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOrder {
    id: PurchaseOrderId,
    reference: String,
    supplier_name: String,
    supplier_contact: Option<String>,
    order_date: Option<NaiveDate>,
    expected_date: Option<NaiveDate>,
    notes: Option<String>,
    tax_rate: TaxRate,
    status: PurchaseOrderStatus,
    lines: OrderLines<PurchaseLine>,
    totals: DocumentTotals,
    version: u64,
    created: bool,
    deleted: bool,
}

impl PurchaseOrder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PurchaseOrderId) -> Self {
        Self {
            id,
            reference: String::new(),
            supplier_name: String::new(),
            supplier_contact: None,
            order_date: None,
            expected_date: None,
            notes: None,
            tax_rate: TaxRate::default(),
            status: PurchaseOrderStatus::Draft,
            lines: OrderLines::new(),
            totals: DocumentTotals::default(),
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn id_typed(&self) -> PurchaseOrderId {
        self.id
    }

    /// Created and not deleted.
    pub fn exists(&self) -> bool {
        self.created && !self.deleted
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn supplier_name(&self) -> &str {
        &self.supplier_name
    }

    pub fn supplier_contact(&self) -> Option<&str> {
        self.supplier_contact.as_deref()
    }

    pub fn order_date(&self) -> Option<NaiveDate> {
        self.order_date
    }

    pub fn expected_date(&self) -> Option<NaiveDate> {
        self.expected_date
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn tax_rate(&self) -> TaxRate {
        self.tax_rate
    }

    pub fn status(&self) -> PurchaseOrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[PurchaseLine] {
        self.lines.as_slice()
    }

    pub fn totals(&self) -> DocumentTotals {
        self.totals
    }

    pub fn is_modifiable(&self) -> bool {
        matches!(self.status, PurchaseOrderStatus::Draft)
    }

    /// Stock increments a receipt applies, one per line.
    pub fn receipts(&self) -> Vec<(ProductId, Decimal)> {
        self.lines
            .iter()
            .map(|l| (l.product_id(), l.quantity()))
            .collect()
    }

    /// Keeps the previous totals when the new ones do not fit; `handle`
    /// rejects such edits.
    fn recompute_totals(&mut self) {
        if let Ok(totals) = self.lines.totals(self.tax_rate, Decimal::ZERO) {
            self.totals = totals;
        }
    }
}

impl AggregateRoot for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreatePurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePurchaseOrder {
    pub order_id: PurchaseOrderId,
    pub reference: String,
    pub supplier_name: String,
    pub supplier_contact: Option<String>,
    pub order_date: Option<NaiveDate>,
    pub expected_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub tax_rate: TaxRate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddLine.
///
/// The line starts from `product` (cost price, description); `changes`
/// overrides quantity, price or description. Quantity defaults to 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLine {
    pub order_id: PurchaseOrderId,
    pub product: ProductRef,
    pub changes: LineChanges,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateLine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLine {
    pub order_id: PurchaseOrderId,
    pub line_no: u32,
    pub changes: LineChanges,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveLine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveLine {
    pub order_id: PurchaseOrderId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConfirmOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmOrder {
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReceiveOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveOrder {
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOrder {
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderCommand {
    CreatePurchaseOrder(CreatePurchaseOrder),
    AddLine(AddLine),
    UpdateLine(UpdateLine),
    RemoveLine(RemoveLine),
    ConfirmOrder(ConfirmOrder),
    ReceiveOrder(ReceiveOrder),
    CancelOrder(CancelOrder),
    DeleteOrder(DeleteOrder),
}

/// Event: PurchaseOrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderCreated {
    pub order_id: PurchaseOrderId,
    pub reference: String,
    pub supplier_name: String,
    pub supplier_contact: Option<String>,
    pub order_date: Option<NaiveDate>,
    pub expected_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub tax_rate: TaxRate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineAdded (full line snapshot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAdded {
    pub order_id: PurchaseOrderId,
    pub line: PurchaseLine,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineUpdated (full line snapshot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineUpdated {
    pub order_id: PurchaseOrderId,
    pub line: PurchaseLine,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRemoved {
    pub order_id: PurchaseOrderId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderConfirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderConfirmed {
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderReceived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReceived {
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: PurchaseOrderId,
    pub previous_status: PurchaseOrderStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderDeleted. The order and its lines are gone afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDeleted {
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderEvent {
    PurchaseOrderCreated(PurchaseOrderCreated),
    LineAdded(LineAdded),
    LineUpdated(LineUpdated),
    LineRemoved(LineRemoved),
    OrderConfirmed(OrderConfirmed),
    OrderReceived(OrderReceived),
    OrderCancelled(OrderCancelled),
    OrderDeleted(OrderDeleted),
}

impl Event for PurchaseOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(_) => "purchasing.order.created",
            PurchaseOrderEvent::LineAdded(_) => "purchasing.order.line_added",
            PurchaseOrderEvent::LineUpdated(_) => "purchasing.order.line_updated",
            PurchaseOrderEvent::LineRemoved(_) => "purchasing.order.line_removed",
            PurchaseOrderEvent::OrderConfirmed(_) => "purchasing.order.confirmed",
            PurchaseOrderEvent::OrderReceived(_) => "purchasing.order.received",
            PurchaseOrderEvent::OrderCancelled(_) => "purchasing.order.cancelled",
            PurchaseOrderEvent::OrderDeleted(_) => "purchasing.order.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => e.occurred_at,
            PurchaseOrderEvent::LineAdded(e) => e.occurred_at,
            PurchaseOrderEvent::LineUpdated(e) => e.occurred_at,
            PurchaseOrderEvent::LineRemoved(e) => e.occurred_at,
            PurchaseOrderEvent::OrderConfirmed(e) => e.occurred_at,
            PurchaseOrderEvent::OrderReceived(e) => e.occurred_at,
            PurchaseOrderEvent::OrderCancelled(e) => e.occurred_at,
            PurchaseOrderEvent::OrderDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PurchaseOrder {
    type Command = PurchaseOrderCommand;
    type Event = PurchaseOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => {
                self.id = e.order_id;
                self.reference = e.reference.clone();
                self.supplier_name = e.supplier_name.clone();
                self.supplier_contact = e.supplier_contact.clone();
                self.order_date = e.order_date;
                self.expected_date = e.expected_date;
                self.notes = e.notes.clone();
                self.tax_rate = e.tax_rate;
                self.status = PurchaseOrderStatus::Draft;
                self.lines = OrderLines::new();
                self.created = true;
                self.recompute_totals();
            }
            PurchaseOrderEvent::LineAdded(e) => {
                self.lines.insert(e.line.clone());
                self.recompute_totals();
            }
            PurchaseOrderEvent::LineUpdated(e) => {
                self.lines.replace(e.line.clone());
                self.recompute_totals();
            }
            PurchaseOrderEvent::LineRemoved(e) => {
                self.lines.remove(e.line_no);
                self.recompute_totals();
            }
            PurchaseOrderEvent::OrderConfirmed(_) => {
                self.status = PurchaseOrderStatus::Confirmed;
            }
            PurchaseOrderEvent::OrderReceived(_) => {
                self.status = PurchaseOrderStatus::Received;
            }
            PurchaseOrderEvent::OrderCancelled(_) => {
                self.status = PurchaseOrderStatus::Cancelled;
            }
            PurchaseOrderEvent::OrderDeleted(_) => {
                self.lines.clear();
                self.recompute_totals();
                self.deleted = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseOrderCommand::CreatePurchaseOrder(cmd) => self.handle_create(cmd),
            PurchaseOrderCommand::AddLine(cmd) => self.handle_add_line(cmd),
            PurchaseOrderCommand::UpdateLine(cmd) => self.handle_update_line(cmd),
            PurchaseOrderCommand::RemoveLine(cmd) => self.handle_remove_line(cmd),
            PurchaseOrderCommand::ConfirmOrder(cmd) => self.handle_confirm(cmd),
            PurchaseOrderCommand::ReceiveOrder(cmd) => self.handle_receive(cmd),
            PurchaseOrderCommand::CancelOrder(cmd) => self.handle_cancel(cmd),
            PurchaseOrderCommand::DeleteOrder(cmd) => self.handle_delete(cmd),
        }
    }
}

impl PurchaseOrder {
    fn ensure_exists(&self, order_id: PurchaseOrderId) -> Result<(), DomainError> {
        if !self.exists() {
            return Err(DomainError::not_found());
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_status(
        &self,
        allowed: &[PurchaseOrderStatus],
        action: &str,
    ) -> Result<(), DomainError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(DomainError::invalid_transition(self.status, action))
        }
    }

    fn handle_create(
        &self,
        cmd: &CreatePurchaseOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("purchase order already exists"));
        }
        if cmd.reference.trim().is_empty() {
            return Err(DomainError::validation("reference cannot be empty"));
        }
        if cmd.supplier_name.trim().is_empty() {
            return Err(DomainError::validation("supplier name cannot be empty"));
        }

        Ok(vec![PurchaseOrderEvent::PurchaseOrderCreated(PurchaseOrderCreated {
            order_id: cmd.order_id,
            reference: cmd.reference.clone(),
            supplier_name: cmd.supplier_name.trim().to_string(),
            supplier_contact: cmd.supplier_contact.clone(),
            order_date: cmd.order_date,
            expected_date: cmd.expected_date,
            notes: cmd.notes.clone(),
            tax_rate: cmd.tax_rate,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_line(&self, cmd: &AddLine) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.ensure_status(&[PurchaseOrderStatus::Draft], "add lines")?;

        let line = self.lines.draft_add(&cmd.product, &cmd.changes)?;
        self.lines.totals_with(&line, self.tax_rate, Decimal::ZERO)?;

        Ok(vec![PurchaseOrderEvent::LineAdded(LineAdded {
            order_id: cmd.order_id,
            line,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_line(&self, cmd: &UpdateLine) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.ensure_status(&[PurchaseOrderStatus::Draft], "edit lines")?;

        let line = self.lines.draft_update(cmd.line_no, &cmd.changes)?;
        self.lines.totals_with(&line, self.tax_rate, Decimal::ZERO)?;

        Ok(vec![PurchaseOrderEvent::LineUpdated(LineUpdated {
            order_id: cmd.order_id,
            line,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_line(&self, cmd: &RemoveLine) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.ensure_status(&[PurchaseOrderStatus::Draft], "remove lines")?;
        self.lines.ensure_exists(cmd.line_no)?;

        Ok(vec![PurchaseOrderEvent::LineRemoved(LineRemoved {
            order_id: cmd.order_id,
            line_no: cmd.line_no,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_confirm(&self, cmd: &ConfirmOrder) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.ensure_status(&[PurchaseOrderStatus::Draft], "confirm")?;

        Ok(vec![PurchaseOrderEvent::OrderConfirmed(OrderConfirmed {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_receive(&self, cmd: &ReceiveOrder) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.ensure_status(&[PurchaseOrderStatus::Confirmed], "receive")?;

        Ok(vec![PurchaseOrderEvent::OrderReceived(OrderReceived {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.ensure_status(
            &[PurchaseOrderStatus::Draft, PurchaseOrderStatus::Confirmed],
            "cancel",
        )?;

        Ok(vec![PurchaseOrderEvent::OrderCancelled(OrderCancelled {
            order_id: cmd.order_id,
            previous_status: self.status,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteOrder) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.ensure_status(
            &[PurchaseOrderStatus::Draft, PurchaseOrderStatus::Cancelled],
            "delete",
        )?;

        Ok(vec![PurchaseOrderEvent::OrderDeleted(OrderDeleted {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn product(cost: Decimal) -> ProductRef {
        ProductRef {
            product_id: ProductId::generate(),
            code: "BOLT".to_string(),
            name: "Bolt".to_string(),
            description: Some("M8 bolt".to_string()),
            cost_price: cost,
            selling_price: cost * dec!(2),
        }
    }

    fn run(order: &mut PurchaseOrder, cmd: PurchaseOrderCommand) -> Result<(), DomainError> {
        let events = order.handle(&cmd)?;
        for e in &events {
            order.apply(e);
        }
        Ok(())
    }

    fn draft_order() -> PurchaseOrder {
        let order_id = PurchaseOrderId::generate();
        let mut order = PurchaseOrder::empty(order_id);
        run(
            &mut order,
            PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
                order_id,
                reference: "PO00001".to_string(),
                supplier_name: "Northwind Supply".to_string(),
                supplier_contact: None,
                order_date: None,
                expected_date: None,
                notes: None,
                tax_rate: TaxRate::default(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        order
    }

    fn add_line(order: &mut PurchaseOrder, product: &ProductRef, quantity: Decimal) {
        let order_id = order.id_typed();
        run(
            order,
            PurchaseOrderCommand::AddLine(AddLine {
                order_id,
                product: product.clone(),
                changes: LineChanges::quantity(quantity),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
    }

    fn transition(order: &mut PurchaseOrder, action: &str) -> Result<(), DomainError> {
        let order_id = order.id_typed();
        let occurred_at = test_time();
        let cmd = match action {
            "confirm" => PurchaseOrderCommand::ConfirmOrder(ConfirmOrder { order_id, occurred_at }),
            "receive" => PurchaseOrderCommand::ReceiveOrder(ReceiveOrder { order_id, occurred_at }),
            "cancel" => PurchaseOrderCommand::CancelOrder(CancelOrder { order_id, occurred_at }),
            "delete" => PurchaseOrderCommand::DeleteOrder(DeleteOrder { order_id, occurred_at }),
            other => panic!("unknown action {other}"),
        };
        run(order, cmd)
    }

    #[test]
    fn create_requires_supplier() {
        let order_id = PurchaseOrderId::generate();
        let order = PurchaseOrder::empty(order_id);
        let err = order
            .handle(&PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
                order_id,
                reference: "PO00001".to_string(),
                supplier_name: " ".to_string(),
                supplier_contact: None,
                order_date: None,
                expected_date: None,
                notes: None,
                tax_rate: TaxRate::default(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn lines_drive_totals() {
        let mut order = draft_order();
        add_line(&mut order, &product(dec!(10)), dec!(3));
        add_line(&mut order, &product(dec!(2.5)), dec!(4));

        let totals = order.totals();
        assert_eq!(totals.subtotal, dec!(40));
        assert_eq!(totals.tax_amount, dec!(6));
        assert_eq!(totals.total_amount, dec!(46));
        assert_eq!(order.lines()[0].unit_price(), dec!(10));
    }

    #[test]
    fn editing_and_removing_lines_recomputes_totals() {
        let mut order = draft_order();
        add_line(&mut order, &product(dec!(10)), dec!(3));
        add_line(&mut order, &product(dec!(5)), dec!(1));

        let order_id = order.id_typed();
        run(
            &mut order,
            PurchaseOrderCommand::UpdateLine(UpdateLine {
                order_id,
                line_no: 1,
                changes: LineChanges::quantity(dec!(1)),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(order.totals().subtotal, dec!(15));

        let order_id = order.id_typed();
        run(
            &mut order,
            PurchaseOrderCommand::RemoveLine(RemoveLine {
                order_id,
                line_no: 2,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(order.totals().subtotal, dec!(10));
        assert_eq!(order.totals().total_amount, dec!(11.5));
    }

    #[test]
    fn full_lifecycle_draft_to_received() {
        let mut order = draft_order();
        let p = product(dec!(4));
        add_line(&mut order, &p, dec!(6));

        transition(&mut order, "confirm").unwrap();
        assert_eq!(order.status(), PurchaseOrderStatus::Confirmed);

        transition(&mut order, "receive").unwrap();
        assert_eq!(order.status(), PurchaseOrderStatus::Received);
        assert_eq!(order.receipts(), vec![(p.product_id, dec!(6))]);
    }

    #[test]
    fn receive_twice_is_rejected() {
        let mut order = draft_order();
        add_line(&mut order, &product(dec!(4)), dec!(6));
        transition(&mut order, "confirm").unwrap();
        transition(&mut order, "receive").unwrap();

        let err = transition(&mut order, "receive").unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidTransition {
                from: "received".to_string(),
                action: "receive".to_string(),
            }
        );
    }

    #[test]
    fn receive_requires_confirmation() {
        let mut order = draft_order();
        let err = transition(&mut order, "receive").unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
    }

    #[test]
    fn cannot_cancel_received_order() {
        let mut order = draft_order();
        transition(&mut order, "confirm").unwrap();
        transition(&mut order, "receive").unwrap();
        assert!(matches!(
            transition(&mut order, "cancel"),
            Err(DomainError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn lines_are_frozen_after_confirmation() {
        let mut order = draft_order();
        add_line(&mut order, &product(dec!(1)), dec!(1));
        transition(&mut order, "confirm").unwrap();

        let err = order
            .handle(&PurchaseOrderCommand::AddLine(AddLine {
                order_id: order.id_typed(),
                product: product(dec!(1)),
                changes: LineChanges::default(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
    }

    #[test]
    fn delete_cascades_and_hides_the_order() {
        let mut order = draft_order();
        add_line(&mut order, &product(dec!(1)), dec!(1));
        transition(&mut order, "delete").unwrap();

        assert!(!order.exists());
        assert!(order.lines().is_empty());
        assert_eq!(transition(&mut order, "confirm"), Err(DomainError::NotFound));
    }

    #[test]
    fn confirmed_order_cannot_be_deleted() {
        let mut order = draft_order();
        transition(&mut order, "confirm").unwrap();
        assert!(matches!(
            transition(&mut order, "delete"),
            Err(DomainError::InvalidTransition { .. })
        ));
        transition(&mut order, "cancel").unwrap();
        transition(&mut order, "delete").unwrap();
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Edit {
            Add { cost_cents: i64, quantity: i64 },
            Update { line_no: u32, quantity: i64 },
            Remove { line_no: u32 },
        }

        fn edit_strategy() -> impl Strategy<Value = Edit> {
            prop_oneof![
                (0i64..100_000, -2i64..50)
                    .prop_map(|(cost_cents, quantity)| Edit::Add { cost_cents, quantity }),
                (1u32..8, -2i64..50).prop_map(|(line_no, quantity)| Edit::Update { line_no, quantity }),
                (1u32..8).prop_map(|line_no| Edit::Remove { line_no }),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 128,
                ..ProptestConfig::default()
            })]

            /// Property: after any sequence of line edits (accepted or rejected) the
            /// stored totals equal a fresh computation over the current lines.
            #[test]
            fn totals_track_lines(edits in prop::collection::vec(edit_strategy(), 1..25)) {
                let mut order = draft_order();
                for edit in edits {
                    let order_id = order.id_typed();
                    let occurred_at = test_time();
                    let cmd = match edit {
                        Edit::Add { cost_cents, quantity } => PurchaseOrderCommand::AddLine(AddLine {
                            order_id,
                            product: product(Decimal::new(cost_cents, 2)),
                            changes: LineChanges::quantity(Decimal::from(quantity)),
                            occurred_at,
                        }),
                        Edit::Update { line_no, quantity } => PurchaseOrderCommand::UpdateLine(UpdateLine {
                            order_id,
                            line_no,
                            changes: LineChanges::quantity(Decimal::from(quantity)),
                            occurred_at,
                        }),
                        Edit::Remove { line_no } => PurchaseOrderCommand::RemoveLine(RemoveLine {
                            order_id,
                            line_no,
                            occurred_at,
                        }),
                    };
                    let _ = run(&mut order, cmd);

                    let expected = DocumentTotals::compute(
                        order.lines().iter().map(|l| l.subtotal()),
                        order.tax_rate(),
                        Decimal::ZERO,
                    );
                    prop_assert_eq!(Ok(order.totals()), expected);
                    prop_assert!(order.lines().iter().all(|l| l.quantity() > Decimal::ZERO));
                }
            }
        }
    }
}
