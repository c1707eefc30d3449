use chrono::{NaiveDate, Utc};
use serde_json::Value as JsonValue;

use stockroom_events::{EventBus, EventEnvelope};
use stockroom_products::StockMovementReason;
use stockroom_purchasing::{
    AddLine, CancelOrder, ConfirmOrder, CreatePurchaseOrder, DeleteOrder, PurchaseOrder,
    PurchaseOrderCommand, PurchaseOrderId, ReceiveOrder, RemoveLine, UpdateLine,
};

use super::stock::stage_adjustments;
use super::{LineEdit, NewLine, PURCHASE_ORDER_AGGREGATE, Workflows, purchase_order_shell};
use crate::command_dispatcher::DispatchError;
use crate::event_store::EventStore;
use crate::sequence::{DocumentType, reference_or_fallback};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewPurchaseOrder {
    /// Taken from the numbering service when absent.
    pub reference: Option<String>,
    pub supplier_name: String,
    pub supplier_contact: Option<String>,
    /// Defaults to today.
    pub order_date: Option<NaiveDate>,
    pub expected_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl NewPurchaseOrder {
    pub fn new(supplier_name: impl Into<String>) -> Self {
        Self {
            supplier_name: supplier_name.into(),
            ..Self::default()
        }
    }
}

impl<S, B> Workflows<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn create_purchase_order(&self, new: NewPurchaseOrder) -> Result<PurchaseOrder, DispatchError> {
        let order_id = PurchaseOrderId::generate();
        let reference = match new.reference.filter(|r| !r.trim().is_empty()) {
            Some(reference) => reference,
            None => reference_or_fallback(self.collaborators.sequences.as_ref(), DocumentType::PurchaseOrder),
        };
        let now = Utc::now();

        let command = PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
            order_id,
            reference,
            supplier_name: new.supplier_name,
            supplier_contact: new.supplier_contact,
            order_date: Some(new.order_date.unwrap_or_else(|| now.date_naive())),
            expected_date: new.expected_date,
            notes: new.notes,
            tax_rate: self.config.tax_rate,
            occurred_at: now,
        });
        let order = self.execute(order_id.aggregate_id(), PURCHASE_ORDER_AGGREGATE, command, purchase_order_shell)?;
        tracing::info!(order_id = %order_id, reference = %order.reference(), "purchase order created");
        Ok(order)
    }

    pub fn add_purchase_line(&self, order_id: PurchaseOrderId, line: NewLine) -> Result<PurchaseOrder, DispatchError> {
        let (product, changes) = self.new_line_changes(line)?;
        let command = PurchaseOrderCommand::AddLine(AddLine {
            order_id,
            product,
            changes,
            occurred_at: Utc::now(),
        });
        self.execute(order_id.aggregate_id(), PURCHASE_ORDER_AGGREGATE, command, purchase_order_shell)
    }

    pub fn update_purchase_line(
        &self,
        order_id: PurchaseOrderId,
        line_no: u32,
        edit: LineEdit,
    ) -> Result<PurchaseOrder, DispatchError> {
        let changes = self.line_edit_changes(edit)?;
        let command = PurchaseOrderCommand::UpdateLine(UpdateLine {
            order_id,
            line_no,
            changes,
            occurred_at: Utc::now(),
        });
        self.execute(order_id.aggregate_id(), PURCHASE_ORDER_AGGREGATE, command, purchase_order_shell)
    }

    pub fn remove_purchase_line(&self, order_id: PurchaseOrderId, line_no: u32) -> Result<PurchaseOrder, DispatchError> {
        let command = PurchaseOrderCommand::RemoveLine(RemoveLine {
            order_id,
            line_no,
            occurred_at: Utc::now(),
        });
        self.execute(order_id.aggregate_id(), PURCHASE_ORDER_AGGREGATE, command, purchase_order_shell)
    }

    pub fn confirm_purchase_order(&self, order_id: PurchaseOrderId) -> Result<PurchaseOrder, DispatchError> {
        let command = PurchaseOrderCommand::ConfirmOrder(ConfirmOrder {
            order_id,
            occurred_at: Utc::now(),
        });
        let order = self.execute(order_id.aggregate_id(), PURCHASE_ORDER_AGGREGATE, command, purchase_order_shell)?;
        tracing::info!(order_id = %order_id, reference = %order.reference(), "purchase order confirmed");
        self.audit(
            PURCHASE_ORDER_AGGREGATE,
            order_id.aggregate_id(),
            order.reference(),
            "Purchase order confirmed.",
        );
        Ok(order)
    }

    /// Mark a confirmed order received and book every line into stock, in one
    /// atomic commit.
    pub fn receive_purchase_order(&self, order_id: PurchaseOrderId) -> Result<PurchaseOrder, DispatchError> {
        let order = self.with_retry("receive purchase order", || {
            let now = Utc::now();
            let mut order = self.load_purchase_order(order_id)?;
            let mut tx = self.dispatcher.begin();
            tx.stage(
                &mut order,
                PURCHASE_ORDER_AGGREGATE,
                &PurchaseOrderCommand::ReceiveOrder(ReceiveOrder {
                    order_id,
                    occurred_at: now,
                }),
            )?;

            let receipts = order.aggregate().receipts();
            let mut products = self.load_products(receipts.iter().map(|(id, _)| *id))?;
            stage_adjustments(
                &mut tx,
                &mut products,
                &receipts,
                StockMovementReason::PurchaseReceipt,
                order.aggregate().reference(),
                now,
            )?;

            self.dispatcher.commit(tx)?;
            Ok(order.into_inner())
        })?;

        tracing::info!(
            order_id = %order_id,
            reference = %order.reference(),
            lines = order.lines().len(),
            "purchase order received"
        );
        self.audit(
            PURCHASE_ORDER_AGGREGATE,
            order_id.aggregate_id(),
            order.reference(),
            "Purchase order received. Stock updated.",
        );
        Ok(order)
    }

    /// Cancelling never touches stock, even after a receipt.
    pub fn cancel_purchase_order(&self, order_id: PurchaseOrderId) -> Result<PurchaseOrder, DispatchError> {
        let command = PurchaseOrderCommand::CancelOrder(CancelOrder {
            order_id,
            occurred_at: Utc::now(),
        });
        let order = self.execute(order_id.aggregate_id(), PURCHASE_ORDER_AGGREGATE, command, purchase_order_shell)?;
        tracing::info!(order_id = %order_id, reference = %order.reference(), "purchase order cancelled");
        self.audit(
            PURCHASE_ORDER_AGGREGATE,
            order_id.aggregate_id(),
            order.reference(),
            "Purchase order cancelled.",
        );
        Ok(order)
    }

    /// Delete a draft or cancelled order together with its lines.
    pub fn delete_purchase_order(&self, order_id: PurchaseOrderId) -> Result<(), DispatchError> {
        let reference = self.purchase_order(order_id)?.reference().to_string();
        let command = PurchaseOrderCommand::DeleteOrder(DeleteOrder {
            order_id,
            occurred_at: Utc::now(),
        });
        self.execute(order_id.aggregate_id(), PURCHASE_ORDER_AGGREGATE, command, purchase_order_shell)?;
        tracing::info!(order_id = %order_id, reference = %reference, "purchase order deleted");
        self.audit(
            PURCHASE_ORDER_AGGREGATE,
            order_id.aggregate_id(),
            &reference,
            "Purchase order deleted.",
        );
        Ok(())
    }

    pub fn purchase_order(&self, order_id: PurchaseOrderId) -> Result<PurchaseOrder, DispatchError> {
        let order = self.load_purchase_order(order_id)?.into_inner();
        if !order.exists() {
            return Err(DispatchError::NotFound);
        }
        Ok(order)
    }
}
