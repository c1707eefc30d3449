use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use stockroom_customers::CustomerId;
use stockroom_events::{EventBus, EventEnvelope};
use stockroom_products::StockMovementReason;
use stockroom_sales::{
    AddLine, CancelOrder, ConfirmOrder, CreateSaleOrder, DeleteOrder, DeliverOrder, RecordInvoice,
    RemoveLine, SaleOrder, SaleOrderCommand, SaleOrderId, SaleOrderStatus, SetDiscount,
    StockLevel, UpdateLine,
};

use super::stock::stage_adjustments;
use super::{LineEdit, NewLine, SALE_ORDER_AGGREGATE, Workflows, sale_order_shell};
use crate::command_dispatcher::DispatchError;
use crate::event_store::EventStore;
use crate::sequence::{DocumentType, reference_or_fallback};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSaleOrder {
    /// Taken from the numbering service when absent.
    pub reference: Option<String>,
    pub customer_id: CustomerId,
    /// Defaults to today.
    pub order_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl NewSaleOrder {
    pub fn new(customer_id: CustomerId) -> Self {
        Self {
            reference: None,
            customer_id,
            order_date: None,
            notes: None,
        }
    }
}

impl<S, B> Workflows<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Open a draft sale order for an existing, active customer.
    pub fn create_sale_order(&self, new: NewSaleOrder) -> Result<SaleOrder, DispatchError> {
        let customer = self.load_customer(new.customer_id)?.into_inner();
        if !customer.is_created() {
            return Err(DispatchError::Validation(format!(
                "customer {} does not exist",
                new.customer_id
            )));
        }
        if !customer.is_active() {
            return Err(DispatchError::Validation(format!(
                "customer {} is inactive",
                customer.code()
            )));
        }

        let order_id = SaleOrderId::generate();
        let reference = match new.reference.filter(|r| !r.trim().is_empty()) {
            Some(reference) => reference,
            None => reference_or_fallback(self.collaborators.sequences.as_ref(), DocumentType::SaleOrder),
        };
        let now = Utc::now();

        let command = SaleOrderCommand::CreateSaleOrder(CreateSaleOrder {
            order_id,
            reference,
            customer_id: new.customer_id,
            order_date: Some(new.order_date.unwrap_or_else(|| now.date_naive())),
            notes: new.notes,
            tax_rate: self.config.tax_rate,
            occurred_at: now,
        });
        let order = self.execute(order_id.aggregate_id(), SALE_ORDER_AGGREGATE, command, sale_order_shell)?;
        tracing::info!(
            order_id = %order_id,
            reference = %order.reference(),
            customer = %customer.code(),
            "sale order created"
        );
        Ok(order)
    }

    pub fn add_sale_line(&self, order_id: SaleOrderId, line: NewLine) -> Result<SaleOrder, DispatchError> {
        let (product, changes) = self.new_line_changes(line)?;
        let command = SaleOrderCommand::AddLine(AddLine {
            order_id,
            product,
            changes,
            occurred_at: Utc::now(),
        });
        self.execute(order_id.aggregate_id(), SALE_ORDER_AGGREGATE, command, sale_order_shell)
    }

    pub fn update_sale_line(&self, order_id: SaleOrderId, line_no: u32, edit: LineEdit) -> Result<SaleOrder, DispatchError> {
        let changes = self.line_edit_changes(edit)?;
        let command = SaleOrderCommand::UpdateLine(UpdateLine {
            order_id,
            line_no,
            changes,
            occurred_at: Utc::now(),
        });
        self.execute(order_id.aggregate_id(), SALE_ORDER_AGGREGATE, command, sale_order_shell)
    }

    pub fn remove_sale_line(&self, order_id: SaleOrderId, line_no: u32) -> Result<SaleOrder, DispatchError> {
        let command = SaleOrderCommand::RemoveLine(RemoveLine {
            order_id,
            line_no,
            occurred_at: Utc::now(),
        });
        self.execute(order_id.aggregate_id(), SALE_ORDER_AGGREGATE, command, sale_order_shell)
    }

    /// Order-level discount, subtracted after tax.
    pub fn set_sale_discount(&self, order_id: SaleOrderId, discount_amount: Decimal) -> Result<SaleOrder, DispatchError> {
        let command = SaleOrderCommand::SetDiscount(SetDiscount {
            order_id,
            discount_amount,
            occurred_at: Utc::now(),
        });
        self.execute(order_id.aggregate_id(), SALE_ORDER_AGGREGATE, command, sale_order_shell)
    }

    /// Confirm a draft order: check stock for every product on it, take the
    /// stock out and confirm the order in one atomic commit, then hand the
    /// order to invoicing.
    ///
    /// If invoicing fails the confirmation stands and the invoicing error is
    /// returned; [`Workflows::generate_invoice`] can be retried on its own.
    pub fn confirm_sale_order(&self, order_id: SaleOrderId) -> Result<SaleOrder, DispatchError> {
        let order = self.with_retry("confirm sale order", || {
            let now = Utc::now();
            let mut order = self.load_sale_order(order_id)?;
            let demand = order.aggregate().stock_demand()?;
            let mut products = self.load_products(demand.keys().copied())?;

            let stock = products
                .values()
                .map(|p| p.aggregate())
                .filter(|p| p.is_created())
                .map(|p| StockLevel {
                    product_id: p.id_typed(),
                    product_name: p.name().to_string(),
                    quantity_on_hand: p.quantity_on_hand(),
                })
                .collect();

            let mut tx = self.dispatcher.begin();
            tx.stage(
                &mut order,
                SALE_ORDER_AGGREGATE,
                &SaleOrderCommand::ConfirmOrder(ConfirmOrder {
                    order_id,
                    stock,
                    occurred_at: now,
                }),
            )?;

            let movements: Vec<_> = demand.iter().map(|(id, qty)| (*id, -*qty)).collect();
            stage_adjustments(
                &mut tx,
                &mut products,
                &movements,
                StockMovementReason::SaleConfirmation,
                order.aggregate().reference(),
                now,
            )?;

            self.dispatcher.commit(tx)?;
            Ok(order.into_inner())
        })?;

        tracing::info!(
            order_id = %order_id,
            reference = %order.reference(),
            total = %order.totals().total_amount,
            "sale order confirmed"
        );
        self.audit(
            SALE_ORDER_AGGREGATE,
            order_id.aggregate_id(),
            order.reference(),
            "Sale order confirmed. Stock updated.",
        );

        self.generate_invoice(order_id).map_err(|err| {
            tracing::warn!(
                order_id = %order_id,
                reference = %order.reference(),
                error = %err,
                "sale order confirmed but invoice generation failed"
            );
            err
        })
    }

    /// Create the order's invoice unless it already has one.
    ///
    /// The gateway keys invoices on the sale order, so callers racing here
    /// get the same invoice back; whichever links it first wins and the rest
    /// return the linked order.
    pub fn generate_invoice(&self, order_id: SaleOrderId) -> Result<SaleOrder, DispatchError> {
        let order = self.sale_order(order_id)?;
        if let Some(invoice_id) = order.invoice_id() {
            tracing::debug!(order_id = %order_id, invoice_id = %invoice_id, "invoice already linked");
            return Ok(order);
        }
        if !order.is_invoice_allowed() {
            return Err(DispatchError::InvalidTransition {
                from: order.status().to_string(),
                action: "generate invoice".to_string(),
            });
        }

        let request = order.invoice_request(Utc::now().date_naive())?;
        let invoice_id = self.collaborators.invoices.create_invoice(&request)?;

        let linked = self.with_retry("link invoice", || {
            self.dispatcher.dispatch(
                order_id.aggregate_id(),
                SALE_ORDER_AGGREGATE,
                SaleOrderCommand::RecordInvoice(RecordInvoice {
                    order_id,
                    invoice_id,
                    occurred_at: Utc::now(),
                }),
                sale_order_shell,
            )
        });

        match linked {
            Ok(committed) if committed.is_empty() => {
                tracing::debug!(order_id = %order_id, invoice_id = %invoice_id, "invoice linked by a concurrent call");
            }
            Ok(_) => {
                tracing::info!(
                    order_id = %order_id,
                    invoice_id = %invoice_id,
                    balance_due = %request.balance_due,
                    "invoice created"
                );
                self.audit(
                    SALE_ORDER_AGGREGATE,
                    order_id.aggregate_id(),
                    order.reference(),
                    "Invoice created.",
                );
            }
            Err(DispatchError::Conflict(reason)) => {
                let current = self.sale_order(order_id)?;
                let Some(existing) = current.invoice_id() else {
                    return Err(DispatchError::Conflict(reason));
                };
                tracing::warn!(
                    order_id = %order_id,
                    invoice_id = %existing,
                    unlinked_invoice_id = %invoice_id,
                    "order was invoiced concurrently; keeping the linked invoice"
                );
                return Ok(current);
            }
            Err(err) => return Err(err),
        }
        self.sale_order(order_id)
    }

    pub fn deliver_sale_order(&self, order_id: SaleOrderId) -> Result<SaleOrder, DispatchError> {
        let command = SaleOrderCommand::DeliverOrder(DeliverOrder {
            order_id,
            occurred_at: Utc::now(),
        });
        let order = self.execute(order_id.aggregate_id(), SALE_ORDER_AGGREGATE, command, sale_order_shell)?;
        tracing::info!(order_id = %order_id, reference = %order.reference(), "sale order delivered");
        self.audit(
            SALE_ORDER_AGGREGATE,
            order_id.aggregate_id(),
            order.reference(),
            "Sale order delivered.",
        );
        Ok(order)
    }

    /// Cancel a draft or confirmed order. Stock taken by the confirmation is
    /// put back in the same commit.
    pub fn cancel_sale_order(&self, order_id: SaleOrderId) -> Result<SaleOrder, DispatchError> {
        let (order, restored) = self.with_retry("cancel sale order", || {
            let now = Utc::now();
            let mut order = self.load_sale_order(order_id)?;
            let restore = order.aggregate().status() == SaleOrderStatus::Confirmed;

            let mut tx = self.dispatcher.begin();
            tx.stage(
                &mut order,
                SALE_ORDER_AGGREGATE,
                &SaleOrderCommand::CancelOrder(CancelOrder {
                    order_id,
                    occurred_at: now,
                }),
            )?;

            if restore {
                let demand = order.aggregate().stock_demand()?;
                let mut products = self.load_products(demand.keys().copied())?;
                let movements: Vec<_> = demand.into_iter().collect();
                stage_adjustments(
                    &mut tx,
                    &mut products,
                    &movements,
                    StockMovementReason::SaleCancellation,
                    order.aggregate().reference(),
                    now,
                )?;
            }

            self.dispatcher.commit(tx)?;
            Ok((order.into_inner(), restore))
        })?;

        tracing::info!(
            order_id = %order_id,
            reference = %order.reference(),
            stock_restored = restored,
            "sale order cancelled"
        );
        let message = if restored {
            "Sale order cancelled. Stock restored."
        } else {
            "Sale order cancelled."
        };
        self.audit(SALE_ORDER_AGGREGATE, order_id.aggregate_id(), order.reference(), message);
        Ok(order)
    }

    /// Delete a draft or cancelled order together with its lines.
    pub fn delete_sale_order(&self, order_id: SaleOrderId) -> Result<(), DispatchError> {
        let reference = self.sale_order(order_id)?.reference().to_string();
        let command = SaleOrderCommand::DeleteOrder(DeleteOrder {
            order_id,
            occurred_at: Utc::now(),
        });
        self.execute(order_id.aggregate_id(), SALE_ORDER_AGGREGATE, command, sale_order_shell)?;
        tracing::info!(order_id = %order_id, reference = %reference, "sale order deleted");
        self.audit(SALE_ORDER_AGGREGATE, order_id.aggregate_id(), &reference, "Sale order deleted.");
        Ok(())
    }

    pub fn sale_order(&self, order_id: SaleOrderId) -> Result<SaleOrder, DispatchError> {
        let order = self.load_sale_order(order_id)?.into_inner();
        if !order.exists() {
            return Err(DispatchError::NotFound);
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::NewCustomer;
    use crate::workflow::tests::{stocked_product, workflows};
    use stockroom_lines::OrderLine;
    use rust_decimal_macros::dec;

    #[test]
    fn sale_orders_need_an_active_customer() {
        let (wf, _) = workflows();
        let err = wf
            .create_sale_order(NewSaleOrder::new(CustomerId::generate()))
            .unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));

        let customer = wf
            .register_customer(NewCustomer::new("Ada", "555-0100"))
            .unwrap()
            .id_typed();
        wf.deactivate_customer(customer, None).unwrap();
        let err = wf.create_sale_order(NewSaleOrder::new(customer)).unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));

        wf.reactivate_customer(customer).unwrap();
        let order = wf.create_sale_order(NewSaleOrder::new(customer)).unwrap();
        assert_eq!(order.reference(), "SO00001");
        assert_eq!(order.customer_id(), Some(customer));
    }

    #[test]
    fn totals_follow_lines_and_discount() {
        let (wf, _) = workflows();
        let product = stocked_product(&wf, "WID-1", dec!(50));
        let customer = wf
            .register_customer(NewCustomer::new("Ada", "555-0100"))
            .unwrap()
            .id_typed();
        let order_id = wf
            .create_sale_order(NewSaleOrder::new(customer))
            .unwrap()
            .id_typed();

        let mut line = NewLine::new(product, dec!(2));
        line.discount = Some(dec!(50));
        let order = wf.add_sale_line(order_id, line).unwrap();
        // 2 x 10 at 50% off
        assert_eq!(order.totals().subtotal, dec!(10));

        let order = wf.set_sale_discount(order_id, dec!(1.5)).unwrap();
        assert_eq!(order.totals().tax_amount, dec!(1.5));
        assert_eq!(order.totals().total_amount, dec!(10));

        let err = wf.set_sale_discount(order_id, dec!(-1)).unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
    }

    #[test]
    fn amounts_past_the_decimal_range_are_rejected() {
        let (wf, _) = workflows();
        let product = stocked_product(&wf, "WID-1", dec!(5));
        let customer = wf
            .register_customer(NewCustomer::new("Ada", "555-0100"))
            .unwrap()
            .id_typed();
        let order_id = wf
            .create_sale_order(NewSaleOrder::new(customer))
            .unwrap()
            .id_typed();

        let mut line = NewLine::new(product, Decimal::MAX);
        line.unit_price = Some(dec!(100));
        let err = wf.add_sale_line(order_id, line).unwrap_err();
        assert!(matches!(err, DispatchError::Validation(ref msg) if msg == "amount out of range"));
        assert!(wf.sale_order(order_id).unwrap().lines().is_empty());

        // Each line fits on its own; their sum does not.
        let huge = Decimal::from_i128_with_scale(50_000_000_000_000_000_000_000_000_000, 0);
        let mut line = NewLine::new(product, huge);
        line.unit_price = Some(Decimal::ONE);
        wf.add_sale_line(order_id, line.clone()).unwrap();
        let err = wf.add_sale_line(order_id, line).unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));

        let order = wf.sale_order(order_id).unwrap();
        assert_eq!(order.lines().len(), 1);
        assert_eq!(order.totals().subtotal, huge);
    }

    #[test]
    fn draft_lines_can_be_edited_and_removed() {
        let (wf, _) = workflows();
        let widget = stocked_product(&wf, "WID-1", dec!(50));
        let gadget = stocked_product(&wf, "GAD-1", dec!(50));
        let customer = wf
            .register_customer(NewCustomer::new("Ada", "555-0100"))
            .unwrap()
            .id_typed();
        let order_id = wf
            .create_sale_order(NewSaleOrder::new(customer))
            .unwrap()
            .id_typed();
        wf.add_sale_line(order_id, NewLine::new(widget, dec!(2))).unwrap();
        wf.add_sale_line(order_id, NewLine::new(widget, dec!(1))).unwrap();

        let edit = LineEdit {
            product_id: Some(gadget),
            quantity: Some(dec!(3)),
            unit_price: Some(dec!(4)),
            ..LineEdit::default()
        };
        let order = wf.update_sale_line(order_id, 1, edit).unwrap();
        let line = &order.lines()[0];
        assert_eq!(line.product_id(), gadget);
        assert_eq!(line.unit_price(), dec!(4));
        assert_eq!(order.totals().subtotal, dec!(22));

        let order = wf.remove_sale_line(order_id, 2).unwrap();
        assert_eq!(order.lines().len(), 1);
        assert_eq!(order.totals().subtotal, dec!(12));

        let err = wf.remove_sale_line(order_id, 2).unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
    }

    #[test]
    fn invoice_is_not_generated_for_drafts() {
        let (wf, fixtures) = workflows();
        let customer = wf
            .register_customer(NewCustomer::new("Ada", "555-0100"))
            .unwrap()
            .id_typed();
        let order_id = wf
            .create_sale_order(NewSaleOrder::new(customer))
            .unwrap()
            .id_typed();

        let err = wf.generate_invoice(order_id).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidTransition { .. }));
        assert_eq!(fixtures.invoices.issued_count(), 0);
    }

    #[test]
    fn deliver_requires_confirmation() {
        let (wf, _) = workflows();
        let product = stocked_product(&wf, "WID-1", dec!(5));
        let customer = wf
            .register_customer(NewCustomer::new("Ada", "555-0100"))
            .unwrap()
            .id_typed();
        let order_id = wf
            .create_sale_order(NewSaleOrder::new(customer))
            .unwrap()
            .id_typed();
        wf.add_sale_line(order_id, NewLine::new(product, dec!(1)))
            .unwrap();

        assert!(matches!(
            wf.deliver_sale_order(order_id),
            Err(DispatchError::InvalidTransition { .. })
        ));
        wf.confirm_sale_order(order_id).unwrap();
        let order = wf.deliver_sale_order(order_id).unwrap();
        assert_eq!(order.status(), SaleOrderStatus::Delivered);
        assert_eq!(wf.product(product).unwrap().quantity_on_hand(), dec!(4));

        assert!(matches!(
            wf.cancel_sale_order(order_id),
            Err(DispatchError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn cancelling_a_draft_leaves_stock_alone() {
        let (wf, fixtures) = workflows();
        let product = stocked_product(&wf, "WID-1", dec!(5));
        let customer = wf
            .register_customer(NewCustomer::new("Ada", "555-0100"))
            .unwrap()
            .id_typed();
        let order_id = wf
            .create_sale_order(NewSaleOrder::new(customer))
            .unwrap()
            .id_typed();
        wf.add_sale_line(order_id, NewLine::new(product, dec!(3)))
            .unwrap();

        let order = wf.cancel_sale_order(order_id).unwrap();
        assert_eq!(order.status(), SaleOrderStatus::Cancelled);
        assert_eq!(wf.product(product).unwrap().quantity_on_hand(), dec!(5));
        assert_eq!(
            fixtures.audit.messages_for(order_id.aggregate_id()),
            vec!["Sale order cancelled.".to_string()]
        );

        wf.delete_sale_order(order_id).unwrap();
        assert!(matches!(wf.sale_order(order_id), Err(DispatchError::NotFound)));
    }
}
