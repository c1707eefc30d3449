use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockroom_core::AggregateId;
use stockroom_customers::CustomerId;

stockroom_core::aggregate_id!(
    /// Identifier of an invoice created by the invoicing collaborator.
    InvoiceId
);

/// Everything the invoicing side needs to raise an invoice for a sale order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRequest {
    pub customer_id: CustomerId,
    pub sale_order_id: AggregateId,
    pub order_reference: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    /// Starts at `total_amount`; nothing has been paid yet.
    pub balance_due: Decimal,
}
