use thiserror::Error;

use crate::request::{InvoiceId, InvoiceRequest};

/// Failure reported by the invoicing collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvoiceError {
    /// The request was refused (e.g. failed validation on the invoicing side).
    #[error("invoice rejected: {0}")]
    Rejected(String),

    /// The collaborator could not be reached or failed internally.
    #[error("invoicing unavailable: {0}")]
    Unavailable(String),
}

/// Creates invoices, at most one per sale order.
///
/// `request.sale_order_id` is the idempotency key: a repeated request for an
/// order that was already invoiced returns the existing invoice's id instead
/// of raising a second invoice.
pub trait InvoiceGateway: Send + Sync {
    fn create_invoice(&self, request: &InvoiceRequest) -> Result<InvoiceId, InvoiceError>;
}

impl<G> InvoiceGateway for std::sync::Arc<G>
where
    G: InvoiceGateway + ?Sized,
{
    fn create_invoice(&self, request: &InvoiceRequest) -> Result<InvoiceId, InvoiceError> {
        (**self).create_invoice(request)
    }
}
