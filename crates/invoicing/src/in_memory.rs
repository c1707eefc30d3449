use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::gateway::{InvoiceError, InvoiceGateway};
use crate::request::{InvoiceId, InvoiceRequest};

/// In-memory invoicing collaborator.
///
/// Records one invoice per sale order. `fail_next(n)` makes the next `n` calls
/// return `InvoiceError::Unavailable`, which is how tests exercise the
/// "confirmed but not yet invoiced" path.
#[derive(Debug, Default)]
pub struct InMemoryInvoiceGateway {
    issued: Mutex<Vec<(InvoiceId, InvoiceRequest)>>,
    failures_left: AtomicU32,
}

impl InMemoryInvoiceGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, calls: u32) {
        self.failures_left.store(calls, Ordering::SeqCst);
    }

    /// Snapshot of all invoices created so far.
    pub fn issued(&self) -> Vec<(InvoiceId, InvoiceRequest)> {
        match self.issued.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn issued_count(&self) -> usize {
        self.issued().len()
    }
}

impl InvoiceGateway for InMemoryInvoiceGateway {
    fn create_invoice(&self, request: &InvoiceRequest) -> Result<InvoiceId, InvoiceError> {
        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if should_fail {
            tracing::debug!(order_reference = %request.order_reference, "simulated invoicing failure");
            return Err(InvoiceError::Unavailable("simulated outage".to_string()));
        }

        let mut guard = self
            .issued
            .lock()
            .map_err(|_| InvoiceError::Unavailable("invoice log lock poisoned".to_string()))?;
        if let Some((existing, _)) = guard
            .iter()
            .find(|(_, issued)| issued.sale_order_id == request.sale_order_id)
        {
            tracing::debug!(order_reference = %request.order_reference, invoice_id = %existing, "invoice already issued");
            return Ok(*existing);
        }

        let invoice_id = InvoiceId::generate();
        guard.push((invoice_id, request.clone()));
        Ok(invoice_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use stockroom_core::AggregateId;
    use stockroom_customers::CustomerId;

    fn request() -> InvoiceRequest {
        let today = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        InvoiceRequest {
            customer_id: CustomerId::generate(),
            sale_order_id: AggregateId::new(),
            order_reference: "SO00001".to_string(),
            issue_date: today,
            due_date: today,
            subtotal: dec!(100),
            tax_amount: dec!(15),
            total_amount: dec!(115),
            balance_due: dec!(115),
        }
    }

    #[test]
    fn records_one_invoice_per_order() {
        let gateway = InMemoryInvoiceGateway::new();
        let order = request();
        let first = gateway.create_invoice(&order).unwrap();
        let repeat = gateway.create_invoice(&order).unwrap();
        let other = gateway.create_invoice(&request()).unwrap();

        assert_eq!(first, repeat);
        assert_ne!(first, other);
        assert_eq!(gateway.issued_count(), 2);
        assert_eq!(gateway.issued()[0].1.balance_due, dec!(115));
    }

    #[test]
    fn fails_the_configured_number_of_calls() {
        let gateway = InMemoryInvoiceGateway::new();
        gateway.fail_next(1);

        assert!(matches!(
            gateway.create_invoice(&request()),
            Err(InvoiceError::Unavailable(_))
        ));
        assert!(gateway.create_invoice(&request()).is_ok());
        assert_eq!(gateway.issued_count(), 1);
    }
}
