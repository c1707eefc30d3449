use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use stockroom_customers::{
    Customer, CustomerCommand, CustomerContact, CustomerId, CustomerType, DeactivateCustomer,
    ReactivateCustomer, RegisterCustomer, SetCreditLimit, UpdateContact,
};
use stockroom_events::{EventBus, EventEnvelope};

use super::{CUSTOMER_AGGREGATE, Workflows, customer_shell};
use crate::command_dispatcher::DispatchError;
use crate::event_store::EventStore;
use crate::sequence::{DocumentType, reference_or_fallback};
use crate::unique::CodeScope;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCustomer {
    pub name: String,
    pub contact: CustomerContact,
    pub customer_type: CustomerType,
    pub company_name: Option<String>,
    pub tax_id: Option<String>,
    pub credit_limit: Decimal,
    pub notes: Option<String>,
}

impl NewCustomer {
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contact: CustomerContact::with_phone(phone),
            customer_type: CustomerType::default(),
            company_name: None,
            tax_id: None,
            credit_limit: Decimal::ZERO,
            notes: None,
        }
    }
}

impl<S, B> Workflows<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Register a customer under the next customer code.
    ///
    /// When the numbering service has nothing to give, the placeholder code
    /// is used; a second placeholder customer then fails the uniqueness check.
    pub fn register_customer(&self, new: NewCustomer) -> Result<Customer, DispatchError> {
        let customer_id = CustomerId::generate();
        let code = reference_or_fallback(self.collaborators.sequences.as_ref(), DocumentType::Customer);
        self.codes
            .reserve(CodeScope::Customer, &code, customer_id.aggregate_id())?;

        let command = CustomerCommand::RegisterCustomer(RegisterCustomer {
            customer_id,
            code: code.clone(),
            name: new.name,
            contact: new.contact,
            customer_type: new.customer_type,
            company_name: new.company_name,
            tax_id: new.tax_id,
            credit_limit: new.credit_limit,
            notes: new.notes,
            occurred_at: Utc::now(),
        });

        match self.execute(customer_id.aggregate_id(), CUSTOMER_AGGREGATE, command, customer_shell) {
            Ok(customer) => {
                tracing::info!(customer_id = %customer_id, code = %code, "customer registered");
                Ok(customer)
            }
            Err(err) => {
                self.codes
                    .release(CodeScope::Customer, &code, customer_id.aggregate_id());
                Err(err)
            }
        }
    }

    /// Replace the name, contact details or notes. `None` keeps the current value.
    pub fn update_customer_contact(
        &self,
        customer_id: CustomerId,
        name: Option<String>,
        contact: Option<CustomerContact>,
        notes: Option<String>,
    ) -> Result<Customer, DispatchError> {
        let command = CustomerCommand::UpdateContact(UpdateContact {
            customer_id,
            name,
            contact,
            notes,
            occurred_at: Utc::now(),
        });
        self.execute(customer_id.aggregate_id(), CUSTOMER_AGGREGATE, command, customer_shell)
    }

    pub fn set_credit_limit(&self, customer_id: CustomerId, credit_limit: Decimal) -> Result<Customer, DispatchError> {
        let command = CustomerCommand::SetCreditLimit(SetCreditLimit {
            customer_id,
            credit_limit,
            occurred_at: Utc::now(),
        });
        self.execute(customer_id.aggregate_id(), CUSTOMER_AGGREGATE, command, customer_shell)
    }

    pub fn deactivate_customer(
        &self,
        customer_id: CustomerId,
        reason: Option<String>,
    ) -> Result<Customer, DispatchError> {
        let command = CustomerCommand::DeactivateCustomer(DeactivateCustomer {
            customer_id,
            reason,
            occurred_at: Utc::now(),
        });
        let customer = self.execute(customer_id.aggregate_id(), CUSTOMER_AGGREGATE, command, customer_shell)?;
        tracing::info!(customer_id = %customer_id, code = %customer.code(), "customer deactivated");
        Ok(customer)
    }

    pub fn reactivate_customer(&self, customer_id: CustomerId) -> Result<Customer, DispatchError> {
        let command = CustomerCommand::ReactivateCustomer(ReactivateCustomer {
            customer_id,
            occurred_at: Utc::now(),
        });
        let customer = self.execute(customer_id.aggregate_id(), CUSTOMER_AGGREGATE, command, customer_shell)?;
        tracing::info!(customer_id = %customer_id, code = %customer.code(), "customer reactivated");
        Ok(customer)
    }

    pub fn customer(&self, customer_id: CustomerId) -> Result<Customer, DispatchError> {
        let customer = self.load_customer(customer_id)?.into_inner();
        if !customer.is_created() {
            return Err(DispatchError::NotFound);
        }
        Ok(customer)
    }
}
