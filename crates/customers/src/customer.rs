use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockroom_core::{Aggregate, AggregateRoot, DomainError};
use stockroom_events::Event;

stockroom_core::aggregate_id!(
    /// Customer identifier.
    CustomerId
);

/// Individual or company customer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomerType {
    #[default]
    Individual,
    Company,
}

/// Postal address. Every part is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: Option<String>,
    pub street2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
}

/// Contact information. `phone` is the only required channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerContact {
    pub phone: String,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub address: Address,
}

impl CustomerContact {
    pub fn with_phone(phone: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.phone.trim().is_empty() {
            return Err(DomainError::validation("phone cannot be empty"));
        }
        if let Some(email) = &self.email {
            if !email.contains('@') {
                return Err(DomainError::validation(format!("invalid email address: {email}")));
            }
        }
        Ok(())
    }
}

/// Aggregate root: Customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    id: CustomerId,
    code: String,
    name: String,
    contact: CustomerContact,
    customer_type: CustomerType,
    company_name: Option<String>,
    tax_id: Option<String>,
    credit_limit: Decimal,
    notes: Option<String>,
    active: bool,
    version: u64,
    created: bool,
}

impl Customer {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: CustomerId) -> Self {
        Self {
            id,
            code: String::new(),
            name: String::new(),
            contact: CustomerContact::default(),
            customer_type: CustomerType::Individual,
            company_name: None,
            tax_id: None,
            credit_limit: Decimal::ZERO,
            notes: None,
            active: true,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> CustomerId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contact(&self) -> &CustomerContact {
        &self.contact
    }

    pub fn customer_type(&self) -> CustomerType {
        self.customer_type
    }

    pub fn company_name(&self) -> Option<&str> {
        self.company_name.as_deref()
    }

    pub fn tax_id(&self) -> Option<&str> {
        self.tax_id.as_deref()
    }

    pub fn credit_limit(&self) -> Decimal {
        self.credit_limit
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    /// Only active customers can place new sale orders.
    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl AggregateRoot for Customer {
    type Id = CustomerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterCustomer.
///
/// `code` comes from the sequence service; the aggregate only checks it is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterCustomer {
    pub customer_id: CustomerId,
    pub code: String,
    pub name: String,
    pub contact: CustomerContact,
    pub customer_type: CustomerType,
    pub company_name: Option<String>,
    pub tax_id: Option<String>,
    pub credit_limit: Decimal,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateContact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateContact {
    pub customer_id: CustomerId,
    /// Optional new name (if None, keep existing).
    pub name: Option<String>,
    /// Optional new contact info (if None, keep existing).
    pub contact: Option<CustomerContact>,
    /// Optional new notes (if None, keep existing).
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetCreditLimit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetCreditLimit {
    pub customer_id: CustomerId,
    pub credit_limit: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeactivateCustomer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateCustomer {
    pub customer_id: CustomerId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReactivateCustomer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactivateCustomer {
    pub customer_id: CustomerId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerCommand {
    RegisterCustomer(RegisterCustomer),
    UpdateContact(UpdateContact),
    SetCreditLimit(SetCreditLimit),
    DeactivateCustomer(DeactivateCustomer),
    ReactivateCustomer(ReactivateCustomer),
}

/// Event: CustomerRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRegistered {
    pub customer_id: CustomerId,
    pub code: String,
    pub name: String,
    pub contact: CustomerContact,
    pub customer_type: CustomerType,
    pub company_name: Option<String>,
    pub tax_id: Option<String>,
    pub credit_limit: Decimal,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CustomerContactUpdated. Carries the full resulting contact block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerContactUpdated {
    pub customer_id: CustomerId,
    pub name: String,
    pub contact: CustomerContact,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CustomerCreditLimitSet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerCreditLimitSet {
    pub customer_id: CustomerId,
    pub credit_limit: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CustomerDeactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDeactivated {
    pub customer_id: CustomerId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CustomerReactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerReactivated {
    pub customer_id: CustomerId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerEvent {
    CustomerRegistered(CustomerRegistered),
    CustomerContactUpdated(CustomerContactUpdated),
    CustomerCreditLimitSet(CustomerCreditLimitSet),
    CustomerDeactivated(CustomerDeactivated),
    CustomerReactivated(CustomerReactivated),
}

impl Event for CustomerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CustomerEvent::CustomerRegistered(_) => "customers.customer.registered",
            CustomerEvent::CustomerContactUpdated(_) => "customers.customer.contact_updated",
            CustomerEvent::CustomerCreditLimitSet(_) => "customers.customer.credit_limit_set",
            CustomerEvent::CustomerDeactivated(_) => "customers.customer.deactivated",
            CustomerEvent::CustomerReactivated(_) => "customers.customer.reactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CustomerEvent::CustomerRegistered(e) => e.occurred_at,
            CustomerEvent::CustomerContactUpdated(e) => e.occurred_at,
            CustomerEvent::CustomerCreditLimitSet(e) => e.occurred_at,
            CustomerEvent::CustomerDeactivated(e) => e.occurred_at,
            CustomerEvent::CustomerReactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Customer {
    type Command = CustomerCommand;
    type Event = CustomerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CustomerEvent::CustomerRegistered(e) => {
                self.id = e.customer_id;
                self.code = e.code.clone();
                self.name = e.name.clone();
                self.contact = e.contact.clone();
                self.customer_type = e.customer_type;
                self.company_name = e.company_name.clone();
                self.tax_id = e.tax_id.clone();
                self.credit_limit = e.credit_limit;
                self.notes = e.notes.clone();
                self.active = true;
                self.created = true;
            }
            CustomerEvent::CustomerContactUpdated(e) => {
                self.name = e.name.clone();
                self.contact = e.contact.clone();
                self.notes = e.notes.clone();
            }
            CustomerEvent::CustomerCreditLimitSet(e) => {
                self.credit_limit = e.credit_limit;
            }
            CustomerEvent::CustomerDeactivated(_) => {
                self.active = false;
            }
            CustomerEvent::CustomerReactivated(_) => {
                self.active = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CustomerCommand::RegisterCustomer(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("customer already exists"));
                }
                if cmd.code.trim().is_empty() {
                    return Err(DomainError::validation("customer code cannot be empty"));
                }
                if cmd.name.trim().is_empty() {
                    return Err(DomainError::validation("name cannot be empty"));
                }
                cmd.contact.validate()?;
                ensure_credit_limit(cmd.credit_limit)?;

                Ok(vec![CustomerEvent::CustomerRegistered(CustomerRegistered {
                    customer_id: cmd.customer_id,
                    code: cmd.code.trim().to_string(),
                    name: cmd.name.trim().to_string(),
                    contact: cmd.contact.clone(),
                    customer_type: cmd.customer_type,
                    company_name: cmd.company_name.clone(),
                    tax_id: cmd.tax_id.clone(),
                    credit_limit: cmd.credit_limit,
                    notes: cmd.notes.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            CustomerCommand::UpdateContact(cmd) => {
                self.ensure_exists(cmd.customer_id)?;

                let name = match &cmd.name {
                    Some(n) if n.trim().is_empty() => {
                        return Err(DomainError::validation("name cannot be empty"));
                    }
                    Some(n) => n.trim().to_string(),
                    None => self.name.clone(),
                };
                let contact = cmd.contact.clone().unwrap_or_else(|| self.contact.clone());
                contact.validate()?;
                let notes = cmd.notes.clone().or_else(|| self.notes.clone());

                Ok(vec![CustomerEvent::CustomerContactUpdated(CustomerContactUpdated {
                    customer_id: cmd.customer_id,
                    name,
                    contact,
                    notes,
                    occurred_at: cmd.occurred_at,
                })])
            }
            CustomerCommand::SetCreditLimit(cmd) => {
                self.ensure_exists(cmd.customer_id)?;
                ensure_credit_limit(cmd.credit_limit)?;

                Ok(vec![CustomerEvent::CustomerCreditLimitSet(CustomerCreditLimitSet {
                    customer_id: cmd.customer_id,
                    credit_limit: cmd.credit_limit,
                    occurred_at: cmd.occurred_at,
                })])
            }
            CustomerCommand::DeactivateCustomer(cmd) => {
                self.ensure_exists(cmd.customer_id)?;
                if !self.active {
                    return Err(DomainError::invalid_transition("inactive", "deactivate"));
                }

                Ok(vec![CustomerEvent::CustomerDeactivated(CustomerDeactivated {
                    customer_id: cmd.customer_id,
                    reason: cmd.reason.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            CustomerCommand::ReactivateCustomer(cmd) => {
                self.ensure_exists(cmd.customer_id)?;
                if self.active {
                    return Err(DomainError::invalid_transition("active", "reactivate"));
                }

                Ok(vec![CustomerEvent::CustomerReactivated(CustomerReactivated {
                    customer_id: cmd.customer_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl Customer {
    fn ensure_exists(&self, customer_id: CustomerId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != customer_id {
            return Err(DomainError::invariant("customer_id mismatch"));
        }
        Ok(())
    }
}

fn ensure_credit_limit(credit_limit: Decimal) -> Result<(), DomainError> {
    if credit_limit < Decimal::ZERO {
        return Err(DomainError::validation("credit limit cannot be negative"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn register_cmd(customer_id: CustomerId) -> RegisterCustomer {
        RegisterCustomer {
            customer_id,
            code: "CUST00001".to_string(),
            name: "Acme Trading".to_string(),
            contact: CustomerContact {
                phone: "+1 555 0100".to_string(),
                email: Some("buyer@acme.test".to_string()),
                mobile: None,
                address: Address {
                    city: Some("Springfield".to_string()),
                    ..Address::default()
                },
            },
            customer_type: CustomerType::Company,
            company_name: Some("Acme Trading Ltd".to_string()),
            tax_id: None,
            credit_limit: dec!(5000),
            notes: None,
            occurred_at: test_time(),
        }
    }

    fn registered() -> Customer {
        let id = CustomerId::generate();
        let mut customer = Customer::empty(id);
        let events = customer
            .handle(&CustomerCommand::RegisterCustomer(register_cmd(id)))
            .unwrap();
        for e in &events {
            customer.apply(e);
        }
        customer
    }

    #[test]
    fn register_sets_state() {
        let customer = registered();
        assert!(customer.is_created());
        assert!(customer.is_active());
        assert_eq!(customer.code(), "CUST00001");
        assert_eq!(customer.customer_type(), CustomerType::Company);
        assert_eq!(customer.credit_limit(), dec!(5000));
        assert_eq!(customer.version(), 1);
    }

    #[test]
    fn phone_is_required() {
        let id = CustomerId::generate();
        let customer = Customer::empty(id);
        let mut cmd = register_cmd(id);
        cmd.contact.phone = "  ".to_string();

        let err = customer.handle(&CustomerCommand::RegisterCustomer(cmd)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("phone")));
    }

    #[test]
    fn negative_credit_limit_is_rejected() {
        let customer = registered();
        let err = customer
            .handle(&CustomerCommand::SetCreditLimit(SetCreditLimit {
                customer_id: customer.id_typed(),
                credit_limit: dec!(-1),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn update_contact_keeps_unspecified_fields() {
        let mut customer = registered();
        let events = customer
            .handle(&CustomerCommand::UpdateContact(UpdateContact {
                customer_id: customer.id_typed(),
                name: None,
                contact: Some(CustomerContact::with_phone("+1 555 0199")),
                notes: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        customer.apply(&events[0]);

        assert_eq!(customer.name(), "Acme Trading");
        assert_eq!(customer.contact().phone, "+1 555 0199");
        assert_eq!(customer.code(), "CUST00001");
    }

    #[test]
    fn deactivate_then_reactivate() {
        let mut customer = registered();
        let deactivate = CustomerCommand::DeactivateCustomer(DeactivateCustomer {
            customer_id: customer.id_typed(),
            reason: Some("account closed".to_string()),
            occurred_at: test_time(),
        });
        let events = customer.handle(&deactivate).unwrap();
        customer.apply(&events[0]);
        assert!(!customer.is_active());

        let err = customer.handle(&deactivate).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));

        let events = customer
            .handle(&CustomerCommand::ReactivateCustomer(ReactivateCustomer {
                customer_id: customer.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap();
        customer.apply(&events[0]);
        assert!(customer.is_active());
    }

    #[test]
    fn cannot_register_twice() {
        let customer = registered();
        let err = customer
            .handle(&CustomerCommand::RegisterCustomer(register_cmd(customer.id_typed())))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 128,
                ..ProptestConfig::default()
            })]

            /// Property: the credit limit is accepted exactly when it is non-negative.
            #[test]
            fn credit_limit_sign_decides_acceptance(cents in -1_000_000i64..1_000_000i64) {
                let customer = registered();
                let limit = Decimal::new(cents, 2);
                let result = customer.handle(&CustomerCommand::SetCreditLimit(SetCreditLimit {
                    customer_id: customer.id_typed(),
                    credit_limit: limit,
                    occurred_at: test_time(),
                }));
                prop_assert_eq!(result.is_ok(), cents >= 0);
            }
        }
    }
}
