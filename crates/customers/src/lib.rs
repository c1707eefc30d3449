//! Customer registry (event-sourced).
//!
//! Customers carry a generated, immutable code. Uniqueness of that code is
//! enforced outside the aggregate (see `stockroom-infra`); everything here is
//! deterministic domain logic.

pub mod customer;

pub use customer::{
    Address, Customer, CustomerCommand, CustomerContact, CustomerContactUpdated,
    CustomerCreditLimitSet, CustomerDeactivated, CustomerEvent, CustomerId, CustomerReactivated,
    CustomerRegistered, CustomerType, DeactivateCustomer, ReactivateCustomer, RegisterCustomer,
    SetCreditLimit, UpdateContact,
};
