//! Unique business codes (customer codes, product codes).

use std::collections::HashMap;
use std::sync::RwLock;

use stockroom_core::{AggregateId, DomainError};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CodeScope {
    Customer,
    Product,
}

impl CodeScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeScope::Customer => "customer",
            CodeScope::Product => "product",
        }
    }
}

/// Reservation table for `(scope, code)` pairs.
///
/// A code is reserved before the owning aggregate is created and released
/// again if that create does not commit.
#[derive(Debug, Default)]
pub struct UniqueCodeIndex {
    codes: RwLock<HashMap<(CodeScope, String), AggregateId>>,
}

impl UniqueCodeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve(&self, scope: CodeScope, code: &str, owner: AggregateId) -> Result<(), DomainError> {
        let mut codes = self
            .codes
            .write()
            .map_err(|_| DomainError::invariant("unique code index lock poisoned"))?;

        let key = (scope, code.to_string());
        match codes.get(&key) {
            Some(existing) if *existing == owner => Ok(()),
            Some(_) => Err(DomainError::constraint(format!(
                "{} code '{code}' already exists",
                scope.as_str()
            ))),
            None => {
                codes.insert(key, owner);
                Ok(())
            }
        }
    }

    /// Drop a reservation held by `owner`. Reservations of other owners stay.
    pub fn release(&self, scope: CodeScope, code: &str, owner: AggregateId) {
        let Ok(mut codes) = self.codes.write() else {
            return;
        };
        let key = (scope, code.to_string());
        if codes.get(&key) == Some(&owner) {
            codes.remove(&key);
        }
    }

    pub fn owner(&self, scope: CodeScope, code: &str) -> Option<AggregateId> {
        let codes = self.codes.read().ok()?;
        codes.get(&(scope, code.to_string())).copied()
    }
}
