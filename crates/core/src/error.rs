//! Domain error model.

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, stock rules, state machine guards). Infrastructure concerns
/// belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (user-correctable, blocks the write).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// The command clashes with state already recorded (e.g. creating twice).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Not enough stock on hand to satisfy a movement.
    #[error("insufficient stock for {product}: available {available}, requested {requested}")]
    InsufficientStock {
        product: String,
        available: Decimal,
        requested: Decimal,
    },

    /// The requested action is not allowed from the current state.
    #[error("cannot {action} when state is {from}")]
    InvalidTransition { from: String, action: String },

    /// A uniqueness (or other persistence-level) constraint was violated.
    #[error("constraint violated: {0}")]
    ConstraintViolation(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// A money or quantity computation left the representable range.
    pub fn amount_out_of_range() -> Self {
        Self::Validation("amount out of range".to_string())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn insufficient_stock(
        product: impl Into<String>,
        available: Decimal,
        requested: Decimal,
    ) -> Self {
        Self::InsufficientStock {
            product: product.into(),
            available,
            requested,
        }
    }

    pub fn invalid_transition(from: impl core::fmt::Display, action: impl Into<String>) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            action: action.into(),
        }
    }

    pub fn constraint(msg: impl Into<String>) -> Self {
        Self::ConstraintViolation(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn insufficient_stock_message_names_product_and_available_quantity() {
        let err = DomainError::insufficient_stock("Widget", dec!(2), dec!(10));
        let msg = err.to_string();
        assert!(msg.contains("Widget"));
        assert!(msg.contains("available 2"));
        assert!(msg.contains("requested 10"));
    }

    #[test]
    fn invalid_transition_renders_state_and_action() {
        let err = DomainError::invalid_transition("received", "receive");
        assert_eq!(err.to_string(), "cannot receive when state is received");
    }
}
