//! Shared tracing setup.

pub mod subscriber;

pub use subscriber::{init, init_for_tests};
