//! Append-only event store boundary.
//!
//! Streams are keyed by aggregate id. The trait makes no storage assumptions;
//! `InMemoryEventStore` backs tests and local runs.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};
