//! Invoice handoff.
//!
//! Sale orders do not own invoices; they hand a summary to an
//! [`InvoiceGateway`] once and keep only the returned [`InvoiceId`].

pub mod gateway;
pub mod in_memory;
pub mod request;

pub use gateway::{InvoiceError, InvoiceGateway};
pub use in_memory::InMemoryInvoiceGateway;
pub use request::{InvoiceId, InvoiceRequest};
