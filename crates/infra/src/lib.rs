//! Infrastructure layer: event store, command dispatch, collaborators and the
//! order workflows built on top of them.

pub mod audit;
pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod sequence;
pub mod unique;
pub mod workflow;

pub use command_dispatcher::{CommandDispatcher, DispatchError, Loaded, Transaction};
pub use config::{ConfigError, WorkflowConfig};
pub use workflow::{
    Collaborators, LineEdit, NewCustomer, NewLine, NewProduct, NewPurchaseOrder, NewSaleOrder,
    Workflows,
};
