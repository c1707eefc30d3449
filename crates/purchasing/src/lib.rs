//! Purchasing domain module (Purchase Orders, event-sourced).
//!
//! Business rules for purchase orders, implemented purely as deterministic
//! domain logic. Crediting stock on receipt is orchestrated by the workflow
//! service in `stockroom-infra`, which commits the receipt and the product
//! adjustments together.

pub mod order;

pub use order::{
    AddLine, CancelOrder, ConfirmOrder, CreatePurchaseOrder, DeleteOrder, LineAdded, LineRemoved,
    LineUpdated, OrderCancelled, OrderConfirmed, OrderDeleted, OrderReceived, PurchaseOrder,
    PurchaseOrderCommand, PurchaseOrderCreated, PurchaseOrderEvent, PurchaseOrderId,
    PurchaseOrderStatus, ReceiveOrder, RemoveLine, UpdateLine,
};
