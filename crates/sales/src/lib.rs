//! Sales Orders domain module (event-sourced).
//!
//! Business rules for sale orders, implemented purely as deterministic domain
//! logic. Stock sufficiency is decided here from a snapshot passed in with the
//! confirm command; the workflow service in `stockroom-infra` takes that
//! snapshot and commits the order and product streams together.

pub mod order;

pub use order::{
    AddLine, CancelOrder, ConfirmOrder, CreateSaleOrder, DeleteOrder, DeliverOrder,
    DiscountSet, InvoiceLinked, LineAdded, LineRemoved, LineUpdated, OrderCancelled,
    OrderConfirmed, OrderDeleted, OrderDelivered, RecordInvoice, RemoveLine, SaleOrder,
    SaleOrderCommand, SaleOrderCreated, SaleOrderEvent, SaleOrderId, SaleOrderStatus,
    SetDiscount, StockLevel, UpdateLine,
};
