//! Order line engine shared by purchase and sale orders.
//!
//! - `line`: purchase/sale line entities with self-maintaining subtotals
//! - `book`: the owned, numbered line collection an order aggregate keeps
//! - `totals`: `TaxRate` and `DocumentTotals`

pub mod book;
pub mod line;
pub mod totals;

pub use book::OrderLines;
pub use line::{
    LineChanges, OrderLine, PurchaseLine, SaleLine, purchase_subtotal, sale_subtotal,
};
pub use totals::{DocumentTotals, TaxRate};
