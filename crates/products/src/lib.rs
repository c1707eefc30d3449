//! Product catalog domain module (event-sourced).
//!
//! Products carry their prices, the derived profit margin, the on-hand stock
//! counter and its derived stock state. Pure domain logic (no IO, no storage).

pub mod product;
pub mod stock;

pub use product::{
    AdjustStock, ArchiveProduct, CreateProduct, PricesUpdated, Product, ProductArchived,
    ProductCategory, ProductCommand, ProductCreated, ProductDetailsUpdated, ProductEvent,
    ProductId, ProductReactivated, ProductRef, ReactivateProduct, SetStockThresholds,
    StockAdjusted, StockThresholdsUpdated, UpdatePrices, UpdateProductDetails,
    DEFAULT_MAXIMUM_QUANTITY, DEFAULT_MINIMUM_QUANTITY,
};
pub use stock::{StockMovementReason, StockState, profit_margin, validate_prices};
