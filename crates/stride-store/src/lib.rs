//! Catalog store: products, inventory, and orders behind a one-operation SQL
//! transport with direct (Postgres) and mediated (tool server) backends.

pub mod catalog;
pub mod error;
#[cfg(feature = "mock")]
pub mod memory;
pub mod schema;
pub mod sql;
pub mod transport;
pub mod types;

pub use catalog::{
    Catalog, CandidateProduct, CandidateSet, LexicalFilters, LexicalHits, OrderItemRequest,
    PricingPolicy, RankedProduct,
};
pub use error::{Result, StoreError};
#[cfg(feature = "mock")]
pub use memory::MemoryCatalog;
pub use sql::SqlCatalog;
pub use transport::{
    AnyTransport, DirectTransport, MediatedTransport, Row, SqlParam, SqlValue, StoreTransport,
};
pub use types::{Category, Order, OrderItem, OrderStatus, Product};
