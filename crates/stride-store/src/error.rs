#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Connectivity-level failure: pool exhausted, network down, tool server
    /// unreachable. Surfaced to retrieval callers as `retriever_unavailable`.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("mediated transport error: {0}")]
    Mediated(String),

    #[error("product not found: {product_id}")]
    NotFound { product_id: String },

    #[error("insufficient inventory for {product_id}: requested {requested}, available {available}")]
    InsufficientInventory {
        product_id: String,
        requested: i32,
        available: i32,
    },

    #[error("invalid quantity {quantity} for {product_id}")]
    InvalidQuantity { product_id: String, quantity: i32 },

    #[error("order has no items")]
    EmptyOrder,

    #[error("row decode failed: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Whether this error is a business-rule rejection rather than an
    /// infrastructure failure.
    #[must_use]
    pub fn is_business(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::InsufficientInventory { .. }
                | Self::InvalidQuantity { .. }
                | Self::EmptyOrder
        )
    }
}
