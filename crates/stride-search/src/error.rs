use stride_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The catalog store cannot be reached.
    #[error("retriever unavailable: {0}")]
    RetrieverUnavailable(String),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("invalid retrieval config: {0}")]
    InvalidConfig(String),
}

impl From<StoreError> for SearchError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(msg) => Self::RetrieverUnavailable(msg),
            other => Self::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
