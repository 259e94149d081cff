use stride_llm::LlmError;
use stride_search::SearchError;
use stride_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("invalid quantity {quantity} for {product_id}")]
    InvalidQuantity { product_id: String, quantity: i32 },

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("bad image: {0}")]
    BadImage(String),

    #[error("product not found: {product_id}")]
    NotFound { product_id: String },

    #[error("insufficient inventory for {product_id}: requested {requested}, available {available}")]
    InsufficientInventory {
        product_id: String,
        requested: i32,
        available: i32,
    },

    #[error("retriever unavailable: {0}")]
    RetrieverUnavailable(String),

    #[error("embedding failure: {0}")]
    EmbeddingFailure(String),

    #[error("llm failure: {0}")]
    LlmFailure(String),

    #[error("tool-call bound of {limit} exhausted")]
    LoopExhausted { limit: usize },

    #[error("turn deadline of {ms}ms exceeded")]
    TurnTimeout { ms: u64 },

    #[error("store failure: {0}")]
    StoreFailure(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("bad tool arguments for {tool}: {reason}")]
    BadToolArguments { tool: String, reason: String },
}

pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    /// Business-rule rejections get specific user-facing text; infrastructure
    /// failures get a generic apology.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidQuantity { quantity, .. } => {
                format!("A quantity of {quantity} isn't something I can order — please use at least 1.")
            }
            Self::MissingField(field) => format!("I need a {field} to do that."),
            Self::BadImage(_) => "I couldn't read that image — please try another one.".to_string(),
            Self::NotFound { product_id } => {
                format!("I couldn't find a product with id {product_id}.")
            }
            Self::InsufficientInventory { available, .. } => {
                if *available == 0 {
                    "That item just sold out.".to_string()
                } else {
                    format!("We only have {available} of those left.")
                }
            }
            _ => "I couldn't complete that — please try again.".to_string(),
        }
    }

    /// Whether the supervisor must end the turn immediately.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::StoreFailure(_) | Self::RetrieverUnavailable(_) | Self::TurnTimeout { .. }
        )
    }
}

impl From<StoreError> for AgentError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { product_id } => Self::NotFound { product_id },
            StoreError::InsufficientInventory {
                product_id,
                requested,
                available,
            } => Self::InsufficientInventory {
                product_id,
                requested,
                available,
            },
            StoreError::InvalidQuantity {
                product_id,
                quantity,
            } => Self::InvalidQuantity {
                product_id,
                quantity,
            },
            StoreError::EmptyOrder => Self::MissingField("items"),
            StoreError::Unavailable(msg) => Self::RetrieverUnavailable(msg),
            other @ (StoreError::Sql(_) | StoreError::Mediated(_) | StoreError::Decode(_)) => {
                Self::StoreFailure(other.to_string())
            }
        }
    }
}

impl From<SearchError> for AgentError {
    fn from(e: SearchError) -> Self {
        match e {
            SearchError::RetrieverUnavailable(msg) => Self::RetrieverUnavailable(msg),
            SearchError::Store(store) => store.into(),
            SearchError::InvalidConfig(msg) => Self::StoreFailure(msg),
        }
    }
}

impl From<LlmError> for AgentError {
    fn from(e: LlmError) -> Self {
        Self::LlmFailure(e.to_string())
    }
}
