//! Query understanding and hybrid retrieval.

pub mod error;
pub mod parser;
pub mod retriever;

pub use error::{Result, SearchError};
pub use parser::{KNOWN_BRANDS, ParsedQuery, parse};
pub use retriever::{
    HybridRetriever, RetrievalConfig, RetrievalMode, RetrievalOutcome, ScoredProduct,
};
