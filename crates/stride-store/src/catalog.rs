use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Category, Order, Product};

/// Hard constraints extracted from a parsed query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LexicalFilters {
    /// Cleaned free text; `None` or empty skips the text match.
    pub text: Option<String>,
    pub category: Option<Category>,
    pub brand: Option<String>,
    pub price_max: Option<Decimal>,
}

impl LexicalFilters {
    #[must_use]
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("").trim()
    }

    #[must_use]
    pub fn matches(&self, product: &Product) -> bool {
        if let Some(category) = self.category
            && product.category != category
        {
            return false;
        }
        if let Some(brand) = &self.brand
            && !product.brand.eq_ignore_ascii_case(brand)
        {
            return false;
        }
        if let Some(price_max) = self.price_max
            && product.price > price_max
        {
            return false;
        }
        true
    }
}

/// Product with its full-text rank, lexical path.
#[derive(Debug, Clone)]
pub struct RankedProduct {
    pub product: Product,
    pub rank: f32,
}

/// Product from the ANN candidate set with its cosine distance and the
/// full-text rank of the query text against it (0 when no match).
#[derive(Debug, Clone)]
pub struct CandidateProduct {
    pub product: Product,
    pub distance: f32,
    pub rank: f32,
}

/// Lexical query result plus the statement that produced it, for the trace.
#[derive(Debug, Clone)]
pub struct LexicalHits {
    pub sql: String,
    pub hits: Vec<RankedProduct>,
}

/// ANN candidate result plus the statement that produced it, for the trace.
#[derive(Debug, Clone)]
pub struct CandidateSet {
    pub sql: String,
    pub hits: Vec<CandidateProduct>,
}

/// One requested line of an order, before pricing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItemRequest {
    pub product_id: String,
    #[serde(default)]
    pub size: Option<String>,
    pub quantity: i32,
}

/// Pricing rules applied inside the order transaction. Resolved from
/// configuration once at startup.
#[derive(Debug, Clone, Copy)]
pub struct PricingPolicy {
    pub tax_rate: Decimal,
    pub free_shipping_threshold: Decimal,
    pub flat_shipping: Decimal,
}

/// Typed surface over the product catalog and order tables.
///
/// Implementations must keep order placement atomic: either every item's
/// inventory is decremented and the order row exists, or nothing changed.
pub trait Catalog: Send + Sync {
    /// Fetch one product.
    ///
    /// # Errors
    ///
    /// Returns a store error on connectivity or decode failure.
    fn product_by_id(
        &self,
        product_id: &str,
    ) -> impl Future<Output = Result<Option<Product>>> + Send;

    /// Filtered full-text search ordered by rank.
    ///
    /// # Errors
    ///
    /// Returns a store error on connectivity or decode failure.
    fn lexical_search(
        &self,
        filters: &LexicalFilters,
        limit: usize,
    ) -> impl Future<Output = Result<LexicalHits>> + Send;

    /// Nearest-neighbor candidates by cosine distance, with per-candidate
    /// full-text rank against `text`. Products without an embedding never
    /// appear.
    ///
    /// # Errors
    ///
    /// Returns a store error on connectivity or decode failure.
    fn semantic_candidates(
        &self,
        query_vector: &[f32],
        text: Option<&str>,
        k: usize,
    ) -> impl Future<Output = Result<CandidateSet>> + Send;

    /// Price, reserve, and persist an order as one atomic operation.
    ///
    /// Line validation follows a fixed order: every row must exist before
    /// any quantity is judged, and quantities before inventory levels.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `InvalidQuantity`, `InsufficientInventory`, or
    /// `EmptyOrder` for business rejections; store errors otherwise.
    fn place_order(
        &self,
        customer_id: &str,
        items: &[OrderItemRequest],
        pricing: &PricingPolicy,
    ) -> impl Future<Output = Result<Order>> + Send;
}

/// Round half-up to two fractional digits, the rule used for every shown
/// monetary amount.
#[must_use]
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
}
