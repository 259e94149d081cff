//! Fixture-backed catalog for tests and offline development.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::catalog::{
    CandidateProduct, CandidateSet, Catalog, LexicalFilters, LexicalHits, OrderItemRequest,
    PricingPolicy, RankedProduct, round_money,
};
use crate::error::{Result, StoreError};
use crate::sql::{LEXICAL_SQL, SEMANTIC_SQL};
use crate::types::{Order, OrderItem, OrderStatus, Product};

struct StoredProduct {
    product: Product,
    embedding: Option<Vec<f32>>,
}

struct State {
    products: HashMap<String, StoredProduct>,
    orders: Vec<Order>,
}

/// In-memory implementation of [`Catalog`] with the same query and
/// transaction semantics as the SQL catalog. Order placement holds one lock
/// across validation and mutation, so concurrent orders against the same
/// product line are linearizable.
pub struct MemoryCatalog {
    state: Mutex<State>,
}

impl std::fmt::Debug for MemoryCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCatalog").finish_non_exhaustive()
    }
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                products: HashMap::new(),
                orders: Vec::new(),
            }),
        }
    }

    /// Insert or replace a fixture product.
    pub async fn insert(&self, product: Product, embedding: Option<Vec<f32>>) {
        let mut state = self.state.lock().await;
        state.products.insert(
            product.product_id.clone(),
            StoredProduct { product, embedding },
        );
    }

    /// All confirmed orders, in placement order.
    pub async fn orders(&self) -> Vec<Order> {
        self.state.lock().await.orders.clone()
    }

    /// Sum of all product inventories.
    pub async fn total_inventory(&self) -> i64 {
        self.state
            .lock()
            .await
            .products
            .values()
            .map(|p| i64::from(p.product.inventory))
            .sum()
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

/// Term-frequency stand-in for `ts_rank`: fraction of query terms present in
/// the product text, weighted toward the name.
fn text_rank(product: &Product, text: &str) -> f32 {
    let terms: Vec<String> = text
        .split_whitespace()
        .map(str::to_lowercase)
        .filter(|t| !t.is_empty())
        .collect();
    if terms.is_empty() {
        return 0.0;
    }
    let name = product.name.to_lowercase();
    let body = format!(
        "{} {}",
        product.brand.to_lowercase(),
        product.description.to_lowercase()
    );
    let mut score = 0.0_f32;
    for term in &terms {
        if name.contains(term.as_str()) {
            score += 2.0;
        }
        if body.contains(term.as_str()) {
            score += 1.0;
        }
    }
    #[allow(clippy::cast_precision_loss)]
    let denominator = 3.0 * terms.len() as f32;
    score / denominator
}

fn substring_match(product: &Product, text: &str) -> bool {
    let needle = text.to_lowercase();
    product.name.to_lowercase().contains(&needle)
        || product.description.to_lowercase().contains(&needle)
}

impl Catalog for MemoryCatalog {
    async fn product_by_id(&self, product_id: &str) -> Result<Option<Product>> {
        let state = self.state.lock().await;
        Ok(state.products.get(product_id).map(|p| p.product.clone()))
    }

    async fn lexical_search(&self, filters: &LexicalFilters, limit: usize) -> Result<LexicalHits> {
        let text = filters.text();
        let state = self.state.lock().await;

        let mut hits: Vec<RankedProduct> = state
            .products
            .values()
            .filter(|stored| filters.matches(&stored.product))
            .filter(|stored| text.is_empty() || substring_match(&stored.product, text))
            .map(|stored| RankedProduct {
                rank: if text.is_empty() {
                    0.0
                } else {
                    text_rank(&stored.product, text)
                },
                product: stored.product.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.rank
                .total_cmp(&a.rank)
                .then_with(|| a.product.product_id.cmp(&b.product.product_id))
        });
        hits.truncate(limit);

        Ok(LexicalHits {
            sql: LEXICAL_SQL.to_string(),
            hits,
        })
    }

    async fn semantic_candidates(
        &self,
        query_vector: &[f32],
        text: Option<&str>,
        k: usize,
    ) -> Result<CandidateSet> {
        let text = text.map(str::trim).filter(|t| !t.is_empty());
        let state = self.state.lock().await;

        let mut hits: Vec<CandidateProduct> = state
            .products
            .values()
            .filter_map(|stored| {
                let embedding = stored.embedding.as_ref()?;
                Some(CandidateProduct {
                    distance: cosine_distance(embedding, query_vector),
                    rank: text.map_or(0.0, |t| text_rank(&stored.product, t)),
                    product: stored.product.clone(),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.product.product_id.cmp(&b.product.product_id))
        });
        hits.truncate(k);

        Ok(CandidateSet {
            sql: SEMANTIC_SQL.to_string(),
            hits,
        })
    }

    async fn place_order(
        &self,
        customer_id: &str,
        items: &[OrderItemRequest],
        pricing: &PricingPolicy,
    ) -> Result<Order> {
        if items.is_empty() {
            return Err(StoreError::EmptyOrder);
        }

        let mut state = self.state.lock().await;

        // Validation passes in contract order: every row must exist before
        // any quantity is judged, and quantities before inventory. Nothing
        // mutates until every line clears.
        for item in items {
            if !state.products.contains_key(&item.product_id) {
                return Err(StoreError::NotFound {
                    product_id: item.product_id.clone(),
                });
            }
        }
        for item in items {
            if item.quantity < 1 {
                return Err(StoreError::InvalidQuantity {
                    product_id: item.product_id.clone(),
                    quantity: item.quantity,
                });
            }
        }
        let mut priced = Vec::with_capacity(items.len());
        for item in items {
            let stored =
                state
                    .products
                    .get(&item.product_id)
                    .ok_or_else(|| StoreError::NotFound {
                        product_id: item.product_id.clone(),
                    })?;
            if stored.product.inventory < item.quantity {
                return Err(StoreError::InsufficientInventory {
                    product_id: item.product_id.clone(),
                    requested: item.quantity,
                    available: stored.product.inventory,
                });
            }
            priced.push(OrderItem {
                product_id: item.product_id.clone(),
                size: item.size.clone(),
                quantity: item.quantity,
                unit_price: stored.product.price,
            });
        }

        let subtotal = round_money(
            priced
                .iter()
                .map(|i| i.unit_price * rust_decimal::Decimal::from(i.quantity))
                .sum(),
        );
        let tax = round_money(subtotal * pricing.tax_rate);
        let shipping = if subtotal >= pricing.free_shipping_threshold {
            rust_decimal::Decimal::ZERO
        } else {
            pricing.flat_shipping
        };
        let total = subtotal + tax + shipping;

        for item in items {
            if let Some(stored) = state.products.get_mut(&item.product_id) {
                stored.product.inventory -= item.quantity;
            }
        }

        let order = Order {
            order_id: uuid::Uuid::new_v4().to_string(),
            customer_id: customer_id.to_string(),
            items: priced,
            subtotal,
            tax,
            shipping,
            total,
            status: OrderStatus::Confirmed,
            created_at: Utc::now(),
        };
        state.orders.push(order.clone());
        Ok(order)
    }
}
