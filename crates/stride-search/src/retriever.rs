//! Hybrid retrieval: dense similarity blended with full-text rank.

use std::sync::Arc;

use stride_store::{Catalog, Product};

use crate::error::{Result, SearchError};
use crate::parser::ParsedQuery;

/// Retrieval weights and candidate sizing, resolved once at construction.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalConfig {
    pub semantic_weight: f32,
    pub lexical_weight: f32,
    pub candidate_multiplier: usize,
    pub candidate_minimum: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            semantic_weight: 0.7,
            lexical_weight: 0.3,
            candidate_multiplier: 4,
            candidate_minimum: 50,
        }
    }
}

impl RetrievalConfig {
    /// # Errors
    ///
    /// Rejects weights that do not sum to 1.0 and degenerate candidate sizing.
    pub fn validate(&self) -> Result<()> {
        if (self.semantic_weight + self.lexical_weight - 1.0).abs() > 1e-6 {
            return Err(SearchError::InvalidConfig(format!(
                "weights must sum to 1.0, got {} + {}",
                self.semantic_weight, self.lexical_weight
            )));
        }
        if self.semantic_weight < 0.0 || self.lexical_weight < 0.0 {
            return Err(SearchError::InvalidConfig("weights must be non-negative".into()));
        }
        if self.candidate_multiplier < 1 {
            return Err(SearchError::InvalidConfig(
                "candidate_multiplier must be at least 1".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn candidate_count(&self, limit: usize) -> usize {
        (self.candidate_multiplier * limit).max(self.candidate_minimum)
    }
}

/// Which code path produced a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalMode {
    Lexical,
    Hybrid,
}

/// One ranked product. `semantic_score` is present only on the hybrid path.
#[derive(Debug, Clone)]
pub struct ScoredProduct {
    pub product: Product,
    pub score: f32,
    pub semantic_score: Option<f32>,
    pub lexical_score: f32,
}

/// Ranked result set plus the statement that produced it, for the trace.
#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
    pub products: Vec<ScoredProduct>,
    pub sql: String,
    pub mode: RetrievalMode,
}

pub struct HybridRetriever<C> {
    catalog: Arc<C>,
    config: RetrievalConfig,
}

impl<C: Catalog> HybridRetriever<C> {
    /// # Errors
    ///
    /// Returns `InvalidConfig` when the configuration is rejected.
    pub fn new(catalog: Arc<C>, config: RetrievalConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { catalog, config })
    }

    #[must_use]
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Rank products for a parsed query.
    ///
    /// Without a query vector this is pure lexical retrieval; with one, ANN
    /// candidates are blended with normalized full-text rank. Filters from
    /// the parsed query are hard constraints either way.
    ///
    /// # Errors
    ///
    /// Returns `RetrieverUnavailable` when the store cannot be reached.
    pub async fn retrieve(
        &self,
        query: &ParsedQuery,
        query_vector: Option<&[f32]>,
        limit: usize,
    ) -> Result<RetrievalOutcome> {
        match query_vector {
            None => self.retrieve_lexical(query, limit).await,
            Some(vector) => self.retrieve_hybrid(query, vector, limit).await,
        }
    }

    async fn retrieve_lexical(&self, query: &ParsedQuery, limit: usize) -> Result<RetrievalOutcome> {
        let filters = query.filters();
        let result = self.catalog.lexical_search(&filters, limit).await?;

        let max_rank = result
            .hits
            .iter()
            .map(|h| h.rank)
            .fold(0.0_f32, f32::max);

        let mut products: Vec<ScoredProduct> = result
            .hits
            .into_iter()
            .map(|hit| {
                let lexical = normalize_rank(hit.rank, max_rank);
                ScoredProduct {
                    product: hit.product,
                    score: lexical,
                    semantic_score: None,
                    lexical_score: lexical,
                }
            })
            .collect();

        // The store already ranks, but the ordering contract is ours to keep.
        products.sort_by(|a, b| {
            b.lexical_score
                .total_cmp(&a.lexical_score)
                .then_with(|| a.product.product_id.cmp(&b.product.product_id))
        });
        products.truncate(limit);

        tracing::debug!(results = products.len(), "lexical retrieval");
        Ok(RetrievalOutcome {
            products,
            sql: result.sql,
            mode: RetrievalMode::Lexical,
        })
    }

    async fn retrieve_hybrid(
        &self,
        query: &ParsedQuery,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<RetrievalOutcome> {
        let filters = query.filters();
        let text = query.cleaned_text.trim();
        let text = (!text.is_empty()).then_some(text);

        let k = self.config.candidate_count(limit);
        let candidates = self
            .catalog
            .semantic_candidates(query_vector, text, k)
            .await?;

        let max_rank = candidates
            .hits
            .iter()
            .map(|c| c.rank)
            .fold(0.0_f32, f32::max);

        let mut products: Vec<ScoredProduct> = candidates
            .hits
            .into_iter()
            .filter(|c| filters.matches(&c.product))
            .map(|c| {
                let semantic = (1.0 - c.distance).clamp(0.0, 1.0);
                let lexical = normalize_rank(c.rank, max_rank);
                ScoredProduct {
                    score: self.config.semantic_weight * semantic
                        + self.config.lexical_weight * lexical,
                    semantic_score: Some(semantic),
                    lexical_score: lexical,
                    product: c.product,
                }
            })
            .collect();

        products.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| {
                    b.semantic_score
                        .unwrap_or(0.0)
                        .total_cmp(&a.semantic_score.unwrap_or(0.0))
                })
                .then_with(|| a.product.product_id.cmp(&b.product.product_id))
        });
        products.truncate(limit);

        tracing::debug!(
            candidates = k,
            results = products.len(),
            "hybrid retrieval"
        );
        Ok(RetrievalOutcome {
            products,
            sql: candidates.sql,
            mode: RetrievalMode::Hybrid,
        })
    }
}

/// Map the maximum observed rank in a candidate set to 1.0; zero everywhere
/// when nothing matched lexically.
fn normalize_rank(rank: f32, max_rank: f32) -> f32 {
    if max_rank > 0.0 && rank.is_finite() {
        (rank / max_rank).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use stride_store::{Category, MemoryCatalog};

    use crate::parser::parse;

    fn product(
        product_id: &str,
        name: &str,
        description: &str,
        category: Category,
        price: Decimal,
    ) -> Product {
        Product {
            product_id: product_id.into(),
            name: name.into(),
            brand: "Veloz".into(),
            description: description.into(),
            category,
            price,
            available_sizes: vec!["9".into()],
            inventory: 10,
            image_uri: String::new(),
        }
    }

    async fn fixture_catalog() -> Arc<MemoryCatalog> {
        let catalog = MemoryCatalog::new();
        catalog
            .insert(
                product(
                    "run-1",
                    "Aero Glide 3",
                    "Cushioned neutral road running shoe",
                    Category::RunningShoes,
                    dec!(129.99),
                ),
                Some(vec![1.0, 0.0, 0.0]),
            )
            .await;
        catalog
            .insert(
                product(
                    "run-2",
                    "Tempo Rush",
                    "Lightweight racing shoe for speed work",
                    Category::RunningShoes,
                    dec!(159.99),
                ),
                Some(vec![0.9, 0.1, 0.0]),
            )
            .await;
        catalog
            .insert(
                product(
                    "rec-1",
                    "Deep Knead Roller",
                    "High density foam roller",
                    Category::Recovery,
                    dec!(34.99),
                ),
                Some(vec![0.0, 1.0, 0.0]),
            )
            .await;
        catalog
            .insert(
                product(
                    "fit-1",
                    "Iron Set 20kg",
                    "Adjustable dumbbell pair",
                    Category::FitnessEquipment,
                    dec!(219.00),
                ),
                None,
            )
            .await;
        Arc::new(catalog)
    }

    fn retriever(catalog: Arc<MemoryCatalog>) -> HybridRetriever<MemoryCatalog> {
        HybridRetriever::new(catalog, RetrievalConfig::default()).unwrap()
    }

    #[test]
    fn config_rejects_bad_weights() {
        let config = RetrievalConfig {
            semantic_weight: 0.8,
            lexical_weight: 0.3,
            ..RetrievalConfig::default()
        };
        assert!(config.validate().is_err());

        let config = RetrievalConfig {
            candidate_multiplier: 0,
            ..RetrievalConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn candidate_count_has_a_floor() {
        let config = RetrievalConfig::default();
        assert_eq!(config.candidate_count(5), 50);
        assert_eq!(config.candidate_count(20), 80);
    }

    #[tokio::test]
    async fn lexical_mode_without_vector() {
        let retriever = retriever(fixture_catalog().await);
        let outcome = retriever
            .retrieve(&parse("running shoes"), None, 5)
            .await
            .unwrap();

        assert_eq!(outcome.mode, RetrievalMode::Lexical);
        assert_eq!(outcome.products.len(), 2);
        for scored in &outcome.products {
            assert_eq!(scored.product.category, Category::RunningShoes);
            assert!(scored.semantic_score.is_none());
        }
    }

    #[tokio::test]
    async fn hybrid_mode_ranks_by_blended_score() {
        let retriever = retriever(fixture_catalog().await);
        let outcome = retriever
            .retrieve(&parse("cushioned"), Some(&[1.0, 0.0, 0.0]), 3)
            .await
            .unwrap();

        assert_eq!(outcome.mode, RetrievalMode::Hybrid);
        assert!(!outcome.products.is_empty());
        // run-1 matches both semantically and lexically, so it leads.
        assert_eq!(outcome.products[0].product.product_id, "run-1");
        for scored in &outcome.products {
            let semantic = scored.semantic_score.unwrap();
            assert!((0.0..=1.0).contains(&semantic));
            assert!((0.0..=1.0).contains(&scored.lexical_score));
            assert!((0.0..=1.0).contains(&scored.score));
        }
    }

    #[tokio::test]
    async fn empty_text_orders_by_semantic_alone() {
        let retriever = retriever(fixture_catalog().await);
        let outcome = retriever
            .retrieve(&ParsedQuery::default(), Some(&[0.0, 1.0, 0.0]), 3)
            .await
            .unwrap();

        assert_eq!(outcome.products[0].product.product_id, "rec-1");
        for scored in &outcome.products {
            assert!((scored.lexical_score - 0.0).abs() < f32::EPSILON);
        }
    }

    #[tokio::test]
    async fn products_without_embedding_are_excluded_from_hybrid() {
        let retriever = retriever(fixture_catalog().await);
        let outcome = retriever
            .retrieve(&ParsedQuery::default(), Some(&[1.0, 0.0, 0.0]), 10)
            .await
            .unwrap();
        assert!(
            outcome
                .products
                .iter()
                .all(|s| s.product.product_id != "fit-1")
        );
    }

    #[tokio::test]
    async fn price_filter_is_hard_in_hybrid_mode() {
        let retriever = retriever(fixture_catalog().await);
        let outcome = retriever
            .retrieve(&parse("running shoes under $150"), Some(&[1.0, 0.0, 0.0]), 5)
            .await
            .unwrap();

        assert!(!outcome.products.is_empty());
        for scored in &outcome.products {
            assert!(scored.product.price <= dec!(150));
            assert_eq!(scored.product.category, Category::RunningShoes);
        }
    }

    #[tokio::test]
    async fn no_lexical_match_keeps_candidates_eligible() {
        let retriever = retriever(fixture_catalog().await);
        // "zirconium" matches nothing lexically; semantic ordering decides.
        let parsed = ParsedQuery {
            cleaned_text: "zirconium".into(),
            ..ParsedQuery::default()
        };
        let outcome = retriever
            .retrieve(&parsed, Some(&[1.0, 0.0, 0.0]), 3)
            .await
            .unwrap();

        assert!(!outcome.products.is_empty());
        assert_eq!(outcome.products[0].product.product_id, "run-1");
        for scored in &outcome.products {
            assert!((scored.lexical_score - 0.0).abs() < f32::EPSILON);
        }
    }

    #[tokio::test]
    async fn empty_candidate_set_is_not_an_error() {
        let retriever = retriever(Arc::new(MemoryCatalog::new()));
        let outcome = retriever
            .retrieve(&parse("anything"), Some(&[1.0, 0.0]), 5)
            .await
            .unwrap();
        assert!(outcome.products.is_empty());
    }
}
