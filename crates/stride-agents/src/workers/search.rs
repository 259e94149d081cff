//! Search worker: hybrid text and visual product search.

use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use stride_llm::LlmProvider;
use stride_search::{HybridRetriever, ParsedQuery, RetrievalMode, ScoredProduct, parse};
use stride_store::Catalog;
use stride_trace::{ActivityKind, ActivityRecorder, EventDraft};

use crate::error::{AgentError, Result};

pub const WORKER_NAME: &str = "search";

/// Ranked products plus a short human-readable summary. The supervisor is
/// free to replace the message.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub products: Vec<ScoredProduct>,
    pub message: String,
}

impl SearchResult {
    /// Compact JSON fed back to the model as tool output.
    #[must_use]
    pub fn tool_json(&self) -> serde_json::Value {
        json!({
            "message": self.message,
            "products": self.products.iter().map(|scored| json!({
                "product_id": scored.product.product_id,
                "name": scored.product.name,
                "brand": scored.product.brand,
                "category": scored.product.category,
                "price": scored.product.price,
                "similarity": scored.semantic_score,
            })).collect::<Vec<_>>(),
        })
    }
}

pub struct SearchWorker<C, P> {
    retriever: Arc<HybridRetriever<C>>,
    provider: Arc<P>,
}

impl<C, P> Clone for SearchWorker<C, P> {
    fn clone(&self) -> Self {
        Self {
            retriever: Arc::clone(&self.retriever),
            provider: Arc::clone(&self.provider),
        }
    }
}

impl<C: Catalog, P: LlmProvider> SearchWorker<C, P> {
    #[must_use]
    pub fn new(retriever: Arc<HybridRetriever<C>>, provider: Arc<P>) -> Self {
        Self {
            retriever,
            provider,
        }
    }

    /// Hybrid text search. An embedding failure downgrades to lexical-only
    /// retrieval instead of failing the turn.
    ///
    /// # Errors
    ///
    /// Returns a hard error only when the store itself fails.
    pub async fn text_search(
        &self,
        recorder: &ActivityRecorder,
        query: &str,
        limit: usize,
    ) -> Result<SearchResult> {
        let parsed = parse(query);
        let vector = self.embed_or_fall_back(recorder, query).await;
        self.run_retrieval(recorder, &parsed, vector.as_deref(), limit, query)
            .await
    }

    /// Visual search: the image embeds into the same space as text, and
    /// retrieval is semantic-only.
    ///
    /// # Errors
    ///
    /// Returns `EmbeddingFailure` when the image cannot be embedded; with no
    /// query text there is no lexical path to fall back to.
    pub async fn image_search(
        &self,
        recorder: &ActivityRecorder,
        image: &[u8],
        limit: usize,
    ) -> Result<SearchResult> {
        if image.is_empty() {
            return Err(AgentError::BadImage("empty image payload".into()));
        }

        let started = Instant::now();
        let vector = match self.provider.embed_image(image).await {
            Ok(vector) => vector,
            Err(e) => {
                recorder.record(
                    EventDraft::new(ActivityKind::Error, "image embedding failed")
                        .details(e.to_string())
                        .worker(WORKER_NAME),
                );
                return Err(AgentError::EmbeddingFailure(e.to_string()));
            }
        };
        recorder.record(
            EventDraft::new(ActivityKind::Embedding, "embedded image")
                .latency_ms(elapsed_ms(started))
                .worker(WORKER_NAME),
        );

        self.run_retrieval(
            recorder,
            &ParsedQuery::default(),
            Some(&vector),
            limit,
            "your image",
        )
        .await
    }

    async fn embed_or_fall_back(
        &self,
        recorder: &ActivityRecorder,
        query: &str,
    ) -> Option<Vec<f32>> {
        let started = Instant::now();
        match self.provider.embed(query).await {
            Ok(vector) => {
                recorder.record(
                    EventDraft::new(ActivityKind::Embedding, "embedded query")
                        .details(format!("{} dimensions", vector.len()))
                        .latency_ms(elapsed_ms(started))
                        .worker(WORKER_NAME),
                );
                Some(vector)
            }
            Err(e) => {
                tracing::warn!(error = %e, "embedding failed, falling back to lexical search");
                recorder.record(
                    EventDraft::new(ActivityKind::Error, "embedding failed")
                        .details(format!("falling back to lexical search: {e}"))
                        .worker(WORKER_NAME),
                );
                None
            }
        }
    }

    async fn run_retrieval(
        &self,
        recorder: &ActivityRecorder,
        parsed: &ParsedQuery,
        vector: Option<&[f32]>,
        limit: usize,
        display_query: &str,
    ) -> Result<SearchResult> {
        let started = Instant::now();
        let outcome = self.retriever.retrieve(parsed, vector, limit).await?;

        let mode = match outcome.mode {
            RetrievalMode::Lexical => "lexical",
            RetrievalMode::Hybrid => "hybrid",
        };
        recorder.record(
            EventDraft::new(ActivityKind::Search, format!("{mode} search"))
                .sql(outcome.sql.clone())
                .latency_ms(elapsed_ms(started))
                .worker(WORKER_NAME),
        );
        recorder.record(
            EventDraft::new(
                ActivityKind::Result,
                format!("{} products", outcome.products.len()),
            )
            .worker(WORKER_NAME),
        );

        let message = if outcome.products.is_empty() {
            format!("I couldn't find anything matching \"{display_query}\". Try a broader search.")
        } else {
            format!(
                "Found {} option{} for \"{display_query}\".",
                outcome.products.len(),
                if outcome.products.len() == 1 { "" } else { "s" }
            )
        };

        Ok(SearchResult {
            products: outcome.products,
            message,
        })
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use stride_llm::MockProvider;
    use stride_search::RetrievalConfig;
    use stride_store::{Category, MemoryCatalog, Product};

    async fn worker_with(
        provider: MockProvider,
    ) -> (SearchWorker<MemoryCatalog, MockProvider>, ActivityRecorder) {
        let catalog = MemoryCatalog::new();
        catalog
            .insert(
                Product {
                    product_id: "run-1".into(),
                    name: "Aero Glide 3".into(),
                    brand: "Veloz".into(),
                    description: "Cushioned neutral road running shoe".into(),
                    category: Category::RunningShoes,
                    price: dec!(129.99),
                    available_sizes: vec!["9".into()],
                    inventory: 10,
                    image_uri: String::new(),
                },
                Some(vec![1.0, 0.0]),
            )
            .await;
        let retriever =
            HybridRetriever::new(Arc::new(catalog), RetrievalConfig::default()).unwrap();
        let worker = SearchWorker::new(Arc::new(retriever), Arc::new(provider));
        (worker, ActivityRecorder::new("turn-test"))
    }

    #[tokio::test]
    async fn text_search_records_embedding_then_search() {
        let provider = MockProvider::default().with_embedding(vec![1.0, 0.0]);
        let (worker, recorder) = worker_with(provider).await;

        let result = worker
            .text_search(&recorder, "running shoes", 5)
            .await
            .unwrap();
        assert_eq!(result.products.len(), 1);

        let trace = recorder.take();
        let kinds: Vec<ActivityKind> = trace.iter().map(|e| e.kind).collect();
        let embedding_at = kinds
            .iter()
            .position(|k| *k == ActivityKind::Embedding)
            .unwrap();
        let search_at = kinds.iter().position(|k| *k == ActivityKind::Search).unwrap();
        assert!(embedding_at < search_at);
        assert!(kinds.contains(&ActivityKind::Result));
        let search_event = &trace[search_at];
        assert!(search_event.sql_text.as_deref().unwrap().contains("embedding"));
    }

    #[tokio::test]
    async fn embedding_failure_falls_back_to_lexical() {
        let provider = MockProvider::failing_embeddings();
        let (worker, recorder) = worker_with(provider).await;

        let result = worker
            .text_search(&recorder, "running shoes", 5)
            .await
            .unwrap();
        // The lexical path still finds the fixture by category.
        assert_eq!(result.products.len(), 1);
        assert!(result.products[0].semantic_score.is_none());

        let trace = recorder.take();
        let error_at = trace
            .iter()
            .position(|e| e.kind == ActivityKind::Error && e.title.contains("embedding"))
            .unwrap();
        let search_at = trace
            .iter()
            .position(|e| e.kind == ActivityKind::Search)
            .unwrap();
        assert!(error_at < search_at);
    }

    #[tokio::test]
    async fn image_search_is_semantic_only() {
        let provider = MockProvider::default().with_embedding(vec![1.0, 0.0]);
        let (worker, recorder) = worker_with(provider).await;

        let result = worker.image_search(&recorder, &[0xFF, 0xD8], 5).await.unwrap();
        assert_eq!(result.products.len(), 1);
        for scored in &result.products {
            assert!((scored.lexical_score - 0.0).abs() < f32::EPSILON);
        }
        drop(recorder.take());
    }

    #[tokio::test]
    async fn image_embedding_failure_is_an_error() {
        let provider = MockProvider::failing_embeddings();
        let (worker, recorder) = worker_with(provider).await;

        let err = worker
            .image_search(&recorder, &[0xFF, 0xD8], 5)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::EmbeddingFailure(_)));

        let empty = worker.image_search(&recorder, &[], 5).await.unwrap_err();
        assert!(matches!(empty, AgentError::BadImage(_)));
    }

    #[tokio::test]
    async fn tool_json_is_compact() {
        let provider = MockProvider::default().with_embedding(vec![1.0, 0.0]);
        let (worker, recorder) = worker_with(provider).await;
        let result = worker
            .text_search(&recorder, "running shoes", 5)
            .await
            .unwrap();

        let payload = result.tool_json();
        assert_eq!(payload["products"][0]["product_id"], "run-1");
        assert!(payload["products"][0].get("description").is_none());
    }
}
