//! Turn orchestrator: the single entry point that drives a turn through its
//! phase and always returns a successful result, folding internal failures
//! into the activity trace.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use stride_agents::{
    AgentError, OrderWorker, ProductWorker, RoutingRule, SearchWorker, Supervisor,
};
use stride_llm::LlmProvider;
use stride_search::{HybridRetriever, ScoredProduct, parse};
use stride_store::{Catalog, Order, OrderItemRequest};
use stride_trace::{ActivityKind, ActivityRecorder, ActivitySink, EventDraft};

use crate::config::Config;
use crate::followups::follow_ups;
use crate::turn::{OrderRequest, Phase, ProductHit, TurnRequest, TurnResult};

const DEFAULT_SEARCH_LIMIT: usize = 5;
const GENERIC_APOLOGY: &str = "I couldn't complete that — please try again.";

pub struct Orchestrator<C, P> {
    config: Config,
    direct: Arc<C>,
    mediated: Option<Arc<C>>,
    provider: Arc<P>,
    retriever_direct: Arc<HybridRetriever<C>>,
    retriever_mediated: Option<Arc<HybridRetriever<C>>>,
    routing: Option<Vec<RoutingRule>>,
}

impl<C: Catalog, P: LlmProvider> Orchestrator<C, P> {
    /// Wire the orchestrator. Retrieval weights are resolved here, once.
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration is invalid.
    pub fn new(
        config: Config,
        direct: Arc<C>,
        mediated: Option<Arc<C>>,
        provider: Arc<P>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let retrieval = config.retrieval_config();
        let retriever_direct = Arc::new(
            HybridRetriever::new(Arc::clone(&direct), retrieval)
                .map_err(|e| anyhow::anyhow!(e.to_string()))?,
        );
        let retriever_mediated = mediated
            .as_ref()
            .map(|catalog| {
                HybridRetriever::new(Arc::clone(catalog), retrieval)
                    .map(Arc::new)
                    .map_err(|e| anyhow::anyhow!(e.to_string()))
            })
            .transpose()?;

        Ok(Self {
            config,
            direct,
            mediated,
            provider,
            retriever_direct,
            retriever_mediated,
            routing: None,
        })
    }

    /// Fixed keyword routing for the supervisor: deterministic mode.
    #[must_use]
    pub fn with_routing(mut self, rules: Vec<RoutingRule>) -> Self {
        self.routing = Some(rules);
        self
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handle one conversational turn.
    pub async fn handle_turn(&self, request: TurnRequest) -> TurnResult {
        self.handle_turn_streaming(request, None).await
    }

    /// Handle one turn, pushing each activity event to `sink` as it is
    /// recorded.
    pub async fn handle_turn_streaming(
        &self,
        request: TurnRequest,
        sink: Option<ActivitySink>,
    ) -> TurnResult {
        let turn_id = uuid::Uuid::new_v4().to_string();
        let mut recorder = ActivityRecorder::new(&turn_id);
        if let Some(sink) = sink {
            recorder = recorder.with_sink(sink);
        }

        tracing::info!(turn_id = %turn_id, phase = request.phase.number(), "turn started");

        let deadline = self.config.turn_deadline();
        let outcome = tokio::time::timeout(deadline, self.run_turn(&recorder, &request)).await;
        let (reply_text, products, order) = match outcome {
            Ok(result) => result,
            Err(_) => {
                recorder.record(
                    EventDraft::new(ActivityKind::Error, "turn deadline exceeded").details(
                        AgentError::TurnTimeout {
                            ms: self.config.turn_deadline_ms,
                        }
                        .to_string(),
                    ),
                );
                (GENERIC_APOLOGY.to_string(), None, None)
            }
        };

        let products: Option<Vec<ProductHit>> =
            products.map(|hits| hits.into_iter().map(ProductHit::from).collect());
        let follow_up_suggestions = follow_ups(products.as_deref(), order.as_ref());

        TurnResult {
            reply_text,
            products,
            order,
            activity_trace: recorder.take(),
            follow_up_suggestions,
        }
    }

    async fn run_turn(
        &self,
        recorder: &ActivityRecorder,
        request: &TurnRequest,
    ) -> (String, Option<Vec<ScoredProduct>>, Option<Order>) {
        match request.phase {
            Phase::Direct => self.run_retrieval_phase(recorder, request, false).await,
            Phase::Mediated => self.run_retrieval_phase(recorder, request, true).await,
            Phase::Agentic => self.run_agentic(recorder, request).await,
        }
    }

    /// Phases 1 and 2: parser plus lexical-only retrieval, no oracle, no
    /// supervisor. Phase 2 differs only in the transport the catalog speaks.
    async fn run_retrieval_phase(
        &self,
        recorder: &ActivityRecorder,
        request: &TurnRequest,
        mediated: bool,
    ) -> (String, Option<Vec<ScoredProduct>>, Option<Order>) {
        let Some(message) = request.message.as_deref().filter(|m| !m.trim().is_empty()) else {
            return (
                "Tell me what you're looking for and I'll search the catalog.".to_string(),
                None,
                None,
            );
        };

        let retriever = if mediated {
            match &self.retriever_mediated {
                Some(retriever) => {
                    recorder.record(
                        EventDraft::new(ActivityKind::Mcp, "querying through tool server")
                            .details("connect + run_query"),
                    );
                    retriever
                }
                None => {
                    recorder.record(
                        EventDraft::new(ActivityKind::Mcp, "tool server not configured")
                            .details("falling back to the direct transport"),
                    );
                    &self.retriever_direct
                }
            }
        } else {
            &self.retriever_direct
        };

        let parsed = parse(message);
        recorder.record(
            EventDraft::new(ActivityKind::Database, "catalog query")
                .details(format!("filters: {parsed:?}")),
        );

        let started = std::time::Instant::now();
        match retriever.retrieve(&parsed, None, DEFAULT_SEARCH_LIMIT).await {
            Ok(outcome) => {
                recorder.record(
                    EventDraft::new(ActivityKind::Search, "lexical search")
                        .sql(outcome.sql.clone())
                        .latency_ms(
                            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                        ),
                );
                recorder.record(EventDraft::new(
                    ActivityKind::Result,
                    format!("{} products", outcome.products.len()),
                ));

                let reply = if outcome.products.is_empty() {
                    format!(
                        "I couldn't find anything matching \"{message}\". Try a broader search."
                    )
                } else {
                    format!(
                        "Found {} option{} for \"{message}\".",
                        outcome.products.len(),
                        if outcome.products.len() == 1 { "" } else { "s" }
                    )
                };
                (reply, Some(outcome.products), None)
            }
            Err(e) => {
                let err = AgentError::from(e);
                recorder.record(
                    EventDraft::new(ActivityKind::Error, "retrieval failed")
                        .details(err.to_string()),
                );
                (err.user_message(), None, None)
            }
        }
    }

    async fn run_agentic(
        &self,
        recorder: &ActivityRecorder,
        request: &TurnRequest,
    ) -> (String, Option<Vec<ScoredProduct>>, Option<Order>) {
        let supervisor = self.build_supervisor();

        if let Some(image_base64) = request.image_base64.as_deref() {
            let image = match BASE64.decode(image_base64) {
                Ok(bytes) => bytes,
                Err(e) => {
                    let err = AgentError::BadImage(e.to_string());
                    recorder.record(
                        EventDraft::new(ActivityKind::Error, "image decode failed")
                            .details(err.to_string()),
                    );
                    return (err.user_message(), None, None);
                }
            };
            return match supervisor
                .run_image(recorder, &image, DEFAULT_SEARCH_LIMIT)
                .await
            {
                Ok(result) => (result.reply_text, result.products, result.order),
                Err(e) => {
                    recorder.record(
                        EventDraft::new(ActivityKind::Error, "image turn failed")
                            .details(e.to_string()),
                    );
                    (e.user_message(), None, None)
                }
            };
        }

        let Some(message) = request.message.as_deref().filter(|m| !m.trim().is_empty()) else {
            return (
                "Tell me what you're looking for and I'll search the catalog.".to_string(),
                None,
                None,
            );
        };

        match supervisor
            .run(recorder, message, request.customer_id.as_deref())
            .await
        {
            Ok(result) => (result.reply_text, result.products, result.order),
            Err(e) => {
                recorder.record(
                    EventDraft::new(ActivityKind::Error, "supervisor failed")
                        .details(e.to_string()),
                );
                (e.user_message(), None, None)
            }
        }
    }

    fn build_supervisor(&self) -> Supervisor<C, P> {
        let search = SearchWorker::new(
            Arc::clone(&self.retriever_direct),
            Arc::clone(&self.provider),
        );
        let product = ProductWorker::new(Arc::clone(&self.direct));
        let order = OrderWorker::new(Arc::clone(&self.direct), self.config.pricing_policy());
        let supervisor = Supervisor::new(
            Arc::clone(&self.provider),
            search,
            product,
            order,
            self.config.max_tool_calls,
        );
        match &self.routing {
            Some(rules) => supervisor.with_routing(rules.clone()),
            None => supervisor,
        }
    }

    /// Order RPC: drive the order worker directly, no supervisor loop.
    pub async fn place_order(&self, request: OrderRequest) -> TurnResult {
        let turn_id = uuid::Uuid::new_v4().to_string();
        let recorder = ActivityRecorder::new(&turn_id);

        let catalog = match request.phase {
            Phase::Mediated => self.mediated.as_ref().unwrap_or(&self.direct),
            Phase::Direct | Phase::Agentic => &self.direct,
        };
        let worker = OrderWorker::new(Arc::clone(catalog), self.config.pricing_policy());

        let items = [OrderItemRequest {
            product_id: request.product_id.clone(),
            size: request.size.clone(),
            quantity: request.quantity,
        }];
        let customer = request.customer_id.as_deref().unwrap_or("guest");

        let (reply_text, order) = match worker.place(&recorder, customer, &items).await {
            Ok(order) => (
                format!(
                    "Order {} confirmed. Your total is {}.",
                    order.order_id, order.total
                ),
                Some(order),
            ),
            Err(e) => {
                recorder.record(
                    EventDraft::new(ActivityKind::Error, "order failed").details(e.to_string()),
                );
                (e.user_message(), None)
            }
        };

        TurnResult {
            reply_text,
            products: None,
            order,
            activity_trace: recorder.take(),
            follow_up_suggestions: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use stride_llm::MockProvider;
    use stride_store::{Category, MemoryCatalog, Product};

    async fn fixture_catalog() -> Arc<MemoryCatalog> {
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
                    inventory: 4,
                    image_uri: String::new(),
                },
                Some(vec![1.0, 0.0]),
            )
            .await;
        Arc::new(catalog)
    }

    fn orchestrator(
        catalog: Arc<MemoryCatalog>,
        provider: MockProvider,
    ) -> Orchestrator<MemoryCatalog, MockProvider> {
        Orchestrator::new(
            Config::default(),
            Arc::clone(&catalog),
            Some(catalog),
            Arc::new(provider),
        )
        .unwrap()
    }

    fn turn(phase: Phase, message: &str) -> TurnRequest {
        TurnRequest {
            phase,
            message: Some(message.to_string()),
            image_base64: None,
            customer_id: None,
            conversation_id: None,
        }
    }

    #[tokio::test]
    async fn phase_one_stays_lexical() {
        let orchestrator = orchestrator(fixture_catalog().await, MockProvider::failing());
        let result = orchestrator
            .handle_turn(turn(Phase::Direct, "running shoes"))
            .await;

        assert_eq!(result.products.as_ref().unwrap().len(), 1);
        let kinds: Vec<ActivityKind> = result.activity_trace.iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&ActivityKind::Database));
        assert!(!kinds.contains(&ActivityKind::Embedding));
        assert!(!kinds.contains(&ActivityKind::Delegation));
        assert_eq!(result.follow_up_suggestions.len(), 3);
    }

    #[tokio::test]
    async fn phase_two_records_mediation() {
        let orchestrator = orchestrator(fixture_catalog().await, MockProvider::failing());
        let result = orchestrator
            .handle_turn(turn(Phase::Mediated, "running shoes"))
            .await;

        assert_eq!(result.products.as_ref().unwrap().len(), 1);
        assert!(
            result
                .activity_trace
                .iter()
                .any(|e| e.kind == ActivityKind::Mcp)
        );
    }

    #[tokio::test]
    async fn no_match_reply_explains_itself() {
        let orchestrator = orchestrator(fixture_catalog().await, MockProvider::failing());
        let result = orchestrator
            .handle_turn(turn(Phase::Direct, "gear for my first marathon"))
            .await;

        assert!(result.products.as_ref().unwrap().is_empty());
        assert!(result.reply_text.contains("couldn't find"));
        let searches = result
            .activity_trace
            .iter()
            .filter(|e| e.kind == ActivityKind::Search)
            .count();
        assert_eq!(searches, 1);
        assert_eq!(result.follow_up_suggestions.len(), 2);
    }

    #[tokio::test]
    async fn trace_is_ordered() {
        let orchestrator = orchestrator(fixture_catalog().await, MockProvider::failing());
        let result = orchestrator
            .handle_turn(turn(Phase::Direct, "running shoes"))
            .await;

        for pair in result.activity_trace.windows(2) {
            assert!(pair[0].id < pair[1].id);
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[tokio::test]
    async fn turn_deadline_folds_into_the_trace() {
        let catalog = fixture_catalog().await;
        let provider = MockProvider::default()
            .with_embedding(vec![1.0, 0.0])
            .with_delay(250);
        let config = Config {
            turn_deadline_ms: 50,
            ..Config::default()
        };
        let orchestrator =
            Orchestrator::new(config, Arc::clone(&catalog), None, Arc::new(provider)).unwrap();

        let result = orchestrator
            .handle_turn(turn(Phase::Agentic, "running shoes"))
            .await;
        assert_eq!(result.reply_text, GENERIC_APOLOGY);
        assert!(
            result
                .activity_trace
                .iter()
                .any(|e| e.kind == ActivityKind::Error && e.title.contains("deadline"))
        );
    }

    #[tokio::test]
    async fn order_rpc_confirms_and_decrements() {
        let catalog = fixture_catalog().await;
        let orchestrator = orchestrator(Arc::clone(&catalog), MockProvider::failing());

        let result = orchestrator
            .place_order(OrderRequest {
                product_id: "run-1".into(),
                size: Some("9".into()),
                quantity: 1,
                phase: Phase::Direct,
                customer_id: Some("c1".into()),
            })
            .await;

        let order = result.order.unwrap();
        assert_eq!(order.total, dec!(141.04));
        assert!(result.follow_up_suggestions.is_empty());
        assert_eq!(
            catalog.product_by_id("run-1").await.unwrap().unwrap().inventory,
            3
        );
    }

    #[tokio::test]
    async fn missing_message_asks_for_one() {
        let orchestrator = orchestrator(fixture_catalog().await, MockProvider::failing());
        let result = orchestrator
            .handle_turn(TurnRequest {
                phase: Phase::Direct,
                message: None,
                image_base64: None,
                customer_id: None,
                conversation_id: None,
            })
            .await;
        assert!(result.reply_text.contains("Tell me"));
        assert!(result.products.is_none());
    }

    #[tokio::test]
    async fn streaming_sink_sees_events_live() {
        let orchestrator = orchestrator(fixture_catalog().await, MockProvider::failing());
        let (tx, mut rx) = stride_trace::activity_channel();
        let result = orchestrator
            .handle_turn_streaming(turn(Phase::Direct, "running shoes"), Some(tx))
            .await;

        let mut streamed = Vec::new();
        while let Ok(event) = rx.try_recv() {
            streamed.push(event);
        }
        assert_eq!(streamed.len(), result.activity_trace.len());
        assert_eq!(streamed[0].turn_id, result.activity_trace[0].turn_id);
    }
}
