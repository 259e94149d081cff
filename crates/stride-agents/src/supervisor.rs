//! Supervisor: drives the LLM oracle in a tool-calling loop over the three
//! workers, or dispatches through a fixed routing table in deterministic
//! mode.

use std::sync::Arc;

use serde_json::json;
use stride_llm::{ChatResponse, LlmProvider, Message, Role};
use stride_search::ScoredProduct;
use stride_store::{Catalog, Order, Product};
use stride_trace::{ActivityKind, ActivityRecorder, EventDraft};

use crate::error::{AgentError, Result};
use crate::registry::{Delegation, worker_tools};
use crate::workers::order::OrderWorker;
use crate::workers::product::{InventoryCheck, ProductWorker};
use crate::workers::search::{SearchResult, SearchWorker};

const SYSTEM_PROMPT: &str = "\
You are a shopping assistant for a sporting-goods catalog. You can search \
products, look up details and inventory, and place orders, but only through \
the delegate_search, delegate_product, and delegate_order tools. Use at most \
one tool per step. When you have what you need, answer the customer in one \
or two friendly sentences.";

/// Assembled outcome of one supervised turn.
#[derive(Debug, Clone)]
pub struct SupervisorResult {
    pub reply_text: String,
    pub products: Option<Vec<ScoredProduct>>,
    pub order: Option<Order>,
}

/// Keyword-routing entry for deterministic mode. An empty query in a search
/// delegation is replaced with the user's message at dispatch time.
#[derive(Debug, Clone)]
pub struct RoutingRule {
    pub keyword: String,
    pub delegation: Delegation,
}

enum WorkerOutput {
    Search(SearchResult),
    Product {
        product: Product,
        check: InventoryCheck,
    },
    Order(Order),
}

impl WorkerOutput {
    fn tool_json(&self) -> serde_json::Value {
        match self {
            Self::Search(result) => result.tool_json(),
            Self::Product { product, check } => json!({
                "product": product,
                "inventory": check,
            }),
            Self::Order(order) => json!({ "order": order }),
        }
    }

    fn result_title(&self) -> String {
        match self {
            Self::Search(result) => format!("{} products", result.products.len()),
            Self::Product { product, .. } => format!("details for {}", product.product_id),
            Self::Order(order) => format!("order {}", order.order_id),
        }
    }
}

pub struct Supervisor<C, P> {
    provider: Arc<P>,
    search: SearchWorker<C, P>,
    product: ProductWorker<C>,
    order: OrderWorker<C>,
    max_tool_calls: usize,
    routing: Option<Vec<RoutingRule>>,
}

impl<C: Catalog, P: LlmProvider> Supervisor<C, P> {
    #[must_use]
    pub fn new(
        provider: Arc<P>,
        search: SearchWorker<C, P>,
        product: ProductWorker<C>,
        order: OrderWorker<C>,
        max_tool_calls: usize,
    ) -> Self {
        Self {
            provider,
            search,
            product,
            order,
            max_tool_calls,
            routing: None,
        }
    }

    /// Deterministic mode: bypass the oracle and dispatch by keyword. The
    /// only way tests drive the end-to-end path without a live model.
    #[must_use]
    pub fn with_routing(mut self, rules: Vec<RoutingRule>) -> Self {
        self.routing = Some(rules);
        self
    }

    /// Run one supervised turn.
    ///
    /// # Errors
    ///
    /// Returns `LoopExhausted` when the oracle exceeds the tool-call bound;
    /// everything else folds into the result with an `error` event in the
    /// trace.
    pub async fn run(
        &self,
        recorder: &ActivityRecorder,
        message: &str,
        customer_id: Option<&str>,
    ) -> Result<SupervisorResult> {
        if self.routing.is_some() {
            self.run_deterministic(recorder, message, customer_id).await
        } else {
            self.run_oracle(recorder, message, customer_id).await
        }
    }

    async fn run_oracle(
        &self,
        recorder: &ActivityRecorder,
        message: &str,
        customer_id: Option<&str>,
    ) -> Result<SupervisorResult> {
        let tools = worker_tools();
        let mut messages = vec![
            Message::new(Role::System, SYSTEM_PROMPT),
            Message::new(Role::User, message),
        ];

        let mut products: Option<Vec<ScoredProduct>> = None;
        let mut order: Option<Order> = None;
        let mut tool_calls = 0_usize;
        let mut consecutive_errors = 0_u32;

        loop {
            recorder.record(
                EventDraft::new(ActivityKind::Reasoning, "consulting model")
                    .details(format!("tool calls so far: {tool_calls}")),
            );

            let response = match self.provider.chat_with_tools(&messages, &tools).await {
                Ok(response) => response,
                Err(e) => {
                    let err = AgentError::from(e);
                    recorder.record(
                        EventDraft::new(ActivityKind::Error, "model call failed")
                            .details(err.to_string()),
                    );
                    return Ok(SupervisorResult {
                        reply_text: err.user_message(),
                        products,
                        order,
                    });
                }
            };

            let call = match response {
                ChatResponse::Final(text) => {
                    return Ok(SupervisorResult {
                        reply_text: text,
                        products,
                        order,
                    });
                }
                ChatResponse::ToolUse(call) => call,
            };

            if tool_calls == self.max_tool_calls {
                return Err(AgentError::LoopExhausted {
                    limit: self.max_tool_calls,
                });
            }
            tool_calls += 1;

            recorder.record(
                EventDraft::new(ActivityKind::ToolCall, format!("model invoked {}", call.name))
                    .details(call.arguments.to_string()),
            );

            let outcome = match Delegation::from_tool_use(&call) {
                Ok(delegation) => self.dispatch(recorder, delegation, customer_id).await,
                Err(e) => Err(e),
            };

            match outcome {
                Ok(output) => {
                    consecutive_errors = 0;
                    recorder.record(
                        EventDraft::new(ActivityKind::Result, output.result_title()),
                    );
                    match &output {
                        WorkerOutput::Search(result) => {
                            products = Some(result.products.clone());
                        }
                        WorkerOutput::Order(placed) => order = Some(placed.clone()),
                        WorkerOutput::Product { .. } => {}
                    }
                    messages.push(Message::new(
                        Role::Assistant,
                        format!("[tool_call] {}({})", call.name, call.arguments),
                    ));
                    messages.push(Message::new(Role::Tool, output.tool_json().to_string()));
                }
                Err(e) => {
                    recorder.record(
                        EventDraft::new(ActivityKind::Error, format!("{} failed", call.name))
                            .details(e.to_string()),
                    );
                    consecutive_errors += 1;
                    if e.is_fatal() || consecutive_errors >= 2 {
                        tracing::warn!(error = %e, consecutive_errors, "ending turn");
                        return Ok(SupervisorResult {
                            reply_text: e.user_message(),
                            products,
                            order,
                        });
                    }
                    messages.push(Message::new(
                        Role::Assistant,
                        format!("[tool_call] {}({})", call.name, call.arguments),
                    ));
                    messages.push(Message::new(
                        Role::Tool,
                        json!({ "error": e.to_string() }).to_string(),
                    ));
                }
            }
        }
    }

    async fn run_deterministic(
        &self,
        recorder: &ActivityRecorder,
        message: &str,
        customer_id: Option<&str>,
    ) -> Result<SupervisorResult> {
        let lowered = message.to_lowercase();
        let delegation = self
            .routing
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find(|rule| lowered.contains(&rule.keyword.to_lowercase()))
            .map(|rule| rule.delegation.clone())
            .unwrap_or(Delegation::Search {
                query: String::new(),
                limit: 5,
            });

        // Search templates with an empty query take the user's message.
        let delegation = match delegation {
            Delegation::Search { query, limit } if query.is_empty() => Delegation::Search {
                query: message.to_string(),
                limit,
            },
            other => other,
        };

        match self.dispatch(recorder, delegation, customer_id).await {
            Ok(output) => {
                recorder.record(EventDraft::new(ActivityKind::Result, output.result_title()));
                Ok(match output {
                    WorkerOutput::Search(result) => SupervisorResult {
                        reply_text: result.message.clone(),
                        products: Some(result.products),
                        order: None,
                    },
                    WorkerOutput::Product { product, check } => SupervisorResult {
                        reply_text: format!(
                            "{} by {} is {} ({} in stock).",
                            product.name,
                            product.brand,
                            product.price,
                            check.units
                        ),
                        products: None,
                        order: None,
                    },
                    WorkerOutput::Order(order) => SupervisorResult {
                        reply_text: format!(
                            "Order {} confirmed. Your total is {}.",
                            order.order_id, order.total
                        ),
                        products: None,
                        order: Some(order),
                    },
                })
            }
            Err(e) => {
                recorder.record(
                    EventDraft::new(ActivityKind::Error, "delegation failed")
                        .details(e.to_string()),
                );
                Ok(SupervisorResult {
                    reply_text: e.user_message(),
                    products: None,
                    order: None,
                })
            }
        }
    }

    async fn dispatch(
        &self,
        recorder: &ActivityRecorder,
        delegation: Delegation,
        customer_id: Option<&str>,
    ) -> Result<WorkerOutput> {
        recorder.record(
            EventDraft::new(
                ActivityKind::Delegation,
                format!("delegating to {} worker", delegation.worker_name()),
            )
            .worker(delegation.worker_name()),
        );

        match delegation {
            Delegation::Search { query, limit } => self
                .search
                .text_search(recorder, &query, limit)
                .await
                .map(WorkerOutput::Search),
            Delegation::Product { product_id, size } => {
                let product = self.product.get_details(recorder, &product_id).await?;
                let check = self
                    .product
                    .check_inventory(recorder, &product_id, size.as_deref())
                    .await?;
                Ok(WorkerOutput::Product { product, check })
            }
            Delegation::Order {
                customer_id: requested,
                items,
            } => {
                let customer = if requested.is_empty() {
                    customer_id.unwrap_or_default().to_string()
                } else {
                    requested
                };
                self.order
                    .place(recorder, &customer, &items)
                    .await
                    .map(WorkerOutput::Order)
            }
        }
    }

    /// Visual search entry used when a turn carries image bytes; the tool
    /// catalog cannot ferry binary payloads through the model.
    ///
    /// # Errors
    ///
    /// See [`SearchWorker::image_search`].
    pub async fn run_image(
        &self,
        recorder: &ActivityRecorder,
        image: &[u8],
        limit: usize,
    ) -> Result<SupervisorResult> {
        recorder.record(
            EventDraft::new(ActivityKind::Delegation, "delegating to search worker")
                .worker("search"),
        );
        match self.search.image_search(recorder, image, limit).await {
            Ok(result) => {
                recorder.record(EventDraft::new(
                    ActivityKind::Result,
                    format!("{} products", result.products.len()),
                ));
                Ok(SupervisorResult {
                    reply_text: result.message.clone(),
                    products: Some(result.products),
                    order: None,
                })
            }
            Err(e) => {
                recorder.record(
                    EventDraft::new(ActivityKind::Error, "image search failed")
                        .details(e.to_string()),
                );
                Ok(SupervisorResult {
                    reply_text: e.user_message(),
                    products: None,
                    order: None,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use stride_llm::MockProvider;
    use stride_search::{HybridRetriever, RetrievalConfig};
    use stride_store::{Category, MemoryCatalog, PricingPolicy, Product};

    fn pricing() -> PricingPolicy {
        PricingPolicy {
            tax_rate: dec!(0.085),
            free_shipping_threshold: dec!(75.00),
            flat_shipping: dec!(7.99),
        }
    }

    async fn catalog() -> Arc<MemoryCatalog> {
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
                    available_sizes: vec!["9".into(), "10".into()],
                    inventory: 5,
                    image_uri: String::new(),
                },
                Some(vec![1.0, 0.0]),
            )
            .await;
        Arc::new(catalog)
    }

    async fn supervisor(provider: MockProvider) -> Supervisor<MemoryCatalog, MockProvider> {
        let catalog = catalog().await;
        let provider = Arc::new(provider);
        let retriever = Arc::new(
            HybridRetriever::new(Arc::clone(&catalog), RetrievalConfig::default()).unwrap(),
        );
        Supervisor::new(
            Arc::clone(&provider),
            SearchWorker::new(retriever, Arc::clone(&provider)),
            ProductWorker::new(Arc::clone(&catalog)),
            OrderWorker::new(catalog, pricing()),
            5,
        )
    }

    #[tokio::test]
    async fn oracle_search_then_final_answer() {
        let provider = MockProvider::with_tool_script(
            vec![(
                "delegate_search",
                serde_json::json!({"query": "running shoes", "limit": 5}),
            )],
            "The Aero Glide 3 looks perfect for you.",
        )
        .with_embedding(vec![1.0, 0.0]);

        let supervisor = supervisor(provider).await;
        let recorder = ActivityRecorder::new("t1");
        let result = supervisor
            .run(&recorder, "what running shoes do you have?", None)
            .await
            .unwrap();

        assert_eq!(result.reply_text, "The Aero Glide 3 looks perfect for you.");
        assert_eq!(result.products.unwrap().len(), 1);

        let trace = recorder.take();
        assert!(trace.iter().any(|e| e.kind == ActivityKind::Delegation));
        assert!(trace.iter().any(|e| e.kind == ActivityKind::Search));
        assert!(trace.iter().any(|e| e.kind == ActivityKind::Result));
    }

    #[tokio::test]
    async fn oracle_order_flow_places_order() {
        let provider = MockProvider::with_tool_script(
            vec![(
                "delegate_order",
                serde_json::json!({
                    "customer_id": "c7",
                    "items": [{"product_id": "run-1", "size": "9", "quantity": 1}]
                }),
            )],
            "Your order is confirmed!",
        );

        let supervisor = supervisor(provider).await;
        let recorder = ActivityRecorder::new("t2");
        let result = supervisor.run(&recorder, "buy it", Some("c7")).await.unwrap();

        let order = result.order.unwrap();
        assert_eq!(order.customer_id, "c7");
        assert_eq!(order.subtotal, dec!(129.99));
    }

    #[tokio::test]
    async fn loop_bound_is_enforced() {
        // Script six identical tool calls against a bound of five.
        let calls = (0..6)
            .map(|_| {
                (
                    "delegate_search",
                    serde_json::json!({"query": "running shoes"}),
                )
            })
            .collect();
        let provider =
            MockProvider::with_tool_script(calls, "never reached").with_embedding(vec![1.0, 0.0]);

        let supervisor = supervisor(provider).await;
        let recorder = ActivityRecorder::new("t3");
        let err = supervisor.run(&recorder, "shoes", None).await.unwrap_err();
        assert!(matches!(err, AgentError::LoopExhausted { limit: 5 }));
    }

    #[tokio::test]
    async fn second_consecutive_error_ends_the_turn() {
        let provider = MockProvider::with_tool_script(
            vec![
                ("delegate_product", serde_json::json!({"product_id": "ghost"})),
                ("delegate_product", serde_json::json!({"product_id": "wraith"})),
            ],
            "never reached",
        );

        let supervisor = supervisor(provider).await;
        let recorder = ActivityRecorder::new("t4");
        let result = supervisor.run(&recorder, "details", None).await.unwrap();
        assert_eq!(
            result.reply_text,
            "I couldn't find a product with id wraith."
        );

        let errors = recorder
            .take()
            .into_iter()
            .filter(|e| e.kind == ActivityKind::Error)
            .count();
        assert_eq!(errors, 2);
    }

    #[tokio::test]
    async fn one_error_then_recovery_continues() {
        let provider = MockProvider::with_tool_script(
            vec![
                ("delegate_product", serde_json::json!({"product_id": "ghost"})),
                (
                    "delegate_search",
                    serde_json::json!({"query": "running shoes"}),
                ),
            ],
            "Here's what we do have.",
        )
        .with_embedding(vec![1.0, 0.0]);

        let supervisor = supervisor(provider).await;
        let recorder = ActivityRecorder::new("t5");
        let result = supervisor.run(&recorder, "find ghost", None).await.unwrap();
        assert_eq!(result.reply_text, "Here's what we do have.");
        assert!(result.products.is_some());
    }

    #[tokio::test]
    async fn model_failure_yields_generic_apology() {
        let provider = MockProvider::failing();
        let supervisor = supervisor(provider).await;
        let recorder = ActivityRecorder::new("t6");
        let result = supervisor.run(&recorder, "hello", None).await.unwrap();
        assert_eq!(
            result.reply_text,
            "I couldn't complete that — please try again."
        );
        assert!(recorder.take().iter().any(|e| e.kind == ActivityKind::Error));
    }

    #[tokio::test]
    async fn deterministic_routing_skips_the_oracle() {
        // A failing chat provider proves the oracle is never consulted.
        let provider = MockProvider {
            fail_chat: true,
            ..MockProvider::default()
        }
        .with_embedding(vec![1.0, 0.0]);

        let supervisor = supervisor(provider).await.with_routing(vec![RoutingRule {
            keyword: "shoes".into(),
            delegation: Delegation::Search {
                query: String::new(),
                limit: 5,
            },
        }]);

        let recorder = ActivityRecorder::new("t7");
        let result = supervisor
            .run(&recorder, "running shoes", None)
            .await
            .unwrap();
        assert_eq!(result.products.unwrap().len(), 1);

        let trace = recorder.take();
        assert!(trace.iter().any(|e| e.kind == ActivityKind::Delegation));
        assert!(!trace.iter().any(|e| e.kind == ActivityKind::Reasoning));
    }
}
