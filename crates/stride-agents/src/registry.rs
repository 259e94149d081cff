//! Explicit tool registry: the supervisor's catalog is the closed set of
//! three delegations, one per worker.

use schemars::JsonSchema;
use serde::Deserialize;
use stride_llm::{ToolDefinition, ToolUse};
use stride_store::OrderItemRequest;

use crate::error::AgentError;

pub const DELEGATE_SEARCH: &str = "delegate_search";
pub const DELEGATE_PRODUCT: &str = "delegate_product";
pub const DELEGATE_ORDER: &str = "delegate_order";

const DEFAULT_SEARCH_LIMIT: usize = 5;

#[derive(Debug, Deserialize, JsonSchema)]
struct SearchArgs {
    /// Natural-language product query.
    query: String,
    /// Maximum number of results.
    limit: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ProductArgs {
    product_id: String,
    /// Size to check availability for.
    size: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct OrderItemArgs {
    product_id: String,
    size: Option<String>,
    quantity: i32,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct OrderArgs {
    customer_id: String,
    items: Vec<OrderItemArgs>,
}

/// Typed closed catalog of supervisor delegations.
#[derive(Debug, Clone, PartialEq)]
pub enum Delegation {
    Search {
        query: String,
        limit: usize,
    },
    Product {
        product_id: String,
        size: Option<String>,
    },
    Order {
        customer_id: String,
        items: Vec<OrderItemRequest>,
    },
}

impl Delegation {
    /// Worker name used in delegation activity events.
    #[must_use]
    pub fn worker_name(&self) -> &'static str {
        match self {
            Self::Search { .. } => "search",
            Self::Product { .. } => "product",
            Self::Order { .. } => "order",
        }
    }

    /// Decode a model tool invocation into a typed delegation.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTool` for names outside the catalog and
    /// `BadToolArguments` when the arguments do not match the schema.
    pub fn from_tool_use(call: &ToolUse) -> Result<Self, AgentError> {
        let bad_args = |e: serde_json::Error| AgentError::BadToolArguments {
            tool: call.name.clone(),
            reason: e.to_string(),
        };
        match call.name.as_str() {
            DELEGATE_SEARCH => {
                let args: SearchArgs =
                    serde_json::from_value(call.arguments.clone()).map_err(bad_args)?;
                Ok(Self::Search {
                    query: args.query,
                    limit: args.limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
                })
            }
            DELEGATE_PRODUCT => {
                let args: ProductArgs =
                    serde_json::from_value(call.arguments.clone()).map_err(bad_args)?;
                Ok(Self::Product {
                    product_id: args.product_id,
                    size: args.size,
                })
            }
            DELEGATE_ORDER => {
                let args: OrderArgs =
                    serde_json::from_value(call.arguments.clone()).map_err(bad_args)?;
                Ok(Self::Order {
                    customer_id: args.customer_id,
                    items: args
                        .items
                        .into_iter()
                        .map(|i| OrderItemRequest {
                            product_id: i.product_id,
                            size: i.size,
                            quantity: i.quantity,
                        })
                        .collect(),
                })
            }
            other => Err(AgentError::UnknownTool(other.to_string())),
        }
    }
}

fn schema_value<T: JsonSchema>() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or(serde_json::Value::Null)
}

/// The full catalog the supervisor advertises to the model.
#[must_use]
pub fn worker_tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: DELEGATE_SEARCH,
            description: "Search the product catalog with a natural-language query. \
                          Returns ranked products.",
            input_schema: schema_value::<SearchArgs>(),
        },
        ToolDefinition {
            name: DELEGATE_PRODUCT,
            description: "Look up one product's details and check its inventory, \
                          optionally for a specific size.",
            input_schema: schema_value::<ProductArgs>(),
        },
        ToolDefinition {
            name: DELEGATE_ORDER,
            description: "Place an order for one or more products, reserving inventory \
                          and computing the total.",
            input_schema: schema_value::<OrderArgs>(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_use(name: &str, arguments: serde_json::Value) -> ToolUse {
        ToolUse {
            id: "call_0".into(),
            name: name.into(),
            arguments,
        }
    }

    #[test]
    fn search_delegation_defaults_limit() {
        let call = tool_use(DELEGATE_SEARCH, serde_json::json!({"query": "trail shoes"}));
        let delegation = Delegation::from_tool_use(&call).unwrap();
        assert_eq!(
            delegation,
            Delegation::Search {
                query: "trail shoes".into(),
                limit: 5
            }
        );
        assert_eq!(delegation.worker_name(), "search");
    }

    #[test]
    fn order_delegation_carries_items() {
        let call = tool_use(
            DELEGATE_ORDER,
            serde_json::json!({
                "customer_id": "c42",
                "items": [{"product_id": "p1", "size": "10", "quantity": 2}]
            }),
        );
        let delegation = Delegation::from_tool_use(&call).unwrap();
        match delegation {
            Delegation::Order { customer_id, items } => {
                assert_eq!(customer_id, "c42");
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].quantity, 2);
            }
            other => panic!("unexpected delegation {other:?}"),
        }
    }

    #[test]
    fn unknown_tool_is_rejected() {
        let call = tool_use("delegate_payments", serde_json::json!({}));
        assert!(matches!(
            Delegation::from_tool_use(&call),
            Err(AgentError::UnknownTool(name)) if name == "delegate_payments"
        ));
    }

    #[test]
    fn malformed_arguments_are_rejected() {
        let call = tool_use(DELEGATE_SEARCH, serde_json::json!({"q": "typo"}));
        assert!(matches!(
            Delegation::from_tool_use(&call),
            Err(AgentError::BadToolArguments { .. })
        ));
    }

    #[test]
    fn catalog_has_exactly_three_tools() {
        let tools = worker_tools();
        let names: Vec<_> = tools.iter().map(|t| t.name).collect();
        assert_eq!(names, vec![DELEGATE_SEARCH, DELEGATE_PRODUCT, DELEGATE_ORDER]);
        for tool in &tools {
            assert!(tool.input_schema.is_object());
        }
    }
}
