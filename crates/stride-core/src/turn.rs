//! Turn-level request and response types, matching the wire contract.

use serde::{Deserialize, Serialize};
use stride_search::ScoredProduct;
use stride_store::{Order, Product};
use stride_trace::ActivityEvent;

/// Execution phase of a turn. The behavior of each phase is stable under
/// substitution of the oracles and the store transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Phase {
    /// Direct: parser and lexical retrieval only.
    Direct,
    /// Mediated: same retrieval through the external tool server.
    Mediated,
    /// Agentic: supervisor loop with hybrid retrieval.
    Agentic,
}

impl Phase {
    #[must_use]
    pub fn number(self) -> u8 {
        match self {
            Self::Direct => 1,
            Self::Mediated => 2,
            Self::Agentic => 3,
        }
    }
}

impl TryFrom<u8> for Phase {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Direct),
            2 => Ok(Self::Mediated),
            3 => Ok(Self::Agentic),
            other => Err(format!("phase must be 1, 2, or 3, got {other}")),
        }
    }
}

impl From<Phase> for u8 {
    fn from(phase: Phase) -> Self {
        phase.number()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TurnRequest {
    pub phase: Phase,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub image_base64: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderRequest {
    pub product_id: String,
    #[serde(default)]
    pub size: Option<String>,
    pub quantity: i32,
    pub phase: Phase,
    #[serde(default)]
    pub customer_id: Option<String>,
}

/// Product as returned to the client, with the semantic similarity when the
/// hybrid path produced it.
#[derive(Debug, Clone, Serialize)]
pub struct ProductHit {
    #[serde(flatten)]
    pub product: Product,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
}

impl From<ScoredProduct> for ProductHit {
    fn from(scored: ScoredProduct) -> Self {
        Self {
            similarity: scored.semantic_score.map(|s| s.clamp(0.0, 1.0)),
            product: scored.product,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnResult {
    pub reply_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub products: Option<Vec<ProductHit>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<Order>,
    pub activity_trace: Vec<ActivityEvent>,
    pub follow_up_suggestions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_round_trips_through_numbers() {
        for (number, phase) in [(1, Phase::Direct), (2, Phase::Mediated), (3, Phase::Agentic)] {
            assert_eq!(Phase::try_from(number).unwrap(), phase);
            assert_eq!(phase.number(), number);
        }
        assert!(Phase::try_from(4).is_err());
    }

    #[test]
    fn turn_request_deserializes_from_wire_json() {
        let request: TurnRequest = serde_json::from_str(
            r#"{"phase": 3, "message": "running shoes", "customer_id": "c1"}"#,
        )
        .unwrap();
        assert_eq!(request.phase, Phase::Agentic);
        assert_eq!(request.message.as_deref(), Some("running shoes"));
        assert!(request.image_base64.is_none());
    }

    #[test]
    fn product_hit_flattens_product_fields() {
        use rust_decimal::Decimal;
        use stride_store::Category;

        let hit = ProductHit {
            product: Product {
                product_id: "p1".into(),
                name: "Aero Glide 3".into(),
                brand: "Veloz".into(),
                description: String::new(),
                category: Category::RunningShoes,
                price: Decimal::new(12999, 2),
                available_sizes: vec![],
                inventory: 3,
                image_uri: String::new(),
            },
            similarity: Some(0.92),
        };
        let json = serde_json::to_value(&hit).unwrap();
        assert_eq!(json["product_id"], "p1");
        assert_eq!(json["category"], "Running Shoes");
        assert!((json["similarity"].as_f64().unwrap() - 0.92).abs() < 1e-6);
    }
}
