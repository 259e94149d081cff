use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Closed set of catalog departments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Running Shoes")]
    RunningShoes,
    #[serde(rename = "Training Shoes")]
    TrainingShoes,
    #[serde(rename = "Fitness Equipment")]
    FitnessEquipment,
    #[serde(rename = "Apparel")]
    Apparel,
    #[serde(rename = "Accessories")]
    Accessories,
    #[serde(rename = "Recovery")]
    Recovery,
}

impl Category {
    /// Declaration order matters: the query parser takes the first keyword hit.
    pub const ALL: [Category; 6] = [
        Self::RunningShoes,
        Self::TrainingShoes,
        Self::FitnessEquipment,
        Self::Apparel,
        Self::Accessories,
        Self::Recovery,
    ];

    /// Stored label, matching the `products.category` column.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::RunningShoes => "Running Shoes",
            Self::TrainingShoes => "Training Shoes",
            Self::FitnessEquipment => "Fitness Equipment",
            Self::Apparel => "Apparel",
            Self::Accessories => "Accessories",
            Self::Recovery => "Recovery",
        }
    }

    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.label() == label)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub product_id: String,
    pub name: String,
    pub brand: String,
    pub description: String,
    pub category: Category,
    pub price: Decimal,
    pub available_sizes: Vec<String>,
    pub inventory: i32,
    pub image_uri: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Failed,
}

impl OrderStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub customer_id: String,
    pub items: Vec<OrderItem>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}
