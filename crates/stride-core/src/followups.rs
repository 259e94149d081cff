//! Follow-up suggestions: a small deterministic function of the result
//! shape, never the model.

use stride_store::{Category, Order};

use crate::turn::ProductHit;

/// Three related-category queries for a search that found products, two
/// broadening suggestions for one that did not, nothing for an order.
#[must_use]
pub fn follow_ups(products: Option<&[ProductHit]>, order: Option<&Order>) -> Vec<String> {
    if order.is_some() {
        return Vec::new();
    }
    match products {
        Some([]) => vec![
            "Browse running shoes".to_string(),
            "Show me what's new in fitness equipment".to_string(),
        ],
        Some(hits) => related_queries(hits[0].product.category),
        None => Vec::new(),
    }
}

fn related_queries(category: Category) -> Vec<String> {
    let related: [&str; 3] = match category {
        Category::RunningShoes => [
            "Training shoes for the gym",
            "Running apparel",
            "Recovery gear for runners",
        ],
        Category::TrainingShoes => [
            "Running shoes for the road",
            "Fitness equipment for home workouts",
            "Workout apparel",
        ],
        Category::FitnessEquipment => [
            "Training shoes for lifting",
            "Recovery tools",
            "Workout accessories",
        ],
        Category::Apparel => [
            "Running shoes to match",
            "Workout accessories",
            "Compression recovery wear",
        ],
        Category::Accessories => [
            "Running apparel",
            "Fitness equipment",
            "Recovery gear",
        ],
        Category::Recovery => [
            "Foam rollers and massage tools",
            "Running shoes with extra cushion",
            "Compression apparel",
        ],
    };
    related.into_iter().map(String::from).collect()
}
