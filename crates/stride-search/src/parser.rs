//! Free-form query parsing into structured filters.
//!
//! Parsing is pure and deterministic; unknown tokens stay in the cleaned
//! text, and nothing here can fail.

use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use serde::Serialize;
use stride_store::{Category, LexicalFilters};

/// Keyword table, consulted in declaration order; the first hit wins.
const CATEGORY_KEYWORDS: [(Category, &[&str]); 6] = [
    (
        Category::RunningShoes,
        &["running shoes", "running shoe", "road running", "jogging"],
    ),
    (
        Category::TrainingShoes,
        &[
            "training shoes",
            "training shoe",
            "trainers",
            "cross-training",
            "gym shoes",
        ],
    ),
    (
        Category::FitnessEquipment,
        &[
            "fitness equipment",
            "dumbbell",
            "dumbbells",
            "kettlebell",
            "treadmill",
            "exercise bike",
            "weights",
        ],
    ),
    (
        Category::Apparel,
        &[
            "apparel", "shirt", "shorts", "leggings", "tights", "jacket", "clothing",
        ],
    ),
    (
        Category::Accessories,
        &[
            "accessories",
            "water bottle",
            "socks",
            "gloves",
            "hat",
            "bag",
        ],
    ),
    (
        Category::Recovery,
        &[
            "recovery",
            "foam roller",
            "massage gun",
            "compression sleeve",
        ],
    ),
];

/// Brands the parser recognizes, lowercase.
pub const KNOWN_BRANDS: [&str; 6] = [
    "veloz",
    "apex",
    "trailforge",
    "corepro",
    "flexline",
    "cascadia",
];

static PRICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:under|below)\s*\$?\s*(\d+(?:\.\d{1,2})?)").expect("price pattern is valid")
});

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedQuery {
    pub cleaned_text: String,
    pub category: Option<Category>,
    pub brand: Option<String>,
    pub price_max: Option<Decimal>,
}

impl ParsedQuery {
    /// Hard constraints for the retrieval paths.
    #[must_use]
    pub fn filters(&self) -> LexicalFilters {
        LexicalFilters {
            text: (!self.cleaned_text.is_empty()).then(|| self.cleaned_text.clone()),
            category: self.category,
            brand: self.brand.clone(),
            price_max: self.price_max,
        }
    }
}

/// Locate `needle` in `haystack` at word boundaries.
fn find_whole_word(haystack: &str, needle: &str) -> Option<(usize, usize)> {
    let mut from = 0;
    while let Some(offset) = haystack[from..].find(needle) {
        let start = from + offset;
        let end = start + needle.len();
        let left_ok = start == 0
            || !haystack[..start]
                .chars()
                .next_back()
                .is_some_and(char::is_alphanumeric);
        let right_ok = end == haystack.len()
            || !haystack[end..].chars().next().is_some_and(char::is_alphanumeric);
        if left_ok && right_ok {
            return Some((start, end));
        }
        from = end;
    }
    None
}

fn remove_span(text: &mut String, start: usize, end: usize) {
    text.replace_range(start..end, " ");
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract `{keywords, category, brand, price_max}` from a raw query.
#[must_use]
pub fn parse(raw: &str) -> ParsedQuery {
    let mut text = raw.trim().to_lowercase();
    if text.len() >= 2
        && (text.starts_with('"') && text.ends_with('"')
            || text.starts_with('\'') && text.ends_with('\''))
    {
        text = text[1..text.len() - 1].trim().to_string();
    }

    let mut price_max = None;
    if let Some(captures) = PRICE_RE.captures(&text)
        && let (Some(whole), Some(amount)) = (captures.get(0), captures.get(1))
    {
        if let Ok(price) = amount.as_str().parse::<Decimal>() {
            price_max = Some(price);
        }
        let span = whole.range();
        remove_span(&mut text, span.start, span.end);
    }

    let mut category = None;
    'categories: for (candidate, keywords) in CATEGORY_KEYWORDS {
        for keyword in keywords {
            if let Some((start, end)) = find_whole_word(&text, keyword) {
                category = Some(candidate);
                remove_span(&mut text, start, end);
                break 'categories;
            }
        }
    }

    let mut brand = None;
    for candidate in KNOWN_BRANDS {
        if let Some((start, end)) = find_whole_word(&text, candidate) {
            brand = Some(candidate.to_string());
            remove_span(&mut text, start, end);
            break;
        }
    }

    ParsedQuery {
        cleaned_text: collapse_whitespace(&text),
        category,
        brand,
        price_max,
    }
}
