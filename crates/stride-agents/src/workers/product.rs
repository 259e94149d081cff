//! Product worker: detail lookup and inventory checks. Pure reads.

use std::sync::Arc;

use serde::Serialize;
use stride_store::{Catalog, Product};
use stride_trace::{ActivityKind, ActivityRecorder, EventDraft};

use crate::error::{AgentError, Result};

pub const WORKER_NAME: &str = "product";

#[derive(Debug, Clone, Serialize)]
pub struct InventoryCheck {
    pub in_stock: bool,
    pub units: i32,
    pub sizes_available: Vec<String>,
}

pub struct ProductWorker<C> {
    catalog: Arc<C>,
}

impl<C> Clone for ProductWorker<C> {
    fn clone(&self) -> Self {
        Self {
            catalog: Arc::clone(&self.catalog),
        }
    }
}

impl<C: Catalog> ProductWorker<C> {
    #[must_use]
    pub fn new(catalog: Arc<C>) -> Self {
        Self { catalog }
    }

    /// Full product record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown ids, store errors otherwise.
    pub async fn get_details(
        &self,
        recorder: &ActivityRecorder,
        product_id: &str,
    ) -> Result<Product> {
        recorder.record(
            EventDraft::new(ActivityKind::Database, "product lookup")
                .details(product_id.to_string())
                .worker(WORKER_NAME),
        );
        self.catalog
            .product_by_id(product_id)
            .await
            .map_err(AgentError::from)?
            .ok_or_else(|| AgentError::NotFound {
                product_id: product_id.to_string(),
            })
    }

    /// Stock check, optionally for one size. When the product carries sizes
    /// and a size is requested, being in stock also requires that size.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown ids, store errors otherwise.
    pub async fn check_inventory(
        &self,
        recorder: &ActivityRecorder,
        product_id: &str,
        size: Option<&str>,
    ) -> Result<InventoryCheck> {
        let product = self
            .catalog
            .product_by_id(product_id)
            .await
            .map_err(AgentError::from)?
            .ok_or_else(|| AgentError::NotFound {
                product_id: product_id.to_string(),
            })?;

        let size_ok = match size {
            Some(size) if !product.available_sizes.is_empty() => {
                product.available_sizes.iter().any(|s| s == size)
            }
            _ => true,
        };
        let check = InventoryCheck {
            in_stock: product.inventory > 0 && size_ok,
            units: product.inventory,
            sizes_available: product.available_sizes,
        };

        recorder.record(
            EventDraft::new(ActivityKind::Inventory, "inventory check")
                .details(format!(
                    "{product_id}: {} units, in_stock={}",
                    check.units, check.in_stock
                ))
                .worker(WORKER_NAME),
        );
        Ok(check)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use stride_store::{Category, MemoryCatalog};

    async fn fixture() -> (ProductWorker<MemoryCatalog>, ActivityRecorder) {
        let catalog = MemoryCatalog::new();
        catalog
            .insert(
                Product {
                    product_id: "run-1".into(),
                    name: "Aero Glide 3".into(),
                    brand: "Veloz".into(),
                    description: "Daily trainer".into(),
                    category: Category::RunningShoes,
                    price: dec!(129.99),
                    available_sizes: vec!["9".into(), "10".into()],
                    inventory: 3,
                    image_uri: String::new(),
                },
                None,
            )
            .await;
        catalog
            .insert(
                Product {
                    product_id: "fit-1".into(),
                    name: "Iron Set".into(),
                    brand: "CorePro".into(),
                    description: "Dumbbells".into(),
                    category: Category::FitnessEquipment,
                    price: dec!(219.00),
                    available_sizes: vec![],
                    inventory: 0,
                    image_uri: String::new(),
                },
                None,
            )
            .await;
        (
            ProductWorker::new(Arc::new(catalog)),
            ActivityRecorder::new("turn-test"),
        )
    }

    #[tokio::test]
    async fn details_for_known_product() {
        let (worker, recorder) = fixture().await;
        let product = worker.get_details(&recorder, "run-1").await.unwrap();
        assert_eq!(product.name, "Aero Glide 3");
        assert!(
            recorder
                .take()
                .iter()
                .any(|e| e.kind == ActivityKind::Database)
        );
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let (worker, recorder) = fixture().await;
        let err = worker.get_details(&recorder, "ghost").await.unwrap_err();
        assert!(matches!(err, AgentError::NotFound { product_id } if product_id == "ghost"));
    }

    #[tokio::test]
    async fn size_must_be_available_when_sized() {
        let (worker, recorder) = fixture().await;

        let check = worker
            .check_inventory(&recorder, "run-1", Some("9"))
            .await
            .unwrap();
        assert!(check.in_stock);
        assert_eq!(check.units, 3);

        let check = worker
            .check_inventory(&recorder, "run-1", Some("13"))
            .await
            .unwrap();
        assert!(!check.in_stock);
        assert_eq!(check.units, 3);
    }

    #[tokio::test]
    async fn unsized_products_ignore_requested_size() {
        let (worker, recorder) = fixture().await;
        let check = worker
            .check_inventory(&recorder, "fit-1", Some("XL"))
            .await
            .unwrap();
        // Out of stock because inventory is 0, not because of the size.
        assert!(!check.in_stock);
        assert!(check.sizes_available.is_empty());
    }
}
