//! Order worker: price, reserve, and persist in one atomic step.

use std::sync::Arc;

use stride_store::{Catalog, Order, OrderItemRequest, PricingPolicy};
use stride_trace::{ActivityKind, ActivityRecorder, EventDraft};

use crate::error::{AgentError, Result};

pub const WORKER_NAME: &str = "order";

pub struct OrderWorker<C> {
    catalog: Arc<C>,
    pricing: PricingPolicy,
}

impl<C> Clone for OrderWorker<C> {
    fn clone(&self) -> Self {
        Self {
            catalog: Arc::clone(&self.catalog),
            pricing: self.pricing,
        }
    }
}

impl<C: Catalog> OrderWorker<C> {
    #[must_use]
    pub fn new(catalog: Arc<C>, pricing: PricingPolicy) -> Self {
        Self { catalog, pricing }
    }

    /// Place an order. The store owns line validation inside its
    /// transaction, in a fixed order: row existence, then quantity, then
    /// inventory. The transaction is all-or-nothing.
    ///
    /// # Errors
    ///
    /// Returns `MissingField`, `NotFound`, `InvalidQuantity`, or
    /// `InsufficientInventory` for business rejections, `StoreFailure`
    /// otherwise.
    pub async fn place(
        &self,
        recorder: &ActivityRecorder,
        customer_id: &str,
        items: &[OrderItemRequest],
    ) -> Result<Order> {
        if customer_id.is_empty() {
            return Err(AgentError::MissingField("customer_id"));
        }
        if items.is_empty() {
            return Err(AgentError::MissingField("items"));
        }

        recorder.record(
            EventDraft::new(ActivityKind::Inventory, "reserving inventory")
                .details(
                    items
                        .iter()
                        .map(|i| format!("{}x{}", i.product_id, i.quantity))
                        .collect::<Vec<_>>()
                        .join(", "),
                )
                .worker(WORKER_NAME),
        );

        let order = self
            .catalog
            .place_order(customer_id, items, &self.pricing)
            .await
            .map_err(AgentError::from)?;

        recorder.record(
            EventDraft::new(ActivityKind::Order, "order confirmed")
                .details(format!("{} total {}", order.order_id, order.total))
                .worker(WORKER_NAME),
        );
        Ok(order)
    }
}
