use crate::catalog::{
    CandidateProduct, CandidateSet, Catalog, LexicalFilters, LexicalHits, OrderItemRequest,
    PricingPolicy, RankedProduct,
};
use crate::error::{Result, StoreError};
use crate::transport::{Row, SqlParam, StoreTransport};
use crate::types::{Category, Order, OrderItem, OrderStatus, Product};

const PRODUCT_COLUMNS: &str = "product_id, name, brand, description, category, price, \
                               available_sizes, inventory, image_uri";

/// Filtered full-text query, rank-ordered with a deterministic tie-break.
pub const LEXICAL_SQL: &str = "\
SELECT product_id, name, brand, description, category, price, available_sizes, inventory, image_uri,
       CASE WHEN $1::text IS NULL THEN 0::float4
            ELSE ts_rank(tsv, plainto_tsquery('english', $1)) END AS rank
FROM products
WHERE ($1::text IS NULL OR name ILIKE '%' || $1 || '%' OR description ILIKE '%' || $1 || '%')
  AND ($2::text IS NULL OR category = $2)
  AND ($3::text IS NULL OR brand ILIKE $3)
  AND ($4::numeric IS NULL OR price <= $4)
ORDER BY rank DESC, product_id ASC
LIMIT $5";

/// ANN candidates by cosine distance. Products without an embedding are
/// excluded; the per-candidate rank keeps lexically unmatched rows eligible
/// at rank 0.
pub const SEMANTIC_SQL: &str = "\
SELECT product_id, name, brand, description, category, price, available_sizes, inventory, image_uri,
       (embedding <=> $1)::float8 AS distance,
       CASE WHEN $2::text IS NULL THEN 0::float4
            ELSE ts_rank(tsv, plainto_tsquery('english', $2)) END AS rank
FROM products
WHERE embedding IS NOT NULL
ORDER BY embedding <=> $1, product_id ASC
LIMIT $3";

/// Atomic order placement. The locking CTE takes row locks in product-id
/// order; every later CTE is gated on `eligible.ok`, so either all
/// inventories are decremented and the order exists, or the statement
/// touches nothing and returns no rows.
const PLACE_ORDER_SQL: &str = "\
WITH req AS (
    SELECT product_id, size, quantity, ord
    FROM unnest($1::text[], $2::text[], $3::int[])
         WITH ORDINALITY AS r(product_id, size, quantity, ord)
),
locked AS (
    SELECT p.product_id, p.price, p.inventory, r.quantity, r.size, r.ord
    FROM products p
    JOIN req r USING (product_id)
    ORDER BY p.product_id
    FOR UPDATE OF p
),
eligible AS (
    SELECT count(*) = (SELECT count(*) FROM req)
           AND bool_and(quantity >= 1 AND inventory >= quantity) AS ok
    FROM locked
),
dec AS (
    UPDATE products p
    SET inventory = p.inventory - l.quantity
    FROM locked l
    WHERE p.product_id = l.product_id
      AND (SELECT ok FROM eligible)
    RETURNING p.product_id
),
totals AS (
    SELECT round(sum(l.price * l.quantity), 2) AS subtotal,
           round(round(sum(l.price * l.quantity), 2) * $4::numeric, 2) AS tax,
           CASE WHEN round(sum(l.price * l.quantity), 2) >= $5::numeric
                THEN 0::numeric ELSE $6::numeric END AS shipping
    FROM locked l
    WHERE (SELECT ok FROM eligible)
      AND (SELECT count(*) FROM dec) = (SELECT count(*) FROM req)
),
ord AS (
    INSERT INTO orders (order_id, customer_id, subtotal, tax, shipping, total, status)
    SELECT $7, $8, subtotal, tax, shipping, subtotal + tax + shipping, 'confirmed'
    FROM totals
    RETURNING order_id, customer_id, subtotal, tax, shipping, total, status, created_at
),
items AS (
    INSERT INTO order_items (order_id, seq, product_id, size, quantity, unit_price)
    SELECT o.order_id, l.ord::int, l.product_id, l.size, l.quantity, l.price
    FROM ord o, locked l
    RETURNING seq, product_id, size, quantity, unit_price
)
SELECT o.order_id, o.customer_id, o.subtotal, o.tax, o.shipping, o.total, o.status, o.created_at,
       i.seq, i.product_id, i.size, i.quantity, i.unit_price
FROM ord o JOIN items i ON TRUE
ORDER BY i.seq";

const DIAGNOSE_SQL: &str = "\
SELECT product_id, inventory FROM products WHERE product_id = ANY($1::text[])";

/// Catalog implementation over the one-operation SQL transport.
#[derive(Debug, Clone)]
pub struct SqlCatalog<T> {
    transport: T,
}

impl<T: StoreTransport> SqlCatalog<T> {
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn product_from_row(row: &Row) -> Result<Product> {
        let label = row.text("category")?;
        let category = Category::from_label(&label)
            .ok_or_else(|| StoreError::Decode(format!("unknown category {label}")))?;
        Ok(Product {
            product_id: row.text("product_id")?,
            name: row.text("name")?,
            brand: row.text("brand")?,
            description: row.text("description")?,
            category,
            price: row.decimal("price")?,
            available_sizes: row.text_array("available_sizes")?,
            inventory: i32::try_from(row.int("inventory")?)
                .map_err(|e| StoreError::Decode(e.to_string()))?,
            image_uri: row.text("image_uri")?,
        })
    }

    /// Work out why the order statement declined, against current state.
    /// Checks run in contract order: row existence for every item, then
    /// quantities, then inventory.
    async fn diagnose_order_failure(&self, items: &[OrderItemRequest]) -> StoreError {
        let ids: Vec<Option<String>> = items.iter().map(|i| Some(i.product_id.clone())).collect();
        let rows = match self
            .transport
            .execute(DIAGNOSE_SQL, &[SqlParam::TextArray(ids)])
            .await
        {
            Ok(rows) => rows,
            Err(e) => return e,
        };

        let inventory: std::collections::HashMap<String, i64> = rows
            .iter()
            .filter_map(|row| Some((row.text("product_id").ok()?, row.int("inventory").ok()?)))
            .collect();

        for item in items {
            if !inventory.contains_key(&item.product_id) {
                return StoreError::NotFound {
                    product_id: item.product_id.clone(),
                };
            }
        }
        for item in items {
            if item.quantity < 1 {
                return StoreError::InvalidQuantity {
                    product_id: item.product_id.clone(),
                    quantity: item.quantity,
                };
            }
        }
        for item in items {
            if let Some(&available) = inventory.get(&item.product_id)
                && available < i64::from(item.quantity)
            {
                return StoreError::InsufficientInventory {
                    product_id: item.product_id.clone(),
                    requested: item.quantity,
                    available: i32::try_from(available).unwrap_or(i32::MAX),
                };
            }
        }

        // Declined but current state looks fine: a competing order won the
        // race and its effects are no longer visible as a shortage.
        StoreError::Unavailable("order declined under concurrent load".into())
    }
}

// Quantity validation happens behind the row locks (and in the decline
// diagnosis), so an absent product always fails with not-found first.
fn validate_items(items: &[OrderItemRequest]) -> Result<()> {
    if items.is_empty() {
        return Err(StoreError::EmptyOrder);
    }
    Ok(())
}

impl<T: StoreTransport> Catalog for SqlCatalog<T> {
    async fn product_by_id(&self, product_id: &str) -> Result<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE product_id = $1");
        let rows = self
            .transport
            .execute(&sql, &[SqlParam::Text(Some(product_id.to_string()))])
            .await?;
        rows.first().map(Self::product_from_row).transpose()
    }

    async fn lexical_search(&self, filters: &LexicalFilters, limit: usize) -> Result<LexicalHits> {
        let text = filters.text();
        let params = [
            SqlParam::Text((!text.is_empty()).then(|| text.to_string())),
            SqlParam::Text(filters.category.map(|c| c.label().to_string())),
            SqlParam::Text(filters.brand.clone()),
            SqlParam::Decimal(filters.price_max),
            SqlParam::Int(Some(i64::try_from(limit).unwrap_or(i64::MAX))),
        ];

        let rows = self.transport.execute(LEXICAL_SQL, &params).await?;
        let hits = rows
            .iter()
            .map(|row| {
                Ok(RankedProduct {
                    product: Self::product_from_row(row)?,
                    #[allow(clippy::cast_possible_truncation)]
                    rank: row.float("rank")? as f32,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(hits = hits.len(), transport = self.transport.name(), "lexical search");
        Ok(LexicalHits {
            sql: LEXICAL_SQL.to_string(),
            hits,
        })
    }

    async fn semantic_candidates(
        &self,
        query_vector: &[f32],
        text: Option<&str>,
        k: usize,
    ) -> Result<CandidateSet> {
        let text = text.map(str::trim).filter(|t| !t.is_empty());
        let params = [
            SqlParam::Vector(query_vector.to_vec()),
            SqlParam::Text(text.map(String::from)),
            SqlParam::Int(Some(i64::try_from(k).unwrap_or(i64::MAX))),
        ];

        let rows = self.transport.execute(SEMANTIC_SQL, &params).await?;
        let hits = rows
            .iter()
            .map(|row| {
                Ok(CandidateProduct {
                    product: Self::product_from_row(row)?,
                    #[allow(clippy::cast_possible_truncation)]
                    distance: row.float("distance")? as f32,
                    #[allow(clippy::cast_possible_truncation)]
                    rank: row.float("rank")? as f32,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            candidates = hits.len(),
            transport = self.transport.name(),
            "semantic candidates"
        );
        Ok(CandidateSet {
            sql: SEMANTIC_SQL.to_string(),
            hits,
        })
    }

    async fn place_order(
        &self,
        customer_id: &str,
        items: &[OrderItemRequest],
        pricing: &PricingPolicy,
    ) -> Result<Order> {
        validate_items(items)?;

        let order_id = uuid::Uuid::new_v4().to_string();
        let ids: Vec<Option<String>> = items.iter().map(|i| Some(i.product_id.clone())).collect();
        let sizes: Vec<Option<String>> = items.iter().map(|i| i.size.clone()).collect();
        let quantities: Vec<i32> = items.iter().map(|i| i.quantity).collect();

        let params = [
            SqlParam::TextArray(ids),
            SqlParam::TextArray(sizes),
            SqlParam::IntArray(quantities),
            SqlParam::Decimal(Some(pricing.tax_rate)),
            SqlParam::Decimal(Some(pricing.free_shipping_threshold)),
            SqlParam::Decimal(Some(pricing.flat_shipping)),
            SqlParam::Text(Some(order_id.clone())),
            SqlParam::Text(Some(customer_id.to_string())),
        ];

        let rows = self.transport.execute(PLACE_ORDER_SQL, &params).await?;
        if rows.is_empty() {
            return Err(self.diagnose_order_failure(items).await);
        }

        let first = &rows[0];
        let status_label = first.text("status")?;
        let order_items = rows
            .iter()
            .map(|row| {
                Ok(OrderItem {
                    product_id: row.text("product_id")?,
                    size: row.opt_text("size")?,
                    quantity: i32::try_from(row.int("quantity")?)
                        .map_err(|e| StoreError::Decode(e.to_string()))?,
                    unit_price: row.decimal("unit_price")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let order = Order {
            order_id: first.text("order_id")?,
            customer_id: first.text("customer_id")?,
            items: order_items,
            subtotal: first.decimal("subtotal")?,
            tax: first.decimal("tax")?,
            shipping: first.decimal("shipping")?,
            total: first.decimal("total")?,
            status: OrderStatus::from_str_opt(&status_label)
                .ok_or_else(|| StoreError::Decode(format!("unknown status {status_label}")))?,
            created_at: first.timestamp("created_at")?,
        };

        tracing::info!(
            order_id = %order.order_id,
            items = order.items.len(),
            total = %order.total,
            "order confirmed"
        );
        Ok(order)
    }
}
