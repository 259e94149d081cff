//! Design-level schema for the catalog store. Applied by `stride init-db`;
//! provisioning and seeding live outside this repository.

use crate::error::Result;
use crate::transport::StoreTransport;

/// Embedding column width; must match `embedding_dim` in configuration.
pub const EMBEDDING_DIM: usize = 1024;

/// Statements applied in order. `vector` requires the pgvector extension.
#[must_use]
pub fn schema_statements(embedding_dim: usize) -> Vec<String> {
    vec![
        "CREATE EXTENSION IF NOT EXISTS vector".to_string(),
        format!(
            "CREATE TABLE IF NOT EXISTS products (\n\
             \x20   product_id      TEXT PRIMARY KEY,\n\
             \x20   name            TEXT NOT NULL,\n\
             \x20   brand           TEXT NOT NULL,\n\
             \x20   description     TEXT NOT NULL,\n\
             \x20   category        TEXT NOT NULL,\n\
             \x20   price           NUMERIC(10, 2) NOT NULL CHECK (price >= 0),\n\
             \x20   available_sizes TEXT[] NOT NULL DEFAULT '{{}}',\n\
             \x20   inventory       INT NOT NULL DEFAULT 0 CHECK (inventory >= 0),\n\
             \x20   image_uri       TEXT NOT NULL DEFAULT '',\n\
             \x20   embedding       vector({embedding_dim}),\n\
             \x20   tsv             tsvector GENERATED ALWAYS AS (\n\
             \x20       to_tsvector('english', name || ' ' || brand || ' ' || description)\n\
             \x20   ) STORED\n\
             )"
        ),
        "CREATE INDEX IF NOT EXISTS products_embedding_idx ON products \
         USING hnsw (embedding vector_cosine_ops)"
            .to_string(),
        "CREATE INDEX IF NOT EXISTS products_tsv_idx ON products USING gin (tsv)".to_string(),
        "CREATE TABLE IF NOT EXISTS orders (\n\
         \x20   order_id    TEXT PRIMARY KEY,\n\
         \x20   customer_id TEXT NOT NULL,\n\
         \x20   subtotal    NUMERIC(10, 2) NOT NULL CHECK (subtotal >= 0),\n\
         \x20   tax         NUMERIC(10, 2) NOT NULL CHECK (tax >= 0),\n\
         \x20   shipping    NUMERIC(10, 2) NOT NULL CHECK (shipping >= 0),\n\
         \x20   total       NUMERIC(10, 2) NOT NULL CHECK (total >= 0),\n\
         \x20   status      TEXT NOT NULL,\n\
         \x20   created_at  TIMESTAMPTZ NOT NULL DEFAULT now()\n\
         )"
        .to_string(),
        "CREATE TABLE IF NOT EXISTS order_items (\n\
         \x20   order_id   TEXT NOT NULL REFERENCES orders(order_id),\n\
         \x20   seq        INT NOT NULL,\n\
         \x20   product_id TEXT NOT NULL REFERENCES products(product_id),\n\
         \x20   size       TEXT,\n\
         \x20   quantity   INT NOT NULL CHECK (quantity >= 1),\n\
         \x20   unit_price NUMERIC(10, 2) NOT NULL CHECK (unit_price >= 0),\n\
         \x20   PRIMARY KEY (order_id, seq)\n\
         )"
        .to_string(),
    ]
}

/// Apply the schema through a transport.
///
/// # Errors
///
/// Returns the first statement failure.
pub async fn ensure_schema<T: StoreTransport>(transport: &T, embedding_dim: usize) -> Result<()> {
    for statement in schema_statements(embedding_dim) {
        transport.execute(&statement, &[]).await?;
        tracing::debug!(
            statement = statement.lines().next().unwrap_or(""),
            "schema statement applied"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn products_ddl_embeds_requested_dimension() {
        let statements = schema_statements(512);
        let products = statements
            .iter()
            .find(|s| s.contains("CREATE TABLE IF NOT EXISTS products"))
            .unwrap();
        assert!(products.contains("vector(512)"));
        assert!(products.contains("tsvector"));
    }

    #[test]
    fn schema_creates_both_indexes() {
        let statements = schema_statements(EMBEDDING_DIM);
        assert!(
            statements
                .iter()
                .any(|s| s.contains("vector_cosine_ops"))
        );
        assert!(statements.iter().any(|s| s.contains("USING gin (tsv)")));
    }
}
