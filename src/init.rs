use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use stride_core::{Config, Orchestrator};
use stride_llm::HttpProvider;
use stride_store::schema::ensure_schema;
use stride_store::{AnyTransport, DirectTransport, MediatedTransport, SqlCatalog};

/// Concrete orchestrator wiring used by the CLI.
pub(crate) type AppOrchestrator = Orchestrator<SqlCatalog<AnyTransport>, HttpProvider>;

/// Connect the store, construct the oracles, and wire the orchestrator.
pub(crate) async fn build_orchestrator(config: Config) -> anyhow::Result<AppOrchestrator> {
    let transport = DirectTransport::connect(&config.database.url, config.database.max_connections)
        .await
        .context("failed to connect to the catalog database")?
        .with_deadline(config.call_deadline());
    let direct = Arc::new(SqlCatalog::new(AnyTransport::Direct(transport)));

    let mediated = config.mediated.as_ref().map(|mediated| {
        Arc::new(SqlCatalog::new(AnyTransport::Mediated(
            MediatedTransport::new(mediated.base_url.clone()).with_deadline(config.call_deadline()),
        )))
    });

    let provider = Arc::new(HttpProvider::new(
        config.llm.api_key.clone().unwrap_or_default(),
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        config.llm.embedding_model.clone(),
        config.call_deadline(),
    ));

    tracing::info!(
        model = %config.llm.model,
        transport = config.store_transport.as_str(),
        "orchestrator ready"
    );
    Orchestrator::new(config, direct, mediated, provider)
}

/// Apply the design-level schema to the configured database.
pub(crate) async fn init_db(config: &Config) -> anyhow::Result<()> {
    let transport = DirectTransport::connect(&config.database.url, config.database.max_connections)
        .await
        .context("failed to connect to the catalog database")?;
    ensure_schema(&transport, config.embedding_dim)
        .await
        .context("failed to apply schema")?;
    Ok(())
}

/// Read an image file and encode it for the turn request.
pub(crate) fn read_image_base64(path: &Path) -> anyhow::Result<String> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read image {}", path.display()))?;
    Ok(BASE64.encode(bytes))
}
