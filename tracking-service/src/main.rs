use std::sync::Arc;

use anyhow::Result;
use tracking_service::{api, config::AppConfig, metrics_server, observability, registry};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let registry = registry::build_registry(&cfg).await?;
    tracing::info!(meters = registry.entity_ids().len(), "meters ready");

    api::serve(&cfg.api.bind_addr, Arc::new(registry)).await
}
