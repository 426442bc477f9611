use anyhow::{anyhow, bail, Result};
use tracking_client::domain::Datapoint;
use tracking_service::{
    config::AppConfig,
    observability,
    pipeline::Pipeline,
    registry,
    sinks::MeterReadingsSink,
    sources::ReadingsFileSource,
    transform,
};
use std::{env, sync::Arc};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        bail!("usage: import_readings <entity_id> <csv_or_ndjson_file_path>");
    }
    let entity_id = &args[1];
    let file_path = &args[2];

    // Same configuration as the service; point TRACKING_CONFIG elsewhere if needed.
    let cfg = AppConfig::load()?;
    let registry = registry::build_registry(&cfg).await?;
    let meter = registry.get(entity_id).ok_or_else(|| {
        anyhow!(
            "unknown meter {entity_id}; configured meters: {}",
            registry.entity_ids().join(", ")
        )
    })?;

    let pipeline: Pipeline<_, Datapoint, _> = Pipeline {
        source: ReadingsFileSource::from_path(file_path),
        transforms: vec![Arc::new(transform::ReadingValidation)],
        sink: MeterReadingsSink::new(meter),
    };

    let summary = pipeline.run().await?;
    if summary.failed_upstream > 0 {
        bail!(
            "{} of the readings in {file_path} could not be imported",
            summary.failed_upstream
        );
    }

    Ok(())
}
