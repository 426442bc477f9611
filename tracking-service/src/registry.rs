use std::{collections::BTreeMap, sync::Arc};

use sqlx::postgres::PgPoolOptions;

use crate::{
    config::{AppConfig, MeterConfig},
    meter::{Meter, MeterError, MeterServices, MeterSettings},
    sinks::PgStatisticsSink,
    sources::PgDeviceConsumptionSource,
    store::JsonFileStore,
};

/// Every configured meter, addressable by entity id.
#[derive(Default)]
pub struct MeterRegistry {
    meters: BTreeMap<String, Arc<Meter>>,
}

impl MeterRegistry {
    /// Build one meter per config entry, restoring persisted readings.
    pub async fn load(meters: &[MeterConfig], services: MeterServices) -> Result<Self, MeterError> {
        let mut registry = MeterRegistry::default();
        for cfg in meters {
            let settings = MeterSettings {
                algorithm: cfg.algorithm(),
                known_device_entities: cfg.known_device_entities.clone(),
            };
            let meter = Meter::load(cfg.identity(), settings, services.clone()).await?;
            tracing::info!(
                meter = %meter.identity().entity_id,
                algorithm = %meter.algorithm(),
                statistic_id = %meter.statistic_id(),
                "meter loaded"
            );
            registry.insert(meter);
        }
        Ok(registry)
    }

    pub fn insert(&mut self, meter: Meter) {
        self.meters
            .insert(meter.identity().entity_id.clone(), Arc::new(meter));
    }

    pub fn get(&self, entity_id: &str) -> Option<Arc<Meter>> {
        self.meters.get(entity_id).cloned()
    }

    pub fn entity_ids(&self) -> Vec<String> {
        self.meters.keys().cloned().collect()
    }
}

/// Connect the Postgres-backed collaborators and load every configured meter.
pub async fn build_registry(cfg: &AppConfig) -> anyhow::Result<MeterRegistry> {
    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect(&cfg.database.uri)
        .await?;

    let services = MeterServices {
        sink: Arc::new(PgStatisticsSink::new(
            pool.clone(),
            cfg.statistics.max_retries,
            cfg.statistics.retry_backoff(),
        )),
        devices: Arc::new(PgDeviceConsumptionSource::new(pool)),
        store: Arc::new(JsonFileStore::new(&cfg.store.dir)),
        timeout: cfg.statistics.timeout(),
    };

    let registry = MeterRegistry::load(&cfg.meters, services).await?;
    Ok(registry)
}
