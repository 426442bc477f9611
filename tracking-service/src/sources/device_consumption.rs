use sqlx::postgres::PgPool;
use time::OffsetDateTime;
use tracking_client::{
    db,
    domain::{hour_start, DeviceConsumptionRow},
};

use crate::{fitting::HourlyConsumption, pipeline::PipelineError};

/// Supplies measured per-hour consumption of monitored devices.
#[async_trait::async_trait]
pub trait DeviceConsumptionSource: Send + Sync {
    /// Total consumption across `entity_ids`, keyed by UTC hour start, for the
    /// hours touching `(start, end]`.
    async fn hourly_consumption(
        &self,
        entity_ids: &[String],
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<HourlyConsumption, PipelineError>;
}

/// Sum positive per-hour changes across all devices.
///
/// Rows are re-keyed by the start of their UTC hour; missing or non-positive
/// changes (meter resets, counter wraps) contribute nothing.
pub fn aggregate_hourly(rows: &[DeviceConsumptionRow]) -> HourlyConsumption {
    let mut hourly_totals = HourlyConsumption::new();
    for row in rows {
        match row.change {
            Some(change) if change > 0.0 => {
                *hourly_totals.entry(hour_start(row.ts)).or_insert(0.0) += change;
            }
            _ => {}
        }
    }
    hourly_totals
}

/// Reads `device_consumption_hourly` from the statistics database.
pub struct PgDeviceConsumptionSource {
    pool: PgPool,
}

impl PgDeviceConsumptionSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DeviceConsumptionSource for PgDeviceConsumptionSource {
    async fn hourly_consumption(
        &self,
        entity_ids: &[String],
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<HourlyConsumption, PipelineError> {
        if entity_ids.is_empty() {
            return Ok(HourlyConsumption::new());
        }

        let rows = db::device_consumption(&self.pool, entity_ids, hour_start(start), end)
            .await
            .map_err(|e| PipelineError::Source(format!("device consumption query failed: {e}")))?;

        let hourly = aggregate_hourly(&rows);
        tracing::debug!(
            devices = entity_ids.len(),
            rows = rows.len(),
            hours = hourly.len(),
            "device consumption loaded"
        );
        Ok(hourly)
    }
}
