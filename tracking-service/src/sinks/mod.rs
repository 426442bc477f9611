use tracking_client::domain::{StatisticMetadata, StatisticRow};

use crate::pipeline::PipelineError;

pub mod meter_readings;
pub mod statistics_store;

pub use meter_readings::MeterReadingsSink;
pub use statistics_store::PgStatisticsSink;

/// Time-series statistics store receiving reconstructed hourly series.
#[async_trait::async_trait]
pub trait StatisticsSink: Send + Sync {
    /// Write `rows` (ordered by `start`) under `metadata.statistic_id`.
    async fn submit(&self, metadata: &StatisticMetadata, rows: &[StatisticRow]) -> Result<(), PipelineError>;

    /// Drop every row previously written for `statistic_id`.
    async fn clear(&self, statistic_id: &str) -> Result<(), PipelineError>;
}
