use std::time::Duration;

use sqlx::postgres::PgPool;
use tracking_client::{
    db,
    domain::{StatisticMetadata, StatisticRow},
};

use super::StatisticsSink;
use crate::pipeline::PipelineError;

/// Statistics sink backed by the Postgres-wire statistics tables.
pub struct PgStatisticsSink {
    pool: PgPool,
    max_retries: u32,
    retry_backoff: Duration,
}

impl PgStatisticsSink {
    pub fn new(pool: PgPool, max_retries: u32, retry_backoff: Duration) -> Self {
        Self {
            pool,
            max_retries,
            retry_backoff,
        }
    }
}

#[async_trait::async_trait]
impl StatisticsSink for PgStatisticsSink {
    async fn submit(&self, metadata: &StatisticMetadata, rows: &[StatisticRow]) -> Result<(), PipelineError> {
        let mut attempt: u32 = 0;
        loop {
            match db::insert_statistics(&self.pool, metadata, rows).await {
                Ok(()) => {
                    metrics::counter!("statistics_points_written_total").increment(rows.len() as u64);
                    tracing::debug!(
                        statistic_id = %metadata.statistic_id,
                        points = rows.len(),
                        "statistics written"
                    );
                    return Ok(());
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    let sleep_for = self.retry_backoff * attempt;
                    tracing::warn!(
                        error = %e,
                        attempt,
                        statistic_id = %metadata.statistic_id,
                        "statistics write failed, retrying with backoff"
                    );
                    metrics::counter!("statistics_sink_retry_total").increment(1);
                    tokio::time::sleep(sleep_for).await;
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        statistic_id = %metadata.statistic_id,
                        "statistics write failed, giving up"
                    );
                    metrics::counter!("statistics_sink_errors_total").increment(1);
                    return Err(PipelineError::Sink(e.to_string()));
                }
            }
        }
    }

    async fn clear(&self, statistic_id: &str) -> Result<(), PipelineError> {
        let removed = db::clear_statistics(&self.pool, statistic_id)
            .await
            .map_err(|e| PipelineError::Sink(format!("failed to clear {statistic_id}: {e}")))?;
        tracing::debug!(statistic_id, removed, "statistics cleared");
        Ok(())
    }
}
