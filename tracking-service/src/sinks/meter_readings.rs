use std::sync::Arc;

use futures::StreamExt;
use tracking_client::domain::Datapoint;

use crate::{
    meter::{Meter, MeterError},
    pipeline::{Envelope, PipelineError, Sink, SinkSummary},
};

/// Feeds a stream of readings, in order, into one meter.
///
/// Readings the meter already has (same or earlier timestamp) are skipped so
/// that an import can be re-run over an overlapping file. Any other meter
/// error aborts the run.
pub struct MeterReadingsSink {
    meter: Arc<Meter>,
}

impl MeterReadingsSink {
    pub fn new(meter: Arc<Meter>) -> Self {
        Self { meter }
    }
}

#[async_trait::async_trait]
impl Sink<Datapoint> for MeterReadingsSink {
    async fn run<S>(&self, mut input: S) -> Result<SinkSummary, PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<Datapoint>, PipelineError>> + Send + Unpin + 'static,
    {
        let mut summary = SinkSummary::default();
        let entity_id = &self.meter.identity().entity_id;

        while let Some(item) = input.next().await {
            let env = match item {
                Ok(env) => env,
                Err(e) => {
                    tracing::error!(error = %e, "error in upstream pipeline for MeterReadingsSink");
                    summary.failed_upstream += 1;
                    continue;
                }
            };

            let reading = env.payload;
            match self
                .meter
                .accept_reading(reading.value(), reading.timestamp())
                .await
            {
                Ok(_) => summary.accepted += 1,
                Err(e @ MeterError::OutOfOrderReading { .. }) => {
                    tracing::warn!(meter = %entity_id, origin = %env.origin, error = %e, "skipping reading");
                    summary.skipped += 1;
                }
                Err(e) => {
                    return Err(PipelineError::Sink(format!(
                        "{}: meter {entity_id} rejected reading: {e}",
                        env.origin
                    )));
                }
            }
        }

        tracing::info!(
            meter = %entity_id,
            accepted = summary.accepted,
            skipped = summary.skipped,
            failed_upstream = summary.failed_upstream,
            "readings import finished"
        );
        Ok(summary)
    }
}
