//! Per-meter reading state machine.
//!
//! A [`Meter`] accepts manual readings, reconstructs the hourly series since
//! the previous reading and writes it to the statistics sink. A reset clears
//! the meter's series and replays the whole retained history.
//!
//! Transitions on one meter are serialized by an async mutex held for the
//! full transition, external calls included. Every external call runs under
//! the configured timeout.

use std::{future::Future, sync::Arc, time::Duration};

use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracking_client::domain::{Datapoint, InvalidDatapoint, StatisticMetadata, StatisticRow};

use crate::{
    algorithms::Algorithm,
    fitting::{FitError, HourlyConsumption},
    pipeline::PipelineError,
    sinks::StatisticsSink,
    sources::DeviceConsumptionSource,
    store::{AttributeStore, MeterAttributes, StoreError},
};

mod identity;
mod state;

pub use identity::{MeterIdentity, DOMAIN};
pub use state::{MeterState, MAX_PREVIOUS_READS};

#[derive(thiserror::Error, Debug)]
pub enum MeterError {
    #[error("invalid reading: {0}")]
    InvalidReading(#[from] InvalidDatapoint),
    #[error("out of order reading: new reading {new} cannot be earlier than the last read {last}")]
    OutOfOrderReading {
        last: OffsetDateTime,
        new: OffsetDateTime,
    },
    #[error(transparent)]
    Fit(#[from] FitError),
    #[error("statistics sink failed: {0}")]
    Sink(#[from] PipelineError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
}

/// Configured behaviour of a meter.
#[derive(Debug, Clone)]
pub struct MeterSettings {
    pub algorithm: Algorithm,
    pub known_device_entities: Vec<String>,
}

/// External collaborators shared by all meters.
#[derive(Clone)]
pub struct MeterServices {
    pub sink: Arc<dyn StatisticsSink>,
    pub devices: Arc<dyn DeviceConsumptionSource>,
    pub store: Arc<dyn AttributeStore>,
    pub timeout: Duration,
}

pub struct Meter {
    identity: MeterIdentity,
    settings: MeterSettings,
    services: MeterServices,
    state: Mutex<MeterState>,
}

impl Meter {
    /// Build a meter and restore its readings from the attribute store.
    ///
    /// Algorithm and device entities always come from `settings`; persisted
    /// values only matter for the readings.
    pub async fn load(
        identity: MeterIdentity,
        settings: MeterSettings,
        services: MeterServices,
    ) -> Result<Self, MeterError> {
        let loaded = bounded(
            services.timeout,
            "attribute load",
            services.store.load(&identity.unique_id),
        )
        .await??;

        let state = match loaded {
            Some(attributes) => {
                if attributes.algorithm != settings.algorithm {
                    tracing::info!(
                        meter = %identity.entity_id,
                        stored = %attributes.algorithm,
                        configured = %settings.algorithm,
                        "algorithm changed since last run"
                    );
                }
                let last_read = match (attributes.last_read, attributes.last_updated) {
                    (Some(value), Some(ts)) => Some(Datapoint::try_new(value, ts)?),
                    _ => None,
                };
                tracing::debug!(meter = %identity.entity_id, "loaded attributes from storage");
                MeterState::restore(last_read, attributes.previous_reads)
            }
            None => {
                tracing::debug!(meter = %identity.entity_id, "no attributes found in storage");
                MeterState::default()
            }
        };
        tracing::debug!(
            meter = %identity.entity_id,
            tracking = state.is_tracking(),
            history = state.history().len(),
            "meter state restored"
        );

        Ok(Self {
            identity,
            settings,
            services,
            state: Mutex::new(state),
        })
    }

    pub fn identity(&self) -> &MeterIdentity {
        &self.identity
    }

    pub fn algorithm(&self) -> Algorithm {
        self.settings.algorithm
    }

    pub fn statistic_id(&self) -> String {
        self.identity.statistic_id(self.settings.algorithm)
    }

    /// Accept a new cumulative reading and backfill the hours since the last one.
    ///
    /// Returns the batch written to the sink: intermediate points followed by
    /// the reading itself. On any error the meter state is unchanged.
    pub async fn accept_reading(
        &self,
        value: f64,
        timestamp: OffsetDateTime,
    ) -> Result<Vec<Datapoint>, MeterError> {
        let reading = match Datapoint::try_new(value, timestamp) {
            Ok(reading) => reading,
            Err(e) => {
                metrics::counter!("readings_rejected_total").increment(1);
                return Err(e.into());
            }
        };

        let mut state = self.state.lock().await;
        let next = match state.with_reading(reading) {
            Ok(next) => next,
            Err(e) => {
                metrics::counter!("readings_rejected_total").increment(1);
                tracing::warn!(meter = %self.identity.entity_id, error = %e, "reading rejected");
                return Err(e);
            }
        };

        let device_hourly = match state.last_read() {
            Some(prior) => self.device_consumption(prior.timestamp(), reading.timestamp()).await,
            None => None,
        };

        let old_datapoints: Vec<Datapoint> = next.previous_reads().iter().copied().collect();
        let mut batch = self
            .settings
            .algorithm
            .interpolate(&old_datapoints, &reading, device_hourly.as_ref());
        tracing::debug!(
            meter = %self.identity.entity_id,
            algorithm = %self.settings.algorithm,
            intermediate = batch.len(),
            "interpolated missing data"
        );
        batch.push(reading);

        self.submit(&batch).await?;
        self.persist(&next).await?;
        *state = next;

        metrics::counter!("readings_accepted_total").increment(1);
        tracing::info!(
            meter = %self.identity.entity_id,
            value,
            %timestamp,
            points = batch.len(),
            "reading accepted"
        );
        Ok(batch)
    }

    /// Clear this meter's series and rebuild it from the retained history.
    ///
    /// The oldest retained reading is written first, then each consecutive
    /// pair of readings is re-interpolated and written in chronological order.
    /// Returns the number of batches written.
    pub async fn reset(&self) -> Result<usize, MeterError> {
        let state = self.state.lock().await;
        let history = state.history();
        if history.is_empty() {
            tracing::debug!(meter = %self.identity.entity_id, "no readings to replay");
            return Ok(0);
        }

        let statistic_id = self.statistic_id();
        tracing::debug!(meter = %self.identity.entity_id, %statistic_id, "resetting statistics");
        let cleared = match bounded(
            self.services.timeout,
            "statistics clear",
            self.services.sink.clear(&statistic_id),
        )
        .await
        {
            Ok(res) => res.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(error) = cleared {
            tracing::warn!(
                %statistic_id,
                %error,
                "failed to clear statistics, proceeding with backfill"
            );
        }

        self.submit(&history[..1]).await?;
        for i in 1..history.len() {
            let (previous, current) = (history[i - 1], history[i]);
            let device_hourly = self
                .device_consumption(previous.timestamp(), current.timestamp())
                .await;
            let mut batch =
                self.settings
                    .algorithm
                    .interpolate(&history[..i], &current, device_hourly.as_ref());
            batch.push(current);
            self.submit(&batch).await?;
        }

        metrics::counter!("meter_resets_total").increment(1);
        tracing::info!(
            meter = %self.identity.entity_id,
            batches = history.len(),
            "statistics rebuilt from history"
        );
        Ok(history.len())
    }

    /// Projected meter value at `now`; `None` until a reading is accepted.
    pub async fn extrapolated(&self, now: OffsetDateTime) -> Result<Option<Datapoint>, MeterError> {
        let state = self.state.lock().await;
        Ok(self.settings.algorithm.extrapolate(&state.history(), now)?)
    }

    pub async fn attributes(&self) -> MeterAttributes {
        let state = self.state.lock().await;
        self.attributes_for(&state)
    }

    fn attributes_for(&self, state: &MeterState) -> MeterAttributes {
        MeterAttributes {
            meter_name: self.identity.name.clone(),
            last_updated: state.last_read().map(Datapoint::timestamp),
            last_read: state.last_read().map(Datapoint::value),
            previous_reads: state.previous_reads().iter().copied().collect(),
            algorithm: self.settings.algorithm,
            known_device_entities: self.settings.known_device_entities.clone(),
        }
    }

    fn metadata(&self) -> StatisticMetadata {
        StatisticMetadata::cumulative(
            self.statistic_id(),
            DOMAIN,
            self.identity.statistic_name(self.settings.algorithm),
            self.identity.unit.clone(),
        )
    }

    /// Known device consumption between two readings.
    ///
    /// `None` unless the meter is device-aware with devices configured. Query
    /// failures degrade to an empty mapping.
    async fn device_consumption(
        &self,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Option<HourlyConsumption> {
        if self.settings.algorithm != Algorithm::DeviceAware
            || self.settings.known_device_entities.is_empty()
        {
            return None;
        }

        let query = self.services.devices.hourly_consumption(
            &self.settings.known_device_entities,
            start,
            end,
        );
        let error = match bounded(self.services.timeout, "device consumption query", query).await {
            Ok(Ok(hourly)) => return Some(hourly),
            Ok(Err(e)) => e.to_string(),
            Err(e) => e.to_string(),
        };

        metrics::counter!("device_consumption_query_failures_total").increment(1);
        tracing::warn!(
            meter = %self.identity.entity_id,
            devices = ?self.settings.known_device_entities,
            %error,
            "failed to query device consumption, falling back to even distribution"
        );
        Some(HourlyConsumption::new())
    }

    async fn submit(&self, points: &[Datapoint]) -> Result<(), MeterError> {
        let metadata = self.metadata();
        let rows: Vec<StatisticRow> = points.iter().map(StatisticRow::from).collect();
        tracing::debug!(
            statistic_id = %metadata.statistic_id,
            points = rows.len(),
            "writing statistics"
        );
        bounded(
            self.services.timeout,
            "statistics submit",
            self.services.sink.submit(&metadata, &rows),
        )
        .await??;
        Ok(())
    }

    async fn persist(&self, state: &MeterState) -> Result<(), MeterError> {
        let attributes = self.attributes_for(state);
        bounded(
            self.services.timeout,
            "attribute save",
            self.services.store.save(&self.identity.unique_id, &attributes),
        )
        .await??;
        tracing::debug!(meter = %self.identity.entity_id, "saved attributes to storage");
        Ok(())
    }
}

/// Await `fut`, giving up after `timeout`.
async fn bounded<F: Future>(
    timeout: Duration,
    operation: &'static str,
    fut: F,
) -> Result<F::Output, MeterError> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| MeterError::Timeout { operation, timeout })
}
