use serde::Serialize;
use time::OffsetDateTime;

use super::datapoint::{hour_start, Datapoint};

/// Describes an external statistic series in the statistics store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatisticMetadata {
    pub statistic_id: String,
    pub source: String,
    pub name: String,
    pub unit_of_measurement: String,
    pub has_mean: bool,
    pub has_sum: bool,
}

impl StatisticMetadata {
    /// Metadata for a cumulative (sum-only) series.
    pub fn cumulative(
        statistic_id: impl Into<String>,
        source: impl Into<String>,
        name: impl Into<String>,
        unit_of_measurement: impl Into<String>,
    ) -> Self {
        Self {
            statistic_id: statistic_id.into(),
            source: source.into(),
            name: name.into(),
            unit_of_measurement: unit_of_measurement.into(),
            has_mean: false,
            has_sum: true,
        }
    }
}

/// One hourly row of a statistic series: running total at the hour `start`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatisticRow {
    pub start: OffsetDateTime,
    pub sum: f64,
}

impl From<&Datapoint> for StatisticRow {
    fn from(dp: &Datapoint) -> Self {
        StatisticRow {
            start: hour_start(dp.timestamp()),
            sum: dp.value(),
        }
    }
}

/// Per-hour consumption reported for a monitored device entity.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct DeviceConsumptionRow {
    pub ts: OffsetDateTime,
    pub entity_id: String,
    pub change: Option<f64>,
}
