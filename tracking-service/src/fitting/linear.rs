use time::OffsetDateTime;
use tracking_client::domain::Datapoint;

use super::{hour_buckets, project_from_slope, Extrapolate, FitError, Interpolate};

/// Spreads the meter delta evenly over every hour bucket between two readings.
///
/// The last bucket always carries the new reading's value, so the series
/// reconciles exactly with both bounding readings.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearInterpolate;

impl Interpolate for LinearInterpolate {
    fn guesstimate(&self, old_datapoints: &[Datapoint], new_datapoint: &Datapoint) -> Vec<Datapoint> {
        let Some(latest_old) = old_datapoints.last() else {
            return Vec::new();
        };

        let buckets = hour_buckets(latest_old.timestamp(), new_datapoint.timestamp());
        let num_hours = buckets.len();
        let delta_v = new_datapoint.value() - latest_old.value();

        buckets
            .into_iter()
            .enumerate()
            .map(|(i, hour)| {
                let value = if i + 1 == num_hours {
                    new_datapoint.value()
                } else {
                    latest_old.value() + delta_v * (i + 1) as f64 / num_hours as f64
                };
                Datapoint::new(value, hour)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LinearExtrapolate;

impl Extrapolate for LinearExtrapolate {
    fn guesstimate(
        &self,
        datapoints: &[Datapoint],
        now: OffsetDateTime,
    ) -> Result<Option<Datapoint>, FitError> {
        project_from_slope(datapoints, now)
    }
}
