//! Reconstruction of hourly cumulative values between sparse meter readings.
//!
//! Two capabilities are provided per algorithm:
//! - [`Interpolate`] fills the hour buckets strictly between the last known
//!   reading and a new one. Endpoints are never part of the output.
//! - [`Extrapolate`] projects the current value from the most recent readings.

use std::collections::BTreeMap;

use time::{Duration, OffsetDateTime};
use tracking_client::domain::{hour_start, Datapoint};

mod device_aware;
mod linear;

pub use device_aware::{DeviceAwareExtrapolate, DeviceAwareInterpolate};
pub use linear::{LinearExtrapolate, LinearInterpolate};

/// Step of the bucketing walk; one reconstructed point per step.
pub const GRANULAR_DELTA: Duration = Duration::HOUR;

/// Externally measured consumption keyed by the UTC start of each hour.
pub type HourlyConsumption = BTreeMap<OffsetDateTime, f64>;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum FitError {
    #[error("undefined slope: the two latest datapoints share timestamp {0}")]
    UndefinedSlope(OffsetDateTime),
}

pub trait Interpolate {
    /// Intermediate points between `old_datapoints.last()` and `new_datapoint`.
    fn guesstimate(&self, old_datapoints: &[Datapoint], new_datapoint: &Datapoint) -> Vec<Datapoint>;
}

pub trait Extrapolate {
    fn guesstimate(
        &self,
        datapoints: &[Datapoint],
        now: OffsetDateTime,
    ) -> Result<Option<Datapoint>, FitError>;
}

/// Hour bucket keys visited when walking from `last` towards `next`.
///
/// The walk starts one quantum after `last` and stops strictly before `next`;
/// each step is truncated to the start of its hour.
pub fn hour_buckets(last: OffsetDateTime, next: OffsetDateTime) -> Vec<OffsetDateTime> {
    let mut buckets = Vec::new();
    let mut current = last + GRANULAR_DELTA;
    while current < next {
        buckets.push(hour_start(current));
        current += GRANULAR_DELTA;
    }
    buckets
}

/// Two-point slope projection shared by every algorithm.
///
/// No points gives `None`; a single point is carried forward unchanged to
/// `now`; otherwise the slope of the two latest points (per second) is
/// applied from the latest point to `now`.
pub fn project_from_slope(
    datapoints: &[Datapoint],
    now: OffsetDateTime,
) -> Result<Option<Datapoint>, FitError> {
    let (second_latest, latest) = match datapoints {
        [] => return Ok(None),
        [only] => return Ok(Some(only.at(now))),
        [.., second_latest, latest] => (second_latest, latest),
    };

    let diff_secs = (latest.timestamp() - second_latest.timestamp()).as_seconds_f64();
    if diff_secs == 0.0 {
        return Err(FitError::UndefinedSlope(latest.timestamp()));
    }
    let slope = (latest.value() - second_latest.value()) / diff_secs;
    let elapsed = (now - latest.timestamp()).as_seconds_f64();

    Ok(Some(Datapoint::new(latest.value() + slope * elapsed, now)))
}
