use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracking_client::domain::Datapoint;

use crate::fitting::{
    DeviceAwareExtrapolate, DeviceAwareInterpolate, Extrapolate, FitError, HourlyConsumption,
    Interpolate, LinearExtrapolate, LinearInterpolate,
};

/// Reconstruction algorithm selected for a meter.
///
/// Names are normalized through [`Algorithm::from_name`]: unrecognized names
/// fall back to [`Algorithm::DEFAULT`] instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "&'static str")]
pub enum Algorithm {
    #[default]
    Linear,
    DeviceAware,
}

impl Algorithm {
    pub const DEFAULT: Algorithm = Algorithm::Linear;

    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "linear" => Algorithm::Linear,
            "device_aware" => Algorithm::DeviceAware,
            _ => {
                tracing::warn!(
                    algorithm = %name,
                    fallback = %Self::DEFAULT,
                    "unknown algorithm, falling back to default"
                );
                Self::DEFAULT
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Linear => "linear",
            Algorithm::DeviceAware => "device_aware",
        }
    }

    /// Intermediate hourly points between `old_datapoints.last()` and `new_datapoint`.
    ///
    /// `device_hourly_consumption` is only consulted by [`Algorithm::DeviceAware`];
    /// when absent the device-aware strategy runs with no known consumption.
    pub fn interpolate(
        &self,
        old_datapoints: &[Datapoint],
        new_datapoint: &Datapoint,
        device_hourly_consumption: Option<&HourlyConsumption>,
    ) -> Vec<Datapoint> {
        match self {
            Algorithm::Linear => LinearInterpolate.guesstimate(old_datapoints, new_datapoint),
            Algorithm::DeviceAware => DeviceAwareInterpolate::new(device_hourly_consumption)
                .guesstimate(old_datapoints, new_datapoint),
        }
    }

    pub fn extrapolate(
        &self,
        datapoints: &[Datapoint],
        now: OffsetDateTime,
    ) -> Result<Option<Datapoint>, FitError> {
        match self {
            Algorithm::Linear => LinearExtrapolate.guesstimate(datapoints, now),
            Algorithm::DeviceAware => DeviceAwareExtrapolate.guesstimate(datapoints, now),
        }
    }
}

impl From<String> for Algorithm {
    fn from(name: String) -> Self {
        Algorithm::from_name(&name)
    }
}

impl From<Algorithm> for &'static str {
    fn from(algorithm: Algorithm) -> Self {
        algorithm.as_str()
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
