//! Interpolation informed by known device consumption (smart plugs, energy
//! monitors). Whatever the devices do not explain is treated as base load and
//! spread evenly across the hours between two readings.

use time::OffsetDateTime;
use tracking_client::domain::Datapoint;

use super::{hour_buckets, project_from_slope, Extrapolate, FitError, HourlyConsumption, Interpolate};

/// For each hour `h` between two readings:
///
/// `consumption[h] = known_device[h] + base_load_per_hour`
///
/// where `base_load_per_hour = max(0, meter_delta - total_known) / num_hours`.
/// When devices report more than the meter delta the base load is zero and the
/// reconstructed series may end above the new reading.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceAwareInterpolate<'a> {
    device_hourly_consumption: Option<&'a HourlyConsumption>,
}

impl<'a> DeviceAwareInterpolate<'a> {
    pub fn new(device_hourly_consumption: Option<&'a HourlyConsumption>) -> Self {
        Self {
            device_hourly_consumption,
        }
    }

    fn known(&self, hour: &OffsetDateTime) -> f64 {
        self.device_hourly_consumption
            .and_then(|hourly| hourly.get(hour))
            .copied()
            .unwrap_or(0.0)
    }
}

impl Interpolate for DeviceAwareInterpolate<'_> {
    fn guesstimate(&self, old_datapoints: &[Datapoint], new_datapoint: &Datapoint) -> Vec<Datapoint> {
        let Some(latest_old) = old_datapoints.last() else {
            return Vec::new();
        };

        let hours = hour_buckets(latest_old.timestamp(), new_datapoint.timestamp());
        if hours.is_empty() {
            return Vec::new();
        }

        let delta_v = new_datapoint.value() - latest_old.value();
        let known_per_hour: Vec<f64> = hours.iter().map(|h| self.known(h)).collect();
        let total_known: f64 = known_per_hour.iter().sum();

        let residual = (delta_v - total_known).max(0.0);
        let base_per_hour = residual / hours.len() as f64;

        let mut cumulative = latest_old.value();
        hours
            .into_iter()
            .zip(known_per_hour)
            .map(|(hour, known)| {
                cumulative += known + base_per_hour;
                Datapoint::new(cumulative, hour)
            })
            .collect()
    }
}

/// Future device usage is unknowable, so projection is the plain slope one.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceAwareExtrapolate;

impl Extrapolate for DeviceAwareExtrapolate {
    fn guesstimate(
        &self,
        datapoints: &[Datapoint],
        now: OffsetDateTime,
    ) -> Result<Option<Datapoint>, FitError> {
        project_from_slope(datapoints, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 0.001, "{actual} != {expected}");
    }

    #[test]
    fn device_aware_normal_distribution() {
        let old = [Datapoint::new(100.0, datetime!(2023-10-01 10:00 UTC))];
        let new = Datapoint::new(200.0, datetime!(2023-10-01 15:00 UTC));
        let device_data = HourlyConsumption::from([
            (datetime!(2023-10-01 12:00 UTC), 20.0),
            (datetime!(2023-10-01 14:00 UTC), 10.0),
        ]);

        let result = DeviceAwareInterpolate::new(Some(&device_data)).guesstimate(&old, &new);

        assert_eq!(result.len(), 4);
        let expected = [
            (117.5, datetime!(2023-10-01 11:00 UTC)),
            (155.0, datetime!(2023-10-01 12:00 UTC)),
            (172.5, datetime!(2023-10-01 13:00 UTC)),
            (200.0, datetime!(2023-10-01 14:00 UTC)),
        ];
        for (point, (value, ts)) in result.iter().zip(expected) {
            assert_close(point.value(), value);
            assert_eq!(point.timestamp(), ts);
        }
    }

    #[test]
    fn device_aware_devices_exceed_meter_delta() {
        let old = [Datapoint::new(100.0, datetime!(2023-10-01 10:00 UTC))];
        let new = Datapoint::new(150.0, datetime!(2023-10-01 13:00 UTC));
        let device_data = HourlyConsumption::from([
            (datetime!(2023-10-01 11:00 UTC), 30.0),
            (datetime!(2023-10-01 12:00 UTC), 30.0),
        ]);

        let result = DeviceAwareInterpolate::new(Some(&device_data)).guesstimate(&old, &new);

        assert_eq!(result.len(), 2);
        assert_close(result[0].value(), 130.0);
        // Ends above the new reading: device data wins over the meter delta.
        assert_close(result[1].value(), 160.0);
    }

    #[test]
    fn device_aware_clamp_leaves_only_device_contribution() {
        let old = [Datapoint::new(0.0, datetime!(2023-10-01 00:00 UTC))];
        let new = Datapoint::new(10.0, datetime!(2023-10-01 06:00 UTC));
        let device_data = HourlyConsumption::from([
            (datetime!(2023-10-01 02:00 UTC), 6.0),
            (datetime!(2023-10-01 04:00 UTC), 4.0),
        ]);

        let result = DeviceAwareInterpolate::new(Some(&device_data)).guesstimate(&old, &new);

        let mut previous = old[0].value();
        for point in &result {
            let known = device_data.get(&point.timestamp()).copied().unwrap_or(0.0);
            assert_close(point.value() - previous, known);
            previous = point.value();
        }
    }

    #[test]
    fn device_aware_no_device_data_is_even_distribution() {
        let old = [Datapoint::new(100.0, datetime!(2023-10-01 10:00 UTC))];
        let new = Datapoint::new(200.0, datetime!(2023-10-01 15:00 UTC));

        let empty = HourlyConsumption::new();
        for interpolate in [
            DeviceAwareInterpolate::new(Some(&empty)),
            DeviceAwareInterpolate::new(None),
        ] {
            let result = interpolate.guesstimate(&old, &new);
            let values: Vec<f64> = result.iter().map(Datapoint::value).collect();
            assert_eq!(values, vec![125.0, 150.0, 175.0, 200.0]);
        }
    }

    #[test]
    fn device_aware_partial_device_data() {
        let old = [Datapoint::new(0.0, datetime!(2023-10-01 00:00 UTC))];
        let new = Datapoint::new(100.0, datetime!(2023-10-01 05:00 UTC));
        let device_data = HourlyConsumption::from([(datetime!(2023-10-01 03:00 UTC), 15.0)]);

        let result = DeviceAwareInterpolate::new(Some(&device_data)).guesstimate(&old, &new);

        assert_eq!(result.len(), 4);
        let base = 85.0 / 4.0;
        assert_close(result[0].value(), base);
        assert_close(result[1].value(), 2.0 * base);
        assert_close(result[2].value(), 3.0 * base + 15.0);
        assert_close(result[3].value(), 100.0);
    }

    #[test]
    fn device_aware_ignores_device_hours_outside_the_gap() {
        let old = [Datapoint::new(100.0, datetime!(2023-10-01 10:00 UTC))];
        let new = Datapoint::new(130.0, datetime!(2023-10-01 13:00 UTC));
        let device_data = HourlyConsumption::from([
            (datetime!(2023-10-01 10:00 UTC), 50.0),
            (datetime!(2023-10-01 13:00 UTC), 50.0),
        ]);

        let result = DeviceAwareInterpolate::new(Some(&device_data)).guesstimate(&old, &new);
        assert_close(result[0].value(), 115.0);
        assert_close(result[1].value(), 130.0);
    }

    #[test]
    fn device_aware_no_old_datapoints() {
        let new = Datapoint::new(200.0, datetime!(2023-10-01 15:00 UTC));
        assert!(DeviceAwareInterpolate::default().guesstimate(&[], &new).is_empty());
    }

    #[test]
    fn device_aware_single_hour_gap() {
        let old = [Datapoint::new(100.0, datetime!(2023-10-01 10:00 UTC))];
        let new = Datapoint::new(110.0, datetime!(2023-10-01 11:00 UTC));
        assert!(DeviceAwareInterpolate::default().guesstimate(&old, &new).is_empty());
    }

    #[test]
    fn device_aware_extrapolate_normal() {
        let datapoints = [
            Datapoint::new(100.0, datetime!(2023-10-01 10:00 UTC)),
            Datapoint::new(200.0, datetime!(2023-10-01 11:00 UTC)),
        ];
        let now = datetime!(2023-10-01 14:00 UTC);

        let result = DeviceAwareExtrapolate.guesstimate(&datapoints, now).unwrap().unwrap();

        assert_eq!(result.value(), 500.0);
        assert_eq!(result.timestamp(), now);
    }

    #[test]
    fn device_aware_extrapolate_no_datapoints() {
        let result = DeviceAwareExtrapolate.guesstimate(&[], datetime!(2023-10-01 14:00 UTC));
        assert_eq!(result, Ok(None));
    }

    #[test]
    fn device_aware_extrapolate_one_datapoint() {
        let now = datetime!(2023-10-01 14:00 UTC);
        let single = [Datapoint::new(42.0, datetime!(2023-10-01 10:00 UTC))];
        let result = DeviceAwareExtrapolate.guesstimate(&single, now).unwrap().unwrap();
        assert_eq!(result.value(), 42.0);
        assert_eq!(result.timestamp(), now);
    }
}
