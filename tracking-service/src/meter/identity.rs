use crate::algorithms::Algorithm;

/// Namespace of every id this service derives.
pub const DOMAIN: &str = "utility_manual_tracking";

/// Stable naming of a configured meter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeterIdentity {
    pub unique_id: String,
    pub entity_id: String,
    pub name: String,
    pub unit: String,
    pub class: String,
}

impl MeterIdentity {
    pub fn new(name: &str, unit: &str, class: &str) -> Self {
        let unique_id = format!(
            "{DOMAIN}_{}_{}",
            name.to_lowercase().replace(' ', "_"),
            class.to_lowercase()
        );
        Self {
            entity_id: format!("sensor.{unique_id}"),
            unique_id,
            name: name.to_string(),
            unit: unit.to_string(),
            class: class.to_string(),
        }
    }

    /// Series id in the statistics store. Each algorithm gets its own series,
    /// so switching algorithms never overwrites the other's history.
    pub fn statistic_id(&self, algorithm: Algorithm) -> String {
        format!("{DOMAIN}:{}_statistics_{algorithm}", self.unique_id)
    }

    pub fn statistic_name(&self, algorithm: Algorithm) -> String {
        format!("{} - statistics ({algorithm})", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_derived_from_name_and_class() {
        let id = MeterIdentity::new("House Power", "kWh", "Energy");
        assert_eq!(id.unique_id, "utility_manual_tracking_house_power_energy");
        assert_eq!(id.entity_id, "sensor.utility_manual_tracking_house_power_energy");
    }

    #[test]
    fn statistic_id_is_qualified_by_algorithm() {
        let id = MeterIdentity::new("Water", "m3", "water");
        assert_eq!(
            id.statistic_id(Algorithm::Linear),
            "utility_manual_tracking:utility_manual_tracking_water_water_statistics_linear"
        );
        assert_ne!(id.statistic_id(Algorithm::Linear), id.statistic_id(Algorithm::DeviceAware));
        assert_eq!(id.statistic_name(Algorithm::DeviceAware), "Water - statistics (device_aware)");
    }
}
