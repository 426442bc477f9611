use serde::Deserialize;
use std::{collections::HashSet, fs, path::PathBuf, time::Duration};

use crate::{algorithms::Algorithm, meter::MeterIdentity};

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub uri: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatisticsConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Upper bound on every external call a meter makes.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl StatisticsConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    200
}

fn default_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeterConfig {
    pub name: String,
    pub unit: String,
    pub class: String,
    #[serde(default)]
    pub algorithm: Option<String>,
    #[serde(default)]
    pub known_device_entities: Vec<String>,
}

impl MeterConfig {
    pub fn identity(&self) -> MeterIdentity {
        MeterIdentity::new(&self.name, &self.unit, &self.class)
    }

    /// Configured algorithm; unknown or missing names resolve to the default.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
            .as_deref()
            .map(Algorithm::from_name)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub statistics: StatisticsConfig,
    pub store: StoreConfig,
    pub api: ApiConfig,
    pub metrics: Option<MetricsConfig>,
    pub meters: Vec<MeterConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("TRACKING_CONFIG").unwrap_or_else(|_| "tracking-config.toml".to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config {path}: {e}"))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.meters.is_empty() {
            anyhow::bail!("at least one [[meters]] entry is required");
        }

        let mut seen = HashSet::new();
        for meter in &self.meters {
            if meter.name.trim().is_empty() {
                anyhow::bail!("meter name must not be empty");
            }
            let identity = meter.identity();
            if !seen.insert(identity.unique_id.clone()) {
                anyhow::bail!("duplicate meter {} ({})", meter.name, identity.unique_id);
            }
            if meter.algorithm() == Algorithm::DeviceAware && !meter.class.eq_ignore_ascii_case("energy") {
                anyhow::bail!(
                    "meter {}: the device_aware algorithm is only available for energy meters",
                    meter.name
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
        [database]
        uri = "postgres://tracking@localhost/stats"
        max_connections = 4

        [store]
        dir = "state"

        [api]
        bind_addr = "127.0.0.1:8080"
    "#;

    fn with_meters(meters: &str) -> String {
        format!("{BASE}\n{meters}")
    }

    #[test]
    fn full_config_parses_with_defaults() {
        let cfg = AppConfig::from_toml_str(&with_meters(
            r#"
            [[meters]]
            name = "House Power"
            unit = "kWh"
            class = "energy"
            algorithm = "device_aware"
            known_device_entities = ["sensor.dishwasher_energy"]

            [[meters]]
            name = "Gas"
            unit = "m3"
            class = "gas"
            "#,
        ))
        .unwrap();

        assert_eq!(cfg.statistics.max_retries, 3);
        assert_eq!(cfg.statistics.timeout(), Duration::from_secs(10));
        assert!(cfg.metrics.is_none());
        assert_eq!(cfg.meters[0].algorithm(), Algorithm::DeviceAware);
        assert_eq!(cfg.meters[1].algorithm(), Algorithm::Linear);
        assert!(cfg.meters[1].known_device_entities.is_empty());
    }

    #[test]
    fn unknown_algorithm_falls_back_to_linear() {
        let cfg = AppConfig::from_toml_str(&with_meters(
            r#"
            [[meters]]
            name = "Water"
            unit = "L"
            class = "water"
            algorithm = "quadratic"
            "#,
        ))
        .unwrap();
        assert_eq!(cfg.meters[0].algorithm(), Algorithm::Linear);
    }

    #[test]
    fn device_aware_requires_energy_class() {
        let err = AppConfig::from_toml_str(&with_meters(
            r#"
            [[meters]]
            name = "Gas"
            unit = "m3"
            class = "gas"
            algorithm = "device_aware"
            "#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("only available for energy meters"));
    }

    #[test]
    fn duplicate_meters_are_rejected() {
        let err = AppConfig::from_toml_str(&with_meters(
            r#"
            [[meters]]
            name = "House Power"
            unit = "kWh"
            class = "energy"

            [[meters]]
            name = "house power"
            unit = "Wh"
            class = "Energy"
            "#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("duplicate meter"));
    }

    #[test]
    fn empty_meter_list_is_rejected() {
        let err = AppConfig::from_toml_str(&format!("meters = []\n{BASE}")).unwrap_err();
        assert!(err.to_string().contains("at least one"));
    }
}
