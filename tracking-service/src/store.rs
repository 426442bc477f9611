//! Persisted meter attributes, reloaded once at startup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracking_client::domain::Datapoint;

use crate::algorithms::Algorithm;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("attribute store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("attribute store json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Observable state of a meter as written after every accepted reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterAttributes {
    pub meter_name: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_updated: Option<OffsetDateTime>,
    pub last_read: Option<f64>,
    #[serde(default)]
    pub previous_reads: Vec<Datapoint>,
    #[serde(default)]
    pub algorithm: Algorithm,
    #[serde(default)]
    pub known_device_entities: Vec<String>,
}

#[async_trait::async_trait]
pub trait AttributeStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<MeterAttributes>, StoreError>;
    async fn save(&self, key: &str, attributes: &MeterAttributes) -> Result<(), StoreError>;
}

/// One pretty-printed JSON document per meter under `dir`.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash mid-write never leaves a truncated document behind.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait::async_trait]
impl AttributeStore for JsonFileStore {
    async fn load(&self, key: &str) -> Result<Option<MeterAttributes>, StoreError> {
        let path = self.path_for(key);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    async fn save(&self, key: &str, attributes: &MeterAttributes) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(key);
        let tmp = tmp_path(&path);
        let raw = serde_json::to_vec_pretty(attributes)?;

        tokio::fs::write(&tmp, &raw).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
