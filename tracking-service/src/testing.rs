//! In-memory collaborators for unit tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use time::OffsetDateTime;
use tracking_client::domain::{StatisticMetadata, StatisticRow};

use crate::{
    fitting::HourlyConsumption,
    meter::MeterServices,
    pipeline::PipelineError,
    sinks::StatisticsSink,
    sources::DeviceConsumptionSource,
    store::{AttributeStore, MeterAttributes, StoreError},
};

#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Submit {
        metadata: StatisticMetadata,
        rows: Vec<StatisticRow>,
    },
    Clear(String),
}

#[derive(Default)]
pub struct RecordingSink {
    pub calls: Mutex<Vec<SinkCall>>,
    pub fail_submit: AtomicBool,
    pub fail_clear: AtomicBool,
    pub stall_submit: AtomicBool,
    /// Yield to the scheduler before recording, so concurrent callers interleave.
    pub yield_submit: AtomicBool,
}

impl RecordingSink {
    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn submitted_rows(&self) -> Vec<Vec<StatisticRow>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SinkCall::Submit { rows, .. } => Some(rows),
                SinkCall::Clear(_) => None,
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl StatisticsSink for RecordingSink {
    async fn submit(&self, metadata: &StatisticMetadata, rows: &[StatisticRow]) -> Result<(), PipelineError> {
        if self.stall_submit.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.yield_submit.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(PipelineError::Sink("store unavailable".to_string()));
        }
        self.calls.lock().unwrap().push(SinkCall::Submit {
            metadata: metadata.clone(),
            rows: rows.to_vec(),
        });
        Ok(())
    }

    async fn clear(&self, statistic_id: &str) -> Result<(), PipelineError> {
        if self.fail_clear.load(Ordering::SeqCst) {
            return Err(PipelineError::Sink("clear rejected".to_string()));
        }
        self.calls.lock().unwrap().push(SinkCall::Clear(statistic_id.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct StaticDeviceSource {
    pub hourly: HourlyConsumption,
    pub fail: AtomicBool,
    pub stall: AtomicBool,
    pub queries: Mutex<Vec<(Vec<String>, OffsetDateTime, OffsetDateTime)>>,
}

impl StaticDeviceSource {
    pub fn with(hourly: HourlyConsumption) -> Self {
        Self {
            hourly,
            ..Default::default()
        }
    }

    pub fn queries(&self) -> Vec<(Vec<String>, OffsetDateTime, OffsetDateTime)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl DeviceConsumptionSource for StaticDeviceSource {
    async fn hourly_consumption(
        &self,
        entity_ids: &[String],
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<HourlyConsumption, PipelineError> {
        self.queries
            .lock()
            .unwrap()
            .push((entity_ids.to_vec(), start, end));
        if self.stall.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(PipelineError::Source("recorder offline".to_string()));
        }
        Ok(self.hourly.clone())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    pub documents: Mutex<HashMap<String, MeterAttributes>>,
    pub fail_save: AtomicBool,
}

impl MemoryStore {
    pub fn get(&self, key: &str) -> Option<MeterAttributes> {
        self.documents.lock().unwrap().get(key).cloned()
    }
}

#[async_trait::async_trait]
impl AttributeStore for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<MeterAttributes>, StoreError> {
        Ok(self.get(key))
    }

    async fn save(&self, key: &str, attributes: &MeterAttributes) -> Result<(), StoreError> {
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only filesystem",
            )));
        }
        self.documents
            .lock()
            .unwrap()
            .insert(key.to_string(), attributes.clone());
        Ok(())
    }
}

pub struct Harness {
    pub sink: Arc<RecordingSink>,
    pub devices: Arc<StaticDeviceSource>,
    pub store: Arc<MemoryStore>,
}

impl Harness {
    pub fn new(devices: StaticDeviceSource) -> Self {
        Self {
            sink: Arc::new(RecordingSink::default()),
            devices: Arc::new(devices),
            store: Arc::new(MemoryStore::default()),
        }
    }

    pub fn services(&self) -> MeterServices {
        MeterServices {
            sink: self.sink.clone(),
            devices: self.devices.clone(),
            store: self.store.clone(),
            timeout: Duration::from_millis(200),
        }
    }
}
