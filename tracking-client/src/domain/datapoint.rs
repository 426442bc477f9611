use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime, Time, UtcOffset};

/// A cumulative meter value observed (or reconstructed) at an instant.
///
/// Timestamps are normalized to UTC on construction. Ordering between
/// datapoints is by timestamp only; values are allowed to plateau.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDatapoint")]
pub struct Datapoint {
    value: f64,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
#[error("datapoint value must be finite, got {0}")]
pub struct InvalidDatapoint(pub f64);

#[derive(Deserialize)]
struct RawDatapoint {
    value: f64,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
}

impl TryFrom<RawDatapoint> for Datapoint {
    type Error = InvalidDatapoint;

    fn try_from(raw: RawDatapoint) -> Result<Self, Self::Error> {
        Datapoint::try_new(raw.value, raw.timestamp)
    }
}

impl Datapoint {
    pub fn new(value: f64, timestamp: OffsetDateTime) -> Self {
        Self {
            value,
            timestamp: timestamp.to_offset(UtcOffset::UTC),
        }
    }

    /// Like [`Datapoint::new`], rejecting NaN and infinite values.
    pub fn try_new(value: f64, timestamp: OffsetDateTime) -> Result<Self, InvalidDatapoint> {
        if !value.is_finite() {
            return Err(InvalidDatapoint(value));
        }
        Ok(Self::new(value, timestamp))
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    /// Same value, moved to another instant.
    pub fn at(&self, timestamp: OffsetDateTime) -> Self {
        Self::new(self.value, timestamp)
    }
}

/// Start of the UTC hour containing `ts` (minutes, seconds and sub-seconds zeroed).
pub fn hour_start(ts: OffsetDateTime) -> OffsetDateTime {
    let utc = ts.to_offset(UtcOffset::UTC);
    utc.replace_time(Time::MIDNIGHT + Duration::hours(i64::from(utc.hour())))
}
