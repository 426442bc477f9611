mod datapoint;
mod statistic;

pub use datapoint::{hour_start, Datapoint, InvalidDatapoint};
pub use statistic::{DeviceConsumptionRow, StatisticMetadata, StatisticRow};
