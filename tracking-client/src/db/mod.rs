pub mod statistics_queries;

pub use statistics_queries::{clear_statistics, device_consumption, insert_statistics};
