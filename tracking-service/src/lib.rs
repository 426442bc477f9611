pub mod algorithms;
pub mod api;
pub mod config;
pub mod fitting;
pub mod meter;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod registry;
pub mod sinks;
pub mod sources;
pub mod store;
pub mod transform;

#[cfg(test)]
mod testing;

pub use pipeline::{Envelope, Pipeline};
