pub mod device_consumption;
pub mod readings_csv_file;
pub mod readings_ndjson_file;

use std::{path::Path, pin::Pin};

use futures::Stream;
use tracking_client::domain::Datapoint;

use crate::pipeline::{Envelope, PipelineError, Source};

pub use device_consumption::{DeviceConsumptionSource, PgDeviceConsumptionSource};
pub use readings_csv_file::ReadingsCsvFileSource;
pub use readings_ndjson_file::ReadingsNdjsonFileSource;

/// A file of historical readings, chosen by extension.
pub enum ReadingsFileSource {
    Csv(ReadingsCsvFileSource),
    Ndjson(ReadingsNdjsonFileSource),
}

impl ReadingsFileSource {
    /// `.csv` files are read as CSV, everything else as NDJSON.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv {
            ReadingsFileSource::Csv(ReadingsCsvFileSource::new(path))
        } else {
            ReadingsFileSource::Ndjson(ReadingsNdjsonFileSource::new(path))
        }
    }
}

#[async_trait::async_trait]
impl Source<Datapoint> for ReadingsFileSource {
    async fn stream(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<Envelope<Datapoint>, PipelineError>> + Send>> {
        match self {
            ReadingsFileSource::Csv(s) => s.stream().await,
            ReadingsFileSource::Ndjson(s) => s.stream().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_source_is_chosen_by_extension() {
        assert!(matches!(
            ReadingsFileSource::from_path("history/gas.CSV"),
            ReadingsFileSource::Csv(_)
        ));
        assert!(matches!(
            ReadingsFileSource::from_path("history/gas.ndjson"),
            ReadingsFileSource::Ndjson(_)
        ));
        assert!(matches!(
            ReadingsFileSource::from_path("history/gas"),
            ReadingsFileSource::Ndjson(_)
        ));
    }
}
