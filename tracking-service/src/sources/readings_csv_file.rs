use std::{fs::File, path::PathBuf};

use csv::StringRecord;
use futures::Stream;
use time::OffsetDateTime;
use tracking_client::domain::Datapoint;

use crate::pipeline::{Envelope, PipelineError, Source};

/// CSV history of manual readings.
///
/// Expected header columns (by name):
/// - timestamp (RFC3339 timestamp)
/// - value (cumulative meter reading)
pub struct ReadingsCsvFileSource {
    path: PathBuf,
}

impl ReadingsCsvFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

fn record_to_reading(record: &StringRecord, headers: &StringRecord) -> Result<Datapoint, PipelineError> {
    let get = |name: &str| -> Result<&str, PipelineError> {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .and_then(|idx| record.get(idx))
            .ok_or_else(|| PipelineError::Source(format!("missing column '{name}' in CSV record")))
    };

    let ts_str = get("timestamp")?;
    let ts = OffsetDateTime::parse(ts_str.trim(), &time::format_description::well_known::Rfc3339)
        .map_err(|e| PipelineError::Source(format!("invalid timestamp '{ts_str}': {e}")))?;

    let value_str = get("value")?;
    let value: f64 = value_str
        .trim()
        .parse()
        .map_err(|e| PipelineError::Source(format!("invalid value '{value_str}': {e}")))?;

    Datapoint::try_new(value, ts).map_err(|e| PipelineError::Source(e.to_string()))
}

#[async_trait::async_trait]
impl Source<Datapoint> for ReadingsCsvFileSource {
    async fn stream(
        &self,
    ) -> std::pin::Pin<Box<dyn Stream<Item = Result<Envelope<Datapoint>, PipelineError>> + Send>> {
        // Reading histories are small; the blocking reader stays on this task.
        let path = self.path.clone();
        let s = async_stream::stream! {
            let file = match File::open(&path) {
                Ok(file) => file,
                Err(e) => {
                    yield Err(PipelineError::Source(format!("failed to open CSV file: {e}")));
                    return;
                }
            };
            // Short or long rows reach `record_to_reading` and fail there, per row.
            let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(file);
            let headers = match rdr.headers() {
                Ok(headers) => headers.clone(),
                Err(e) => {
                    yield Err(PipelineError::Source(format!("failed to read CSV headers: {e}")));
                    return;
                }
            };

            for result in rdr.records() {
                let record = match result {
                    Ok(record) => record,
                    Err(e) if e.is_io_error() => {
                        yield Err(PipelineError::Source(format!("failed to read CSV record: {e}")));
                        break;
                    }
                    Err(e) => {
                        metrics::counter!("import_readings_parse_errors_total").increment(1);
                        yield Err(PipelineError::Source(format!("malformed CSV record: {e}")));
                        continue;
                    }
                };
                let line = record.position().map(|p| p.line()).unwrap_or_default();
                let origin = format!("{}:{line}", path.display());

                match record_to_reading(&record, &headers) {
                    Ok(reading) => {
                        yield Ok(Envelope::new(reading, origin));
                    }
                    Err(e) => {
                        metrics::counter!("import_readings_parse_errors_total").increment(1);
                        yield Err(PipelineError::Source(format!("{origin}: {e}")));
                    }
                }
            }
        };

        Box::pin(s)
    }
}
