use std::path::PathBuf;

use async_stream::stream;
use futures::Stream;
use tokio::{fs::File, io::{AsyncBufReadExt, BufReader}};
use tracking_client::domain::Datapoint;

use crate::pipeline::{Envelope, PipelineError, Source};

/// NDJSON history of manual readings.
///
/// Each non-blank line is `{"value": <f64>, "timestamp": "<RFC 3339>"}`.
pub struct ReadingsNdjsonFileSource {
    path: PathBuf,
}

impl ReadingsNdjsonFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl Source<Datapoint> for ReadingsNdjsonFileSource {
    async fn stream(
        &self,
    ) -> std::pin::Pin<Box<dyn Stream<Item = Result<Envelope<Datapoint>, PipelineError>> + Send>> {
        let path = self.path.clone();
        let s = stream! {
            let file = match File::open(&path).await {
                Ok(file) => file,
                Err(e) => {
                    yield Err(PipelineError::Source(format!("failed to open readings file: {e}")));
                    return;
                }
            };
            let reader = BufReader::new(file);
            let mut lines = reader.lines();
            let mut line_no: u64 = 0;

            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(PipelineError::Source(format!("failed to read readings line: {e}")));
                        break;
                    }
                };
                line_no += 1;
                if line.trim().is_empty() {
                    continue;
                }
                let origin = format!("{}:{line_no}", path.display());
                // A bad line is reported and the rest of the file still imported.
                match serde_json::from_str::<Datapoint>(&line) {
                    Ok(reading) => {
                        yield Ok(Envelope::new(reading, origin));
                    }
                    Err(e) => {
                        metrics::counter!("import_readings_parse_errors_total").increment(1);
                        yield Err(PipelineError::Source(format!("{origin}: failed to parse reading: {e}")));
                    }
                }
            }
        };

        Box::pin(s)
    }
}
