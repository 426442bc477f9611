use crate::pipeline::{Envelope, PipelineError, Transform};
use time::macros::datetime;
use tracking_client::domain::Datapoint;

/// Pure validation of a manually entered meter reading.
///
/// Rules:
/// - the cumulative value must be non-negative.
/// - timestamp must be within a broad sanity window [2000-01-01, 2100-01-01].
pub fn validate_reading(reading: &Datapoint) -> Result<(), PipelineError> {
    if reading.value() < 0.0 {
        return Err(PipelineError::Transform(
            "meter reading must be non-negative".to_string(),
        ));
    }

    let min_ts = datetime!(2000-01-01 00:00:00 UTC);
    let max_ts = datetime!(2100-01-01 00:00:00 UTC);

    if reading.timestamp() < min_ts || reading.timestamp() > max_ts {
        return Err(PipelineError::Transform("timestamp out of allowed range".to_string()));
    }

    Ok(())
}

#[derive(Clone, Default)]
pub struct ReadingValidation;

#[async_trait::async_trait]
impl Transform<Datapoint, Datapoint> for ReadingValidation {
    async fn apply(&self, input: Envelope<Datapoint>) -> Result<Envelope<Datapoint>, PipelineError> {
        match validate_reading(&input.payload) {
            Ok(()) => Ok(input),
            Err(e) => {
                metrics::counter!("validation_readings_rejected_total").increment(1);
                Err(PipelineError::Transform(format!("{}: {e}", input.origin)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_validation_accepts_valid_reading() {
        let reading = Datapoint::new(412.7, datetime!(2024-01-01 00:00:00 UTC));
        assert!(validate_reading(&reading).is_ok());
    }

    #[test]
    fn reading_validation_accepts_zero() {
        let reading = Datapoint::new(0.0, datetime!(2024-01-01 00:00:00 UTC));
        assert!(validate_reading(&reading).is_ok());
    }

    #[test]
    fn reading_validation_rejects_negative_value() {
        let reading = Datapoint::new(-0.1, datetime!(2024-01-01 00:00:00 UTC));
        assert!(matches!(validate_reading(&reading), Err(PipelineError::Transform(_))));
    }

    #[test]
    fn reading_validation_rejects_out_of_range_ts() {
        let reading = Datapoint::new(1.0, datetime!(1800-01-01 00:00:00 UTC));
        assert!(matches!(validate_reading(&reading), Err(PipelineError::Transform(_))));
    }

    #[tokio::test]
    async fn transform_prefixes_errors_with_origin() {
        let env = Envelope::new(
            Datapoint::new(-5.0, datetime!(2024-01-01 00:00:00 UTC)),
            "readings.csv:3",
        );
        let err = ReadingValidation.apply(env).await.unwrap_err();
        assert!(err.to_string().contains("readings.csv:3"));
    }
}
