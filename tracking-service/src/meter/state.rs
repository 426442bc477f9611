use std::collections::VecDeque;

use tracking_client::domain::Datapoint;

use super::MeterError;

/// Number of previous readings kept for replay and extrapolation.
pub const MAX_PREVIOUS_READS: usize = 10;

/// Reading history of one meter.
///
/// `Default` is the uninitialized state (no reading accepted yet).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeterState {
    last_read: Option<Datapoint>,
    previous_reads: VecDeque<Datapoint>,
}

impl MeterState {
    /// Rebuild a state from persisted parts, keeping only the most recent
    /// [`MAX_PREVIOUS_READS`] previous readings.
    ///
    /// Entries that are not strictly earlier than the entry after them (or
    /// than `last_read`) are dropped with a warning, so the restored history
    /// is always strictly increasing in time.
    pub fn restore(last_read: Option<Datapoint>, previous_reads: Vec<Datapoint>) -> Self {
        let persisted = previous_reads.len();
        let mut ordered: VecDeque<Datapoint> = VecDeque::with_capacity(persisted);
        for reading in previous_reads {
            if ordered
                .back()
                .is_some_and(|prev| reading.timestamp() <= prev.timestamp())
            {
                continue;
            }
            ordered.push_back(reading);
        }
        if let Some(last) = last_read {
            while ordered
                .back()
                .is_some_and(|prev| prev.timestamp() >= last.timestamp())
            {
                ordered.pop_back();
            }
        }

        let dropped = persisted - ordered.len();
        if dropped > 0 {
            tracing::warn!(dropped, kept = ordered.len(), "dropped out of order readings from persisted history");
        }

        while ordered.len() > MAX_PREVIOUS_READS {
            ordered.pop_front();
        }
        Self {
            last_read,
            previous_reads: ordered,
        }
    }

    pub fn last_read(&self) -> Option<&Datapoint> {
        self.last_read.as_ref()
    }

    pub fn previous_reads(&self) -> &VecDeque<Datapoint> {
        &self.previous_reads
    }

    pub fn is_tracking(&self) -> bool {
        self.last_read.is_some()
    }

    /// State after accepting `reading`; `self` is left untouched.
    ///
    /// The current reading moves into the history, evicting the oldest entry
    /// once the history is full.
    pub fn with_reading(&self, reading: Datapoint) -> Result<MeterState, MeterError> {
        let mut next = self.clone();
        if let Some(last) = self.last_read {
            if reading.timestamp() <= last.timestamp() {
                return Err(MeterError::OutOfOrderReading {
                    last: last.timestamp(),
                    new: reading.timestamp(),
                });
            }
            next.previous_reads.push_back(last);
            if next.previous_reads.len() > MAX_PREVIOUS_READS {
                next.previous_reads.pop_front();
            }
        }
        next.last_read = Some(reading);
        Ok(next)
    }

    /// Previous readings followed by the current one, oldest first.
    pub fn history(&self) -> Vec<Datapoint> {
        self.previous_reads
            .iter()
            .copied()
            .chain(self.last_read)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::{macros::datetime, Duration, OffsetDateTime};

    const START: OffsetDateTime = datetime!(2023-10-01 00:00 UTC);

    fn reading(i: i64) -> Datapoint {
        Datapoint::new(100.0 + i as f64, START + Duration::hours(i * 7))
    }

    #[test]
    fn first_reading_starts_tracking_without_history() {
        let state = MeterState::default().with_reading(reading(0)).unwrap();
        assert!(state.is_tracking());
        assert!(state.previous_reads().is_empty());
        assert_eq!(state.last_read(), Some(&reading(0)));
    }

    #[test]
    fn out_of_order_reading_is_rejected_without_mutation() {
        let state = MeterState::default()
            .with_reading(reading(1))
            .unwrap()
            .with_reading(reading(2))
            .unwrap();
        let before = state.clone();

        for ts in [reading(2).timestamp(), reading(1).timestamp()] {
            let res = state.with_reading(Datapoint::new(999.0, ts));
            assert!(matches!(res, Err(MeterError::OutOfOrderReading { .. })));
        }
        assert_eq!(state, before);
    }

    #[test]
    fn history_is_bounded_to_the_most_recent_readings() {
        let mut state = MeterState::default();
        for i in 0..25 {
            state = state.with_reading(reading(i)).unwrap();
            assert!(state.previous_reads().len() <= MAX_PREVIOUS_READS);
        }

        let expected: Vec<Datapoint> = (14..24).map(reading).collect();
        assert_eq!(state.previous_reads().iter().copied().collect::<Vec<_>>(), expected);
        assert_eq!(state.last_read(), Some(&reading(24)));
    }

    #[test]
    fn history_appends_current_reading_last() {
        let state = MeterState::restore(Some(reading(3)), vec![reading(1), reading(2)]);
        assert_eq!(state.history(), vec![reading(1), reading(2), reading(3)]);
        assert!(MeterState::default().history().is_empty());
    }

    #[test]
    fn restore_trims_oversized_history() {
        let previous: Vec<Datapoint> = (0..12).map(reading).collect();
        let state = MeterState::restore(Some(reading(12)), previous);
        assert_eq!(state.previous_reads().len(), MAX_PREVIOUS_READS);
        assert_eq!(state.previous_reads().front(), Some(&reading(2)));
    }

    #[test]
    fn restore_drops_readings_that_break_the_order() {
        let previous = vec![
            reading(1),
            Datapoint::new(500.0, reading(1).timestamp()),
            reading(0),
            reading(2),
            reading(4),
        ];
        let state = MeterState::restore(Some(reading(4)), previous);
        assert_eq!(state.history(), vec![reading(1), reading(2), reading(4)]);
    }

    #[test]
    fn restore_without_last_read_keeps_ordered_history() {
        let state = MeterState::restore(None, vec![reading(2), reading(2), reading(3)]);
        assert_eq!(state.history(), vec![reading(2), reading(3)]);
    }
}
