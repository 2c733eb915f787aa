use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::{Event, EventKind, RecorderError, Result};

/// Ordered sequence of [`Event`]s captured during one recording session.
///
/// Insertion order is chronological order and is authoritative: events that
/// share an offset are replayed in the order they were appended. Offsets
/// never decrease along the sequence.
///
/// Only the recorder appends to a record, and only while capturing. Once
/// capture stops the record is handed out as an `Arc<Record>` and is
/// read-only from then on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    created_at_millis: u64,
    events: Vec<Event>,
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl Record {
    /// Creates an empty record stamped with the current wall-clock time.
    pub fn new() -> Self {
        let created_at_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or_default();
        Self::with_created_at(created_at_millis)
    }

    pub fn with_created_at(created_at_millis: u64) -> Self {
        Self {
            created_at_millis,
            events: Vec::new(),
        }
    }

    /// Builds a record from an existing event sequence, rejecting sequences
    /// whose offsets go backwards.
    pub fn from_events(created_at_millis: u64, events: Vec<Event>) -> Result<Self> {
        if let Some(index) = events
            .windows(2)
            .position(|pair| pair[1].offset_millis() < pair[0].offset_millis())
        {
            return Err(RecorderError::corrupt(format!(
                "event {} goes back in time ({} ms after {} ms)",
                index + 1,
                events[index + 1].offset_millis(),
                events[index].offset_millis()
            )));
        }

        Ok(Self {
            created_at_millis,
            events,
        })
    }

    /// Appends an event. An offset smaller than the previous event's is
    /// raised to that offset so the sequence stays monotonic.
    pub(crate) fn push(&mut self, event: Event) {
        let floor = self.last_offset();
        if event.offset_millis() < floor {
            tracing::warn!(
                offset = event.offset_millis(),
                floor,
                "clamping out-of-order event offset"
            );
            self.events.push(Event::new(floor, *event.action()));
        } else {
            self.events.push(event);
        }
    }

    /// Unix timestamp (milliseconds) at which the recording started.
    pub fn created_at_millis(&self) -> u64 {
        self.created_at_millis
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Offset of the final event, i.e. the length of one replay at 1x.
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.last_offset())
    }

    pub fn summary(&self) -> RecordSummary {
        let mut summary = RecordSummary {
            created_at_millis: self.created_at_millis,
            duration_millis: self.last_offset(),
            ..Default::default()
        };
        for event in &self.events {
            match event.kind() {
                EventKind::PointerMove => summary.moves += 1,
                EventKind::ButtonPress => summary.presses += 1,
                EventKind::ButtonRelease => summary.releases += 1,
                EventKind::Wheel => summary.wheels += 1,
            }
        }
        summary
    }

    fn last_offset(&self) -> u64 {
        self.events
            .last()
            .map(Event::offset_millis)
            .unwrap_or_default()
    }
}

/// Per-kind event counts and timing metadata of a [`Record`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub created_at_millis: u64,
    pub duration_millis: u64,
    pub moves: usize,
    pub presses: usize,
    pub releases: usize,
    pub wheels: usize,
}

impl RecordSummary {
    pub fn total_events(&self) -> usize {
        self.moves + self.presses + self.releases + self.wheels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MouseButton;

    #[test]
    fn push_keeps_offsets_monotonic() {
        let mut record = Record::with_created_at(0);
        record.push(Event::pointer_move(40, 1, 1));
        record.push(Event::pointer_move(30, 2, 2));

        let offsets: Vec<u64> = record.events().iter().map(Event::offset_millis).collect();
        assert_eq!(offsets, vec![40, 40]);
        assert_eq!(record.events()[1].action().position(), Some((2, 2)));
    }

    #[test]
    fn from_events_rejects_decreasing_offsets() {
        let err = Record::from_events(
            0,
            vec![Event::pointer_move(10, 0, 0), Event::pointer_move(5, 0, 0)],
        )
        .unwrap_err();
        assert!(matches!(err, RecorderError::CorruptData(_)));
    }

    #[test]
    fn summary_counts_kinds_and_duration() {
        let record = Record::from_events(
            7,
            vec![
                Event::pointer_move(0, 10, 10),
                Event::button_press(50, 10, 10, MouseButton::Left),
                Event::button_release(120, 10, 10, MouseButton::Left),
                Event::wheel(120, 2),
            ],
        )
        .unwrap();

        let summary = record.summary();
        assert_eq!(summary.created_at_millis, 7);
        assert_eq!(summary.duration_millis, 120);
        assert_eq!(summary.total_events(), 4);
        assert_eq!(summary.wheels, 1);
        assert_eq!(record.duration(), Duration::from_millis(120));
    }

    #[test]
    fn empty_record_has_zero_duration() {
        let record = Record::new();
        assert!(record.is_empty());
        assert_eq!(record.duration(), Duration::ZERO);
        assert!(record.created_at_millis() > 0);
    }
}
