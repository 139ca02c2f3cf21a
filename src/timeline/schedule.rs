//! Sorted storage for scheduled event occurrences.
//!
//! Occurrences are kept ordered by time. Simultaneous occurrences keep their
//! insertion order, so the source order of statements decides which of two
//! events at the same millisecond fires first.

use super::types::ScheduledEvent;

/// Time-ordered occurrences.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schedule {
    events: Vec<ScheduledEvent>,
}

impl Schedule {
    /// Create an empty schedule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an occurrence after every occurrence with the same or an earlier time.
    pub fn insert(&mut self, event: ScheduledEvent) {
        let pos = self.events.partition_point(|e| e.time_ms <= event.time_ms);
        self.events.insert(pos, event);
    }

    /// The occurrence with the latest time; among ties, the one inserted last.
    pub fn latest(&self) -> Option<&ScheduledEvent> {
        self.events.last()
    }

    /// Times of every occurrence of the given definition, in time order.
    pub fn times_of(&self, event_index: usize) -> Vec<f64> {
        self.events
            .iter()
            .filter(|e| e.event_index == event_index)
            .map(|e| e.time_ms)
            .collect()
    }

    /// Occurrences in `[from, to)`, in time order.
    pub fn between(&self, from: f64, to: f64) -> &[ScheduledEvent] {
        let start = self.events.partition_point(|e| e.time_ms < from);
        let end = self.events.partition_point(|e| e.time_ms < to).max(start);
        &self.events[start..end]
    }

    pub fn as_slice(&self) -> &[ScheduledEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
