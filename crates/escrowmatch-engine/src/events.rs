//! Append-only event log.

use escrowmatch_types::{EngineEvent, EventRecord};

/// Committed events in sequence order.
///
/// Only the sequence counter survives a snapshot; the records themselves are
/// for the API layer to drain.
#[derive(Debug, Default)]
pub struct EventLog {
    records: Vec<EventRecord>,
    last_sequence: u64,
}

impl EventLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue numbering after `last_sequence`.
    #[must_use]
    pub fn resume(last_sequence: u64) -> Self {
        Self {
            records: Vec::new(),
            last_sequence,
        }
    }

    /// Append `event`, returning its sequence number.
    pub fn append(&mut self, event: EngineEvent) -> u64 {
        self.last_sequence += 1;
        tracing::debug!(sequence = self.last_sequence, event = event.name(), "Event appended");
        self.records.push(EventRecord {
            sequence: self.last_sequence,
            event,
        });
        self.last_sequence
    }

    #[must_use]
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    #[must_use]
    pub fn all(&self) -> &[EventRecord] {
        &self.records
    }

    /// Records with `sequence > after`.
    #[must_use]
    pub fn since(&self, after: u64) -> &[EventRecord] {
        let start = self.records.partition_point(|r| r.sequence <= after);
        &self.records[start..]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use escrowmatch_types::AccountId;

    use super::*;

    fn paused() -> EngineEvent {
        EngineEvent::TradingPaused {
            by: AccountId::new(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn sequences_start_at_one() {
        let mut log = EventLog::new();
        assert_eq!(log.append(paused()), 1);
        assert_eq!(log.append(paused()), 2);
        assert_eq!(log.last_sequence(), 2);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn since_filters_by_sequence() {
        let mut log = EventLog::new();
        for _ in 0..5 {
            log.append(paused());
        }
        let tail: Vec<u64> = log.since(3).iter().map(|r| r.sequence).collect();
        assert_eq!(tail, vec![4, 5]);
        assert!(log.since(5).is_empty());
        assert_eq!(log.since(0).len(), 5);
    }

    #[test]
    fn resume_continues_numbering() {
        let mut log = EventLog::resume(41);
        assert!(log.is_empty());
        assert_eq!(log.append(paused()), 42);
    }
}
