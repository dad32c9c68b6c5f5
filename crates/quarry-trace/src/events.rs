//! Structured lifecycle event records.
//!
//! The decorator records one event per allocate/deallocate with a
//! monotonic decision id and a machine-readable outcome label. Records
//! accumulate in memory until the embedding application drains them;
//! formatting and shipping is the logging collaborator's job.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventLevel {
    Trace,
    Warn,
    Error,
}

/// One allocate/deallocate lifecycle record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventRecord {
    /// Monotonic per-decorator event id, starting at 1.
    pub decision_id: u64,
    /// Severity.
    pub level: EventLevel,
    /// Operation: `"allocate"` or `"deallocate"`.
    pub op: &'static str,
    /// Machine-readable outcome label.
    pub outcome: &'static str,
    /// Block address involved, when known.
    pub addr: Option<usize>,
    /// Requested or recorded size, when known.
    pub size: Option<usize>,
    /// Snapshot: live allocations after the operation.
    pub live_allocations: usize,
    /// Snapshot: live bytes after the operation.
    pub live_bytes: usize,
}

/// Append-only event buffer shared behind the decorator.
#[derive(Debug, Default)]
pub(crate) struct EventLog {
    next_id: AtomicU64,
    records: Mutex<Vec<EventRecord>>,
}

impl EventLog {
    pub(crate) fn record(
        &self,
        level: EventLevel,
        op: &'static str,
        outcome: &'static str,
        addr: Option<usize>,
        size: Option<usize>,
        live_allocations: usize,
        live_bytes: usize,
    ) {
        let decision_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.records.lock().push(EventRecord {
            decision_id,
            level,
            op,
            outcome,
            addr,
            size,
            live_allocations,
            live_bytes,
        });
    }

    pub(crate) fn snapshot(&self) -> Vec<EventRecord> {
        self.records.lock().clone()
    }

    pub(crate) fn drain(&self) -> Vec<EventRecord> {
        std::mem::take(&mut *self.records.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_ids_are_monotonic_from_one() {
        let log = EventLog::default();
        log.record(EventLevel::Trace, "allocate", "success", None, Some(8), 1, 8);
        log.record(EventLevel::Warn, "allocate", "oom", None, Some(8), 1, 8);
        let records = log.snapshot();
        assert_eq!(records[0].decision_id, 1);
        assert_eq!(records[1].decision_id, 2);
    }

    #[test]
    fn test_drain_empties_the_buffer() {
        let log = EventLog::default();
        log.record(EventLevel::Trace, "deallocate", "success", None, None, 0, 0);
        assert_eq!(log.drain().len(), 1);
        assert!(log.snapshot().is_empty());
    }

    #[test]
    fn test_records_serialize() {
        let log = EventLog::default();
        log.record(
            EventLevel::Error,
            "deallocate",
            "double_free",
            Some(0x1000),
            None,
            3,
            96,
        );
        let json = serde_json::to_value(&log.snapshot()[0]).unwrap();
        assert_eq!(json["outcome"], "double_free");
        assert_eq!(json["level"], "Error");
    }
}
