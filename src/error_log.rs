//! Per-device error log.
//!
//! Every failed vendor call is appended here with the context of the
//! operation that issued it. The log is a bounded ring: once `capacity`
//! records are held, the oldest is evicted and counted in
//! [`ErrorLog::evicted`].

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::DcamErrorCode;

/// Default number of records retained per device.
pub const DEFAULT_ERROR_LOG_CAPACITY: usize = 256;

/// One failed device call.
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    /// Vendor code.
    pub code: DcamErrorCode,
    /// What was being attempted.
    pub context: String,
    /// When the failure was recorded.
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
struct Ring {
    records: VecDeque<ErrorRecord>,
    evicted: u64,
}

/// Bounded, append-only error log shared by everything that talks to one device.
#[derive(Debug)]
pub struct ErrorLog {
    capacity: usize,
    ring: Mutex<Ring>,
}

impl ErrorLog {
    /// Create a log retaining at most `capacity` records (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            ring: Mutex::new(Ring {
                records: VecDeque::with_capacity(capacity.min(1024)),
                evicted: 0,
            }),
        }
    }

    /// Append a record, evicting the oldest one when full.
    pub fn record(&self, code: DcamErrorCode, context: impl Into<String>) {
        let record = ErrorRecord {
            code,
            context: context.into(),
            timestamp: Utc::now(),
        };
        let mut ring = self.ring.lock();
        if ring.records.len() == self.capacity {
            ring.records.pop_front();
            ring.evicted += 1;
        }
        ring.records.push_back(record);
    }

    /// Maximum retained records.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.ring.lock().records.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.ring.lock().records.is_empty()
    }

    /// Number of records dropped to stay within capacity.
    pub fn evicted(&self) -> u64 {
        self.ring.lock().evicted
    }

    /// Most recent record, if any.
    pub fn last(&self) -> Option<ErrorRecord> {
        self.ring.lock().records.back().cloned()
    }

    /// Copy of the retained records, oldest first.
    pub fn snapshot(&self) -> Vec<ErrorRecord> {
        self.ring.lock().records.iter().cloned().collect()
    }
}

impl Default for ErrorLog {
    fn default() -> Self {
        Self::new(DEFAULT_ERROR_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let log = ErrorLog::new(4);
        assert!(log.is_empty());
        log.record(DcamErrorCode::BUSY, "start capture");
        log.record(DcamErrorCode::NOT_WRITABLE, "set BINNING");

        let records = log.snapshot();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].code, DcamErrorCode::BUSY);
        assert_eq!(records[1].context, "set BINNING");
        assert_eq!(log.last().map(|r| r.code), Some(DcamErrorCode::NOT_WRITABLE));
    }

    #[test]
    fn test_ring_evicts_oldest() {
        let log = ErrorLog::new(3);
        for i in 0..5 {
            log.record(DcamErrorCode::TIMEOUT, format!("wait #{i}"));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.evicted(), 2);
        let contexts: Vec<_> = log.snapshot().into_iter().map(|r| r.context).collect();
        assert_eq!(contexts, vec!["wait #2", "wait #3", "wait #4"]);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let log = ErrorLog::new(0);
        assert_eq!(log.capacity(), 1);
        log.record(DcamErrorCode::ABORT, "a");
        log.record(DcamErrorCode::ABORT, "b");
        assert_eq!(log.len(), 1);
        assert_eq!(log.last().map(|r| r.context), Some("b".to_string()));
    }
}
