//! Inclusive time windows for partial verification and export.

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::entry::truncate_timestamp;
use crate::error::{AuditError, AuditResult};

/// Closed interval `[start, end]` over entry timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeRange {
    /// Rejects `start > end` before anything touches the store.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> AuditResult<Self> {
        if start > end {
            return Err(AuditError::invalid_range(start, end));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }

    /// Bounds in the fixed-width text form the store compares against.
    ///
    /// Stored timestamps are whole microseconds, so `start` rounds up and `end`
    /// rounds down; the store filter then selects exactly what `contains` accepts.
    pub(crate) fn store_bounds(&self) -> (String, String) {
        let mut start = truncate_timestamp(self.start);
        if start < self.start {
            start += TimeDelta::microseconds(1);
        }
        (format_timestamp(&start), format_timestamp(&truncate_timestamp(self.end)))
    }
}

/// Fixed-width RFC 3339 with microseconds and a `Z` suffix.
///
/// This is both the hashed representation and the stored one, so text
/// ordering in the store matches time ordering.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}
