use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::entry::{EntryRef, LogEntry};

/// Tail of the chain as last committed by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainHead {
    pub seq: i64,
    pub hash: String,
    pub timestamp: DateTime<Utc>,
}

/// Result of a tolerant read over the chain.
///
/// `entries` holds every row decoded in order up to the first row that could
/// not be decoded, which is reported in `unreadable`.
#[derive(Debug, Clone, Default)]
pub struct ChainScan {
    pub entries: Vec<LogEntry>,
    pub unreadable: Option<UnreadableRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnreadableRow {
    pub entry: EntryRef,
    pub reason: String,
}
