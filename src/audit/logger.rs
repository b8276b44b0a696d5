//! Audit Logger
//!
//! Appends signed, hash-chained entries to the audit store and exposes the
//! read-only verification and export operations over it.
//!
//! Appends are optimistic: read the head, seal a candidate that follows it,
//! insert once. The store's uniqueness on `seq` and `previous_hash` admits
//! exactly one successor per head, so a writer that loses the race gets a
//! conflict and starts over from a fresh head. No in-process lock is held, and
//! the head is never cached between calls.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::audit::entry::{LogEntry, NewEvent};
use crate::audit::export::{export_entries, ExportFormat, ExportPayload};
use crate::audit::range::TimeRange;
use crate::audit::signer::{SignatureVerifier, Signer, SignerVerifier};
use crate::audit::verify::{
    verify_entries, BreakKind, ChainBreak, VerificationResult, VerificationScope,
};
use crate::database::Database;
use crate::error::{AuditError, AuditResult};

pub const DEFAULT_MAX_APPEND_RETRIES: u32 = 16;

/// Chain writer and read facade over one audit store
#[derive(Clone)]
pub struct AuditLogger {
    database: Database,
    signer: Arc<dyn Signer>,
    max_append_retries: u32,
    verify_signatures: bool,
}

impl AuditLogger {
    pub fn new(database: Database, signer: Arc<dyn Signer>) -> Self {
        Self {
            database,
            signer,
            max_append_retries: DEFAULT_MAX_APPEND_RETRIES,
            verify_signatures: true,
        }
    }

    pub fn with_max_append_retries(mut self, retries: u32) -> Self {
        self.max_append_retries = retries.max(1);
        self
    }

    pub fn with_signature_checks(mut self, enabled: bool) -> Self {
        self.verify_signatures = enabled;
        self
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Append one event to the chain and return the persisted entry.
    ///
    /// Either the fully sealed entry is stored or nothing is. Signing failures
    /// and store failures abort immediately; only a lost race for the head is
    /// retried.
    pub async fn append(&self, event: NewEvent) -> AuditResult<LogEntry> {
        for attempt in 1..=self.max_append_retries {
            let head = self.database.chain_head().await?;

            let now = Utc::now();
            let (seq, timestamp, previous_hash) = match head {
                // Never let time run backwards along the chain.
                Some(head) => (head.seq + 1, now.max(head.timestamp), Some(head.hash)),
                None => (1, now, None),
            };

            let mut entry = LogEntry::candidate(event.clone(), seq, timestamp, previous_hash);
            entry.hash = entry.calculate_hash()?;
            entry.signature = self.signer.sign(&entry.hash).map_err(|e| {
                error!(event_type = %entry.event_type, error = %e, "Signing failed, append aborted");
                match e {
                    AuditError::SigningUnavailable(_) => e,
                    other => AuditError::SigningUnavailable(other.to_string()),
                }
            })?;

            match self.database.insert_entry(&entry).await {
                Ok(()) => {
                    debug!("Appended audit entry: {}", entry.summary());
                    return Ok(entry);
                }
                Err(AuditError::HeadConflict(reason)) => {
                    debug!(attempt, seq, %reason, "Chain head moved, retrying append");
                }
                Err(e) => return Err(e),
            }
        }

        warn!(
            attempts = self.max_append_retries,
            "Giving up on append under head contention"
        );
        Err(AuditError::AppendContention {
            attempts: self.max_append_retries,
        })
    }

    /// Hash of the newest committed entry.
    pub async fn head_hash(&self) -> AuditResult<Option<String>> {
        Ok(self.database.chain_head().await?.map(|head| head.hash))
    }

    pub async fn entry_count(&self) -> AuditResult<u64> {
        self.database.entry_count().await
    }

    /// Verify the whole chain, or only the entries inside `range`.
    ///
    /// Sees the chain as of its read snapshot; appends landing meanwhile are
    /// simply not examined.
    pub async fn verify(&self, range: Option<TimeRange>) -> AuditResult<VerificationResult> {
        let scan = self.database.scan_chain(range.as_ref()).await?;
        let scope = match range {
            Some(range) => VerificationScope::Partial { range },
            None => VerificationScope::Full,
        };
        let signer_verifier = SignerVerifier(self.signer.as_ref());
        let verifier: Option<&dyn SignatureVerifier> = if self.verify_signatures {
            Some(&signer_verifier)
        } else {
            None
        };

        let result = verify_entries(&scan.entries, scope, verifier);
        let result = match scan.unreadable {
            Some(row) if result.valid => {
                warn!(seq = row.entry.seq, reason = %row.reason, "Unreadable audit row");
                let position = scan.entries.len();
                result.with_break(ChainBreak {
                    entry: row.entry,
                    position,
                    kind: BreakKind::Unreadable,
                    detail: row.reason,
                })
            }
            _ => result,
        };

        info!(
            valid = result.valid,
            entries = result.entries_checked,
            "Audit chain verification finished"
        );
        Ok(result)
    }

    /// Export entries with timestamps in `range`, ascending.
    pub async fn export(&self, range: TimeRange, format: ExportFormat) -> AuditResult<ExportPayload> {
        let entries = self.database.entries_in_range(&range).await?;
        export_entries(&entries, range, format)
    }

    /// Export with an untrusted format name; both inputs are checked before I/O.
    pub async fn export_str(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        format: &str,
    ) -> AuditResult<ExportPayload> {
        let range = TimeRange::new(start, end)?;
        let format: ExportFormat = format.parse()?;
        self.export(range, format).await
    }

    /// Newest entries first.
    pub async fn list_entries(&self, limit: u32, offset: u32) -> AuditResult<Vec<LogEntry>> {
        self.database.list_entries(limit, offset).await
    }
}
