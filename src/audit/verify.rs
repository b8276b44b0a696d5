//! Audit Log Verification
//!
//! Replays a chain (or a time slice of it) and reports the first entry that
//! breaks an integrity rule. A break is returned as data; deciding how to
//! escalate it is the caller's job.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::audit::entry::{EntryRef, LogEntry, FORMAT_VERSION};
use crate::audit::range::TimeRange;
use crate::audit::signer::SignatureVerifier;

/// What part of the chain a verification covered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerificationScope {
    /// From the genesis entry to the head.
    Full,
    /// Only entries inside the range; linkage across its edges is not checked.
    Partial { range: TimeRange },
    /// An offline slice (an export file) whose surroundings are unknown.
    Detached,
}

impl VerificationScope {
    pub fn is_partial(&self) -> bool {
        !matches!(self, VerificationScope::Full)
    }
}

/// Why an entry failed verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BreakKind {
    /// Recomputed digest differs from the stored one.
    HashMismatch,
    /// `previous_hash` differs from the preceding entry's hash.
    BrokenLink,
    /// The first entry of the full chain claims a predecessor.
    MissingGenesis,
    /// Timestamp earlier than its predecessor's.
    TimestampRegression,
    InvalidSignature,
    UnsupportedFormat { version: u16 },
    /// The stored row could not be decoded at all.
    Unreadable,
}

/// First integrity failure found in a chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainBreak {
    pub entry: EntryRef,
    /// Zero-based index within the examined sequence.
    pub position: usize,
    pub kind: BreakKind,
    pub detail: String,
}

/// Verification result with detailed information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub valid: bool,
    pub entries_checked: usize,
    pub first_break: Option<ChainBreak>,
    pub scope: VerificationScope,
    pub signatures_checked: bool,
    /// `previous_hash` of the first examined entry when it could not be checked.
    pub boundary_previous_hash: Option<String>,
}

impl VerificationResult {
    /// Limitation a partial verification must disclose, if any.
    pub fn limitation(&self) -> Option<String> {
        if !self.scope.is_partial() {
            return None;
        }
        Some(match &self.boundary_previous_hash {
            Some(hash) => format!(
                "Partial verification: only internal consistency was checked; link to preceding entry {} is unverified",
                hash
            ),
            None => "Partial verification: only internal consistency was checked".to_string(),
        })
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        match &self.first_break {
            None => format!("✅ Audit chain is valid ({} entries)", self.entries_checked),
            Some(brk) => format!(
                "❌ Audit chain broken at entry #{} ({}): {}",
                brk.entry.seq, brk.entry.id, brk.detail
            ),
        }
    }

    pub(crate) fn with_break(mut self, brk: ChainBreak) -> Self {
        self.valid = false;
        self.first_break = Some(brk);
        self
    }
}

/// Verify `entries`, given in chain order.
///
/// Per entry, in order: format version, digest (I1), genesis rule or link to
/// the predecessor (I2), timestamp order, then the signature (I3) when a
/// verifier is supplied. Stops at the first failure. An empty slice is valid.
pub fn verify_entries(
    entries: &[LogEntry],
    scope: VerificationScope,
    verifier: Option<&dyn SignatureVerifier>,
) -> VerificationResult {
    let boundary_previous_hash = if scope.is_partial() {
        entries.first().and_then(|e| e.previous_hash.clone())
    } else {
        None
    };

    let mut result = VerificationResult {
        valid: true,
        entries_checked: 0,
        first_break: None,
        scope,
        signatures_checked: verifier.is_some(),
        boundary_previous_hash,
    };

    for (position, entry) in entries.iter().enumerate() {
        let previous = position.checked_sub(1).map(|i| &entries[i]);
        if let Some((kind, detail)) = check_entry(entry, previous, &result.scope, verifier) {
            warn!(
                seq = entry.seq,
                id = %entry.id,
                ?kind,
                "Audit chain break detected"
            );
            return result.with_break(ChainBreak {
                entry: entry.entry_ref(),
                position,
                kind,
                detail,
            });
        }
        result.entries_checked += 1;
    }

    info!(
        entries = result.entries_checked,
        partial = result.scope.is_partial(),
        "Audit chain verification successful"
    );
    result
}

fn check_entry(
    entry: &LogEntry,
    previous: Option<&LogEntry>,
    scope: &VerificationScope,
    verifier: Option<&dyn SignatureVerifier>,
) -> Option<(BreakKind, String)> {
    if entry.format_version == 0 || entry.format_version > FORMAT_VERSION {
        return Some((
            BreakKind::UnsupportedFormat {
                version: entry.format_version,
            },
            format!("Unknown format version {}", entry.format_version),
        ));
    }

    if !entry.verify_hash() {
        return Some((
            BreakKind::HashMismatch,
            format!("Stored hash {} does not match entry contents", entry.hash),
        ));
    }

    match previous {
        None if matches!(scope, VerificationScope::Full) && entry.previous_hash.is_some() => {
            return Some((
                BreakKind::MissingGenesis,
                format!(
                    "First entry links to {} but the chain has no predecessor",
                    entry.previous_hash.as_deref().unwrap_or_default()
                ),
            ));
        }
        Some(prev) if entry.previous_hash.as_deref() != Some(prev.hash.as_str()) => {
            return Some((
                BreakKind::BrokenLink,
                format!(
                    "Hash chain broken: expected {}, got {}",
                    prev.hash,
                    entry.previous_hash.as_deref().unwrap_or("null")
                ),
            ));
        }
        Some(prev) if entry.timestamp < prev.timestamp => {
            return Some((
                BreakKind::TimestampRegression,
                format!(
                    "Non-monotonic timestamp: {} < {}",
                    entry.timestamp, prev.timestamp
                ),
            ));
        }
        _ => {}
    }

    if let Some(verifier) = verifier {
        if !verifier.verify(&entry.hash, &entry.signature) {
            return Some((
                BreakKind::InvalidSignature,
                "Signature does not validate against the entry hash".to_string(),
            ));
        }
    }

    debug!(seq = entry.seq, "Entry verified");
    None
}

/// Find every entry whose stored hash does not match its contents
pub fn find_tampered_entries(entries: &[LogEntry]) -> Vec<usize> {
    entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| !entry.verify_hash())
        .map(|(i, _)| i)
        .collect()
}

/// Entries claiming the same predecessor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForkInfo {
    pub previous_hash: Option<String>,
    pub entries: Vec<EntryRef>,
}

/// Detect forks: two or more entries sharing one `previous_hash`.
///
/// More than one genesis (no `previous_hash`) also counts as a fork.
pub fn detect_forks(entries: &[LogEntry]) -> Vec<ForkInfo> {
    let mut by_parent: HashMap<Option<&str>, Vec<&LogEntry>> = HashMap::new();
    for entry in entries {
        by_parent
            .entry(entry.previous_hash.as_deref())
            .or_default()
            .push(entry);
    }

    let mut forks: Vec<ForkInfo> = by_parent
        .into_iter()
        .filter(|(_, children)| children.len() > 1)
        .map(|(parent, children)| ForkInfo {
            previous_hash: parent.map(str::to_string),
            entries: children.iter().map(|e| e.entry_ref()).collect(),
        })
        .collect();
    forks.sort_by_key(|fork| fork.entries.first().map(|e| e.seq));
    forks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::entry::NewEvent;
    use crate::audit::signer::{Secp256k1Signer, Signer};
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    fn build_chain(signer: &Secp256k1Signer, count: usize) -> Vec<LogEntry> {
        let base = Utc.with_ymd_and_hms(2026, 10, 1, 8, 0, 0).unwrap();
        let mut entries: Vec<LogEntry> = Vec::new();
        for i in 0..count {
            let event = NewEvent::new("payment", "initiate", "transfer")
                .with_actor(format!("user-{}", i))
                .with_detail("amount", json!(100 + i));
            let previous = entries.last().map(|e| e.hash.clone());
            let mut entry =
                LogEntry::candidate(event, i as i64 + 1, base + Duration::minutes(i as i64), previous);
            entry.hash = entry.calculate_hash().unwrap();
            entry.signature = signer.sign(&entry.hash).unwrap();
            entries.push(entry);
        }
        entries
    }

    #[test]
    fn test_valid_chain() {
        let signer = Secp256k1Signer::generate();
        let entries = build_chain(&signer, 5);
        let result = verify_entries(&entries, VerificationScope::Full, Some(&signer));
        assert!(result.valid);
        assert_eq!(result.entries_checked, 5);
        assert!(result.signatures_checked);
        assert!(result.limitation().is_none());
        assert!(result.summary().contains("✅"));
    }

    #[test]
    fn test_empty_chain_is_valid() {
        let result = verify_entries(&[], VerificationScope::Full, None);
        assert!(result.valid);
        assert_eq!(result.entries_checked, 0);
    }

    #[test]
    fn test_tampered_details_reported_at_entry() {
        let signer = Secp256k1Signer::generate();
        let mut entries = build_chain(&signer, 3);
        entries[1].details.insert("amount".to_string(), json!(1_000_000));

        let result = verify_entries(&entries, VerificationScope::Full, Some(&signer));
        assert!(!result.valid);
        let brk = result.first_break.unwrap();
        assert_eq!(brk.entry, entries[1].entry_ref());
        assert_eq!(brk.position, 1);
        assert_eq!(brk.kind, BreakKind::HashMismatch);
    }

    #[test]
    fn test_deleted_entry_breaks_link() {
        let signer = Secp256k1Signer::generate();
        let mut entries = build_chain(&signer, 4);
        entries.remove(2);

        let result = verify_entries(&entries, VerificationScope::Full, None);
        let brk = result.first_break.unwrap();
        assert_eq!(brk.kind, BreakKind::BrokenLink);
        assert_eq!(brk.entry.seq, 4);
    }

    #[test]
    fn test_deleted_genesis_detected_in_full_scope() {
        let signer = Secp256k1Signer::generate();
        let mut entries = build_chain(&signer, 3);
        entries.remove(0);

        let full = verify_entries(&entries, VerificationScope::Full, None);
        assert_eq!(full.first_break.unwrap().kind, BreakKind::MissingGenesis);

        let detached = verify_entries(&entries, VerificationScope::Detached, None);
        assert!(detached.valid);
        assert_eq!(detached.boundary_previous_hash, entries[0].previous_hash);
        assert!(detached.limitation().unwrap().contains("unverified"));
    }

    #[test]
    fn test_rehashed_entry_caught_by_signature() {
        let signer = Secp256k1Signer::generate();
        let mut entries = build_chain(&signer, 1);
        // An attacker without the key rewrites content and recomputes the hash.
        entries[0].action = "cancel".to_string();
        entries[0].hash = entries[0].calculate_hash().unwrap();

        assert!(verify_entries(&entries, VerificationScope::Full, None).valid);
        let result = verify_entries(&entries, VerificationScope::Full, Some(&signer));
        assert_eq!(result.first_break.unwrap().kind, BreakKind::InvalidSignature);
    }

    #[test]
    fn test_unknown_format_version() {
        let signer = Secp256k1Signer::generate();
        let mut entries = build_chain(&signer, 2);
        entries[1].format_version = 7;
        let result = verify_entries(&entries, VerificationScope::Full, None);
        assert_eq!(
            result.first_break.unwrap().kind,
            BreakKind::UnsupportedFormat { version: 7 }
        );
    }

    #[test]
    fn test_find_tampered_entries() {
        let signer = Secp256k1Signer::generate();
        let mut entries = build_chain(&signer, 4);
        entries[1].hash = "sha256:tampered".to_string();
        entries[3].resource_type = "account".to_string();
        assert_eq!(find_tampered_entries(&entries), vec![1, 3]);
    }

    #[test]
    fn test_detect_forks() {
        let signer = Secp256k1Signer::generate();
        let mut entries = build_chain(&signer, 3);
        assert!(detect_forks(&entries).is_empty());

        let mut sibling = entries[2].clone();
        sibling.id = "sibling".to_string();
        sibling.seq = 4;
        entries.push(sibling);

        let forks = detect_forks(&entries);
        assert_eq!(forks.len(), 1);
        assert_eq!(forks[0].previous_hash.as_deref(), Some(entries[1].hash.as_str()));
        assert_eq!(forks[0].entries.len(), 2);
    }
}
