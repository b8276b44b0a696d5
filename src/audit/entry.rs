//! Audit Log Entry
//!
//! Defines the immutable record stored in the chain and the canonical
//! representation its digest is computed over.
//!
//! Canonical layout, format version 1 (one segment per field, `|` separated):
//!
//! ```text
//! v1|timestamp|event_type|actor_id|action|resource_type|resource_id|details|previous_hash|ip_address|user_agent
//! ```
//!
//! The timestamp is RFC 3339 with microseconds and a `Z` suffix. Every other
//! field is JSON-encoded: strings are quoted and escaped, absent values are
//! `null`, and `details` is JSON with object keys sorted at every depth. A
//! separator inside a value therefore can never move a field boundary.
//! Changing any of this requires a new format version.

use std::collections::BTreeMap;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::audit::range::format_timestamp;
use crate::error::{AuditError, AuditResult};

/// Canonicalization currently written by this build.
pub const FORMAT_VERSION: u16 = 1;

/// Prefix on every digest string.
pub const HASH_PREFIX: &str = "sha256:";

/// Structured event payload, keyed deterministically.
pub type Details = BTreeMap<String, Value>;

/// Fields supplied by the business service emitting an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub event_type: String,
    pub actor_id: Option<String>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    #[serde(default)]
    pub details: Details,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl NewEvent {
    pub fn new(
        event_type: impl Into<String>,
        action: impl Into<String>,
        resource_type: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            action: action.into(),
            resource_type: resource_type.into(),
            ..Self::default()
        }
    }

    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_details(mut self, details: Details) -> Self {
        self.details = details;
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    pub fn with_provenance(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }
}

/// Stable reference to a stored entry, used in verification reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRef {
    pub id: String,
    pub seq: i64,
}

/// One record of the tamper-evident chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    /// Position in the store, starting at 1 for the genesis entry.
    pub seq: i64,
    pub timestamp: DateTime<Utc>,
    pub format_version: u16,
    pub event_type: String,
    pub actor_id: Option<String>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    #[serde(default)]
    pub details: Details,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub previous_hash: Option<String>,
    pub hash: String,
    pub signature: String,
}

impl LogEntry {
    /// Build an unsealed candidate that follows `previous_hash`.
    ///
    /// `hash` and `signature` are empty until the writer seals it; the store
    /// refuses rows without them.
    pub fn candidate(
        event: NewEvent,
        seq: i64,
        timestamp: DateTime<Utc>,
        previous_hash: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            seq,
            timestamp: truncate_timestamp(timestamp),
            format_version: FORMAT_VERSION,
            event_type: event.event_type,
            actor_id: event.actor_id,
            action: event.action,
            resource_type: event.resource_type,
            resource_id: event.resource_id,
            details: event.details,
            ip_address: event.ip_address,
            user_agent: event.user_agent,
            previous_hash,
            hash: String::new(),
            signature: String::new(),
        }
    }

    /// Create canonical string representation for hashing
    pub fn canonical_string(&self) -> AuditResult<String> {
        match self.format_version {
            1 => Ok(self.canonical_v1()),
            other => Err(AuditError::UnsupportedFormat(other)),
        }
    }

    fn canonical_v1(&self) -> String {
        [
            format!("v{}", self.format_version),
            format_timestamp(&self.timestamp),
            json_str(&self.event_type),
            json_opt(self.actor_id.as_deref()),
            json_str(&self.action),
            json_str(&self.resource_type),
            json_opt(self.resource_id.as_deref()),
            canonical_details(&self.details),
            json_opt(self.previous_hash.as_deref()),
            json_opt(self.ip_address.as_deref()),
            json_opt(self.user_agent.as_deref()),
        ]
        .join("|")
    }

    /// Calculate the SHA-256 digest of this entry's canonical fields
    pub fn calculate_hash(&self) -> AuditResult<String> {
        Ok(digest(&self.canonical_string()?))
    }

    /// Verify this entry's stored hash
    pub fn verify_hash(&self) -> bool {
        self.calculate_hash()
            .map(|hash| hash == self.hash)
            .unwrap_or(false)
    }

    pub fn is_sealed(&self) -> bool {
        !self.hash.is_empty() && !self.signature.is_empty()
    }

    pub fn entry_ref(&self) -> EntryRef {
        EntryRef {
            id: self.id.clone(),
            seq: self.seq,
        }
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "#{} {}:{} on {} by {} ({})",
            self.seq,
            self.event_type,
            self.action,
            self.resource_type,
            self.actor_id.as_deref().unwrap_or("system"),
            self.hash
        )
    }
}

/// SHA-256 over a canonical string, rendered as `sha256:<hex>`.
pub fn digest(canonical: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{}{}", HASH_PREFIX, hex::encode(hasher.finalize()))
}

/// Drop sub-microsecond precision so the value survives the stored text form.
pub fn truncate_timestamp(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp
        .duration_trunc(TimeDelta::microseconds(1))
        .unwrap_or(timestamp)
}

/// JSON text of `details` with keys sorted at every nesting level.
pub fn canonical_details(details: &Details) -> String {
    let mut out = String::from("{");
    for (i, (key, value)) in details.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&json_str(key));
        out.push(':');
        write_canonical(value, &mut out);
    }
    out.push('}');
    out
}

/// Canonical JSON for an arbitrary value.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&json_str(key));
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn json_str(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

fn json_opt(value: Option<&str>) -> String {
    value.map(json_str).unwrap_or_else(|| "null".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample_entry() -> LogEntry {
        let event = NewEvent::new("sanctions_screening", "screen_entity", "sanctions")
            .with_actor("officer-7")
            .with_resource_id("ACME Ltd")
            .with_detail("risk_level", json!("clear"))
            .with_detail("matches_found", json!(0));
        let ts = Utc.with_ymd_and_hms(2026, 10, 19, 9, 30, 0).unwrap();
        let mut entry = LogEntry::candidate(event, 1, ts, None);
        entry.hash = entry.calculate_hash().unwrap();
        entry
    }

    #[test]
    fn test_hash_is_deterministic() {
        let entry = sample_entry();
        let hash1 = entry.calculate_hash().unwrap();
        let hash2 = entry.calculate_hash().unwrap();
        assert_eq!(hash1, hash2);
        assert!(hash1.starts_with(HASH_PREFIX));
        assert_eq!(hash1.len(), 71); // "sha256:" + 64 hex chars
        assert!(entry.verify_hash());
    }

    #[test]
    fn test_canonical_string_layout() {
        let entry = sample_entry();
        let canonical = entry.canonical_string().unwrap();
        assert_eq!(
            canonical,
            "v1|2026-10-19T09:30:00.000000Z|\"sanctions_screening\"|\"officer-7\"|\"screen_entity\"|\"sanctions\"|\"ACME Ltd\"|{\"matches_found\":0,\"risk_level\":\"clear\"}|null|null|null"
        );
    }

    #[test]
    fn test_details_key_order_does_not_matter() {
        let a = json!({"z": 1, "a": {"y": [1, 2], "b": null}});
        let mut map = serde_json::Map::new();
        map.insert("a".to_string(), json!({"b": null, "y": [1, 2]}));
        map.insert("z".to_string(), json!(1));
        let b = Value::Object(map);
        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_eq!(canonical_json(&a), r#"{"a":{"b":null,"y":[1,2]},"z":1}"#);
    }

    #[test]
    fn test_absent_differs_from_empty() {
        let mut with_none = sample_entry();
        with_none.resource_id = None;
        let mut with_empty = sample_entry();
        with_empty.resource_id = Some(String::new());
        assert_ne!(
            with_none.calculate_hash().unwrap(),
            with_empty.calculate_hash().unwrap()
        );
    }

    #[test]
    fn test_separator_inside_value_cannot_shift_fields() {
        let mut a = sample_entry();
        a.event_type = "x|y".to_string();
        a.action = "z".to_string();
        let mut b = sample_entry();
        b.event_type = "x".to_string();
        b.action = "y|z".to_string();
        assert_ne!(a.calculate_hash().unwrap(), b.calculate_hash().unwrap());
    }

    #[test]
    fn test_every_hashed_field_changes_digest() {
        let base = sample_entry();
        let original = base.calculate_hash().unwrap();
        let mutations: Vec<Box<dyn Fn(&mut LogEntry)>> = vec![
            Box::new(|e| e.timestamp = e.timestamp + chrono::Duration::microseconds(1)),
            Box::new(|e| e.event_type.push('!')),
            Box::new(|e| e.actor_id = None),
            Box::new(|e| e.action.push('!')),
            Box::new(|e| e.resource_type.push('!')),
            Box::new(|e| e.resource_id = Some("other".to_string())),
            Box::new(|e| {
                e.details.insert("extra".to_string(), json!(true));
            }),
            Box::new(|e| e.previous_hash = Some(digest("prev"))),
            Box::new(|e| e.ip_address = Some("10.0.0.1".to_string())),
            Box::new(|e| e.user_agent = Some("curl/8".to_string())),
        ];
        for mutate in mutations {
            let mut entry = base.clone();
            mutate(&mut entry);
            assert_ne!(entry.calculate_hash().unwrap(), original);
        }
    }

    #[test]
    fn test_unknown_format_version_is_rejected() {
        let mut entry = sample_entry();
        entry.format_version = 9;
        assert!(matches!(
            entry.calculate_hash(),
            Err(AuditError::UnsupportedFormat(9))
        ));
        assert!(!entry.verify_hash());
    }

    #[test]
    fn test_candidate_truncates_to_microseconds() {
        let ts = Utc.timestamp_opt(1_800_000_000, 123_456_789).unwrap();
        let entry = LogEntry::candidate(NewEvent::new("a", "b", "c"), 1, ts, None);
        assert_eq!(entry.timestamp.timestamp_subsec_nanos(), 123_456_000);
        assert!(!entry.is_sealed());
    }
}
