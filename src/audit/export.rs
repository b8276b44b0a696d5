//! Regulatory Export
//!
//! Serializes a time slice of the chain with every stored field, so the
//! recipient can re-verify it offline.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::audit::entry::{canonical_details, LogEntry};
use crate::audit::merkle::merkle_root;
use crate::audit::range::{format_timestamp, TimeRange};
use crate::error::{AuditError, AuditResult};

/// Export format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// JSON array of entry objects.
    Structured,
    /// CSV with a fixed header row.
    Tabular,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Structured => "json",
            ExportFormat::Tabular => "csv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" | "structured" => Ok(ExportFormat::Structured),
            "csv" | "tabular" => Ok(ExportFormat::Tabular),
            _ => Err(AuditError::FormatUnsupported(s.to_string())),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column order of the tabular export. Changing it breaks consumers.
///
/// Optional columns (`actor_id`, `resource_id`, `ip_address`, `user_agent`,
/// `previous_hash`) are left empty when absent and written as `""` when the
/// value is an empty string.
pub const TABULAR_HEADER: [&str; 15] = [
    "id",
    "seq",
    "timestamp",
    "format_version",
    "event_type",
    "actor_id",
    "action",
    "resource_type",
    "resource_id",
    "details",
    "ip_address",
    "user_agent",
    "previous_hash",
    "hash",
    "signature",
];

/// A serialized slice of the chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportPayload {
    pub data: String,
    pub format: ExportFormat,
    /// Rows actually written, tallied during serialization.
    pub record_count: usize,
    pub generated_at: DateTime<Utc>,
    pub range: TimeRange,
    /// Merkle root over the exported hashes in order; `None` when empty.
    pub merkle_root: Option<String>,
}

/// Serialize `entries` (already filtered to `range`, in chain order).
pub fn export_entries(
    entries: &[LogEntry],
    range: TimeRange,
    format: ExportFormat,
) -> AuditResult<ExportPayload> {
    let (data, record_count) = match format {
        ExportFormat::Structured => to_structured(entries)?,
        ExportFormat::Tabular => to_tabular(entries),
    };

    info!(
        format = %format,
        records = record_count,
        start = %range.start(),
        end = %range.end(),
        "Audit log exported"
    );

    Ok(ExportPayload {
        data,
        format,
        record_count,
        generated_at: Utc::now(),
        range,
        merkle_root: merkle_root(entries),
    })
}

fn to_structured(entries: &[LogEntry]) -> AuditResult<(String, usize)> {
    let mut records = Vec::with_capacity(entries.len());
    for entry in entries {
        records.push(serde_json::to_value(entry)?);
    }
    let count = records.len();
    Ok((serde_json::to_string_pretty(&records)?, count))
}

fn to_tabular(entries: &[LogEntry]) -> (String, usize) {
    let mut output = TABULAR_HEADER.join(",");
    output.push('\n');

    let mut count = 0;
    for entry in entries {
        let row = [
            csv_escape(&entry.id),
            entry.seq.to_string(),
            format_timestamp(&entry.timestamp),
            entry.format_version.to_string(),
            csv_escape(&entry.event_type),
            csv_optional(entry.actor_id.as_deref()),
            csv_escape(&entry.action),
            csv_escape(&entry.resource_type),
            csv_optional(entry.resource_id.as_deref()),
            csv_escape(&canonical_details(&entry.details)),
            csv_optional(entry.ip_address.as_deref()),
            csv_optional(entry.user_agent.as_deref()),
            csv_optional(entry.previous_hash.as_deref()),
            csv_escape(&entry.hash),
            csv_escape(&entry.signature),
        ];
        output.push_str(&row.join(","));
        output.push('\n');
        count += 1;
    }

    (output, count)
}

fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Absent optional fields are empty cells; a present empty string is `""`.
fn csv_optional(value: Option<&str>) -> String {
    match value {
        None => String::new(),
        Some("") => "\"\"".to_string(),
        Some(value) => csv_escape(value),
    }
}

/// Read a structured export back into entries for offline verification.
pub fn parse_structured(data: &str) -> AuditResult<Vec<LogEntry>> {
    Ok(serde_json::from_str(data)?)
}
