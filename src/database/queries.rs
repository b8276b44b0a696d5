use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::debug;

use crate::audit::entry::{canonical_details, Details, EntryRef, LogEntry};
use crate::audit::range::{format_timestamp, TimeRange};
use crate::database::models::{ChainHead, ChainScan, UnreadableRow};
use crate::database::schema::AUDIT_LOG_COLUMNS;
use crate::database::Database;
use crate::error::{AuditError, AuditResult};

impl Database {
    /// Last committed entry, read fresh from the store on every call.
    pub async fn chain_head(&self) -> AuditResult<Option<ChainHead>> {
        let row = sqlx::query("SELECT seq, hash, timestamp FROM audit_log ORDER BY seq DESC LIMIT 1")
            .fetch_optional(self.pool())
            .await?;

        row.map(|row| -> AuditResult<ChainHead> {
            Ok(ChainHead {
                seq: row.try_get("seq")?,
                hash: row.try_get("hash")?,
                timestamp: parse_timestamp(&row.try_get::<String, _>("timestamp")?)?,
            })
        })
        .transpose()
    }

    /// Persist one sealed entry in a single statement.
    ///
    /// A uniqueness violation on `seq` or `previous_hash` surfaces as
    /// `AuditError::HeadConflict`: another writer claimed that chain position.
    pub async fn insert_entry(&self, entry: &LogEntry) -> AuditResult<()> {
        if !entry.is_sealed() {
            return Err(AuditError::StoreUnavailable(format!(
                "Refusing to persist unsealed entry {}",
                entry.id
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO audit_log
            (seq, id, timestamp, format_version, event_type, actor_id, action, resource_type,
             resource_id, details, ip_address, user_agent, previous_hash, hash, signature)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.seq)
        .bind(&entry.id)
        .bind(format_timestamp(&entry.timestamp))
        .bind(i64::from(entry.format_version))
        .bind(&entry.event_type)
        .bind(&entry.actor_id)
        .bind(&entry.action)
        .bind(&entry.resource_type)
        .bind(&entry.resource_id)
        .bind(canonical_details(&entry.details))
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(&entry.previous_hash)
        .bind(&entry.hash)
        .bind(&entry.signature)
        .execute(self.pool())
        .await?;

        debug!(seq = entry.seq, id = %entry.id, "Inserted audit entry");
        Ok(())
    }

    /// Read the chain in insertion order, stopping at the first undecodable row.
    pub async fn scan_chain(&self, range: Option<&TimeRange>) -> AuditResult<ChainScan> {
        let rows = self.fetch_rows(range).await?;
        let mut scan = ChainScan::default();

        for row in rows {
            match row_to_entry(&row) {
                Ok(entry) => scan.entries.push(entry),
                Err(e) => {
                    scan.unreadable = Some(UnreadableRow {
                        entry: EntryRef {
                            id: row.try_get("id").unwrap_or_default(),
                            seq: row.try_get("seq").unwrap_or_default(),
                        },
                        reason: e.to_string(),
                    });
                    break;
                }
            }
        }

        Ok(scan)
    }

    /// Entries with `timestamp` in `[start, end]`, ascending. Any bad row is an error.
    pub async fn entries_in_range(&self, range: &TimeRange) -> AuditResult<Vec<LogEntry>> {
        self.fetch_rows(Some(range))
            .await?
            .iter()
            .map(row_to_entry)
            .collect()
    }

    /// Newest entries first, for paging through the log.
    pub async fn list_entries(&self, limit: u32, offset: u32) -> AuditResult<Vec<LogEntry>> {
        let sql = format!(
            "SELECT {} FROM audit_log ORDER BY seq DESC LIMIT ? OFFSET ?",
            AUDIT_LOG_COLUMNS
        );
        sqlx::query(&sql)
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(self.pool())
            .await?
            .iter()
            .map(row_to_entry)
            .collect()
    }

    pub async fn entry_count(&self) -> AuditResult<u64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM audit_log")
            .fetch_one(self.pool())
            .await?;
        Ok(count as u64)
    }

    async fn fetch_rows(&self, range: Option<&TimeRange>) -> AuditResult<Vec<SqliteRow>> {
        let rows = match range {
            Some(range) => {
                let (start, end) = range.store_bounds();
                let sql = format!(
                    "SELECT {} FROM audit_log WHERE timestamp >= ? AND timestamp <= ? ORDER BY seq ASC",
                    AUDIT_LOG_COLUMNS
                );
                sqlx::query(&sql)
                    .bind(start)
                    .bind(end)
                    .fetch_all(self.pool())
                    .await?
            }
            None => {
                let sql = format!("SELECT {} FROM audit_log ORDER BY seq ASC", AUDIT_LOG_COLUMNS);
                sqlx::query(&sql).fetch_all(self.pool()).await?
            }
        };
        Ok(rows)
    }
}

fn parse_timestamp(raw: &str) -> AuditResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| AuditError::SerializationError(format!("Invalid timestamp {:?}: {}", raw, e)))
}

fn row_to_entry(row: &SqliteRow) -> AuditResult<LogEntry> {
    let format_version = row.try_get::<i64, _>("format_version")?;
    let format_version = u16::try_from(format_version).map_err(|_| {
        AuditError::SerializationError(format!("Invalid format version {}", format_version))
    })?;
    let details: Details = serde_json::from_str(&row.try_get::<String, _>("details")?)?;

    Ok(LogEntry {
        id: row.try_get("id")?,
        seq: row.try_get("seq")?,
        timestamp: parse_timestamp(&row.try_get::<String, _>("timestamp")?)?,
        format_version,
        event_type: row.try_get("event_type")?,
        actor_id: row.try_get("actor_id")?,
        action: row.try_get("action")?,
        resource_type: row.try_get("resource_type")?,
        resource_id: row.try_get("resource_id")?,
        details,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        previous_hash: row.try_get("previous_hash")?,
        hash: row.try_get("hash")?,
        signature: row.try_get("signature")?,
    })
}
