use thiserror::Error;

impl From<serde_json::Error> for AuditError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(format!("JSON serialization error: {}", err))
    }
}

impl From<sqlx::Error> for AuditError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return Self::HeadConflict(db_err.message().to_string());
            }
        }
        Self::StoreUnavailable(format!("Database error: {}", err))
    }
}

#[derive(Error, Debug)]
pub enum AuditError {
    /// The signing authority could not produce a signature. Nothing was persisted.
    #[error("Signing authority unavailable: {0}")]
    SigningUnavailable(String),

    /// The persistent store could not be reached or rejected the operation.
    #[error("Audit store unavailable: {0}")]
    StoreUnavailable(String),

    /// Another writer advanced the chain head between read and insert.
    #[error("Chain head moved during append: {0}")]
    HeadConflict(String),

    /// Every compare-and-append attempt lost the race for the chain head.
    #[error("Append abandoned after {attempts} attempts: chain head kept moving")]
    AppendContention { attempts: u32 },

    #[error("Invalid range: start {start} is after end {end}")]
    InvalidRange { start: String, end: String },

    #[error("Unsupported export format: {0}")]
    FormatUnsupported(String),

    /// The entry was written with a canonicalization this build does not know.
    #[error("Unsupported entry format version: {0}")]
    UnsupportedFormat(u16),

    #[error("Cryptographic error: {0}")]
    CryptoError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl AuditError {
    pub fn invalid_range(
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self::InvalidRange {
            start: start.to_rfc3339(),
            end: end.to_rfc3339(),
        }
    }

    /// Whether the caller may simply retry the whole operation later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::SigningUnavailable(_)
                | Self::StoreUnavailable(_)
                | Self::HeadConflict(_)
                | Self::AppendContention { .. }
        )
    }
}

pub type AuditResult<T> = Result<T, AuditError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_invalid_range_message() {
        let end = Utc::now();
        let start = end + Duration::hours(1);
        let err = AuditError::invalid_range(start, end);
        assert!(err.to_string().starts_with("Invalid range"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_transient_classification() {
        assert!(AuditError::SigningUnavailable("hsm offline".to_string()).is_transient());
        assert!(AuditError::StoreUnavailable("pool closed".to_string()).is_transient());
        assert!(AuditError::AppendContention { attempts: 3 }.is_transient());
        assert!(!AuditError::FormatUnsupported("xml".to_string()).is_transient());
    }
}
