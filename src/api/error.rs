use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::error::AuditError;

/// Error returned by HTTP handlers
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Insufficient permissions")]
    Forbidden,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Audit(#[from] AuditError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Audit(e) => match e {
                AuditError::InvalidRange { .. } | AuditError::FormatUnsupported(_) => {
                    StatusCode::BAD_REQUEST
                }
                AuditError::SigningUnavailable(_)
                | AuditError::StoreUnavailable(_)
                | AuditError::AppendContention { .. } => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Audit request failed");
        }
        let body = Json(serde_json::json!({
            "error": self.to_string(),
            "retryable": matches!(&self, ApiError::Audit(e) if e.is_transient()),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (ApiError::Forbidden, StatusCode::FORBIDDEN),
            (
                AuditError::FormatUnsupported("xml".into()).into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                AuditError::InvalidRange {
                    start: "b".into(),
                    end: "a".into(),
                }
                .into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                AuditError::SigningUnavailable("hsm down".into()).into(),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AuditError::AppendContention { attempts: 16 }.into(),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AuditError::SerializationError("bad".into()).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(error.status(), expected, "{}", error);
        }
    }
}
