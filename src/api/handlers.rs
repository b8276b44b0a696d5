use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::HeaderMap,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::api::auth::{authenticate, authorize_privileged};
use crate::api::error::ApiError;
use crate::api::AppState;
use crate::audit::{Details, LogEntry, NewEvent, TimeRange};

const DEFAULT_PAGE_SIZE: u32 = 100;
const MAX_PAGE_SIZE: u32 = 1000;

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "bridge-audit",
        "timestamp": Utc::now()
    }))
}

#[derive(Debug, Deserialize)]
pub struct AppendRequest {
    pub event_type: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    #[serde(default)]
    pub details: Details,
}

/// Client address as reported by the fronting proxy.
fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub async fn append_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<AppendRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let claims = authenticate(&headers, &state.config.auth)?;
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    for (field, value) in [
        ("event_type", &request.event_type),
        ("action", &request.action),
        ("resource_type", &request.resource_type),
    ] {
        if value.trim().is_empty() {
            return Err(ApiError::BadRequest(format!("{} must not be empty", field)));
        }
    }

    let mut event = NewEvent::new(request.event_type, request.action, request.resource_type)
        .with_actor(claims.sub)
        .with_details(request.details)
        .with_provenance(forwarded_for(&headers), user_agent(&headers));
    if let Some(resource_id) = request.resource_id {
        event = event.with_resource_id(resource_id);
    }

    let entry = state.logger.append(event).await?;
    Ok(Json(json!({
        "id": entry.id,
        "hash": entry.hash,
        "message": "Audit log created"
    })))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

pub async fn list_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<LogEntry>>, ApiError> {
    authorize_privileged(&headers, &state.config.auth)?;
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let entries = state
        .logger
        .list_entries(limit, query.offset.unwrap_or(0))
        .await?;
    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

pub async fn verify_chain(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<VerifyQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let claims = authorize_privileged(&headers, &state.config.auth)?;
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let range = match (query.start, query.end) {
        (Some(start), Some(end)) => Some(TimeRange::new(start, end)?),
        (None, None) => None,
        _ => {
            return Err(ApiError::BadRequest(
                "start and end must be given together".to_string(),
            ))
        }
    };

    let result = state.logger.verify(range).await?;
    if let Some(brk) = &result.first_break {
        error!(
            target: "compliance_alert",
            entry_id = %brk.entry.id,
            seq = brk.entry.seq,
            kind = ?brk.kind,
            detail = %brk.detail,
            requested_by = %claims.sub,
            "Audit chain integrity violation"
        );
    } else {
        info!(entries = result.entries_checked, requested_by = %claims.sub, "Audit chain verified");
    }

    let message = if result.valid {
        "Audit log chain is intact"
    } else {
        "Audit log chain has been tampered with"
    };
    Ok(Json(json!({
        "chain_valid": result.valid,
        "message": message,
        "limitation": result.limitation(),
        "result": result,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub format: String,
}

pub async fn export_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ExportRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let claims = authorize_privileged(&headers, &state.config.auth)?;
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let export = state
        .logger
        .export_str(request.start_date, request.end_date, &request.format)
        .await?;
    info!(
        requested_by = %claims.sub,
        records = export.record_count,
        "Regulatory export generated"
    );

    Ok(Json(json!({
        "data": export.data,
        "format": export.format.as_str(),
        "record_count": export.record_count,
        "generated_at": export.generated_at,
        "merkle_root": export.merkle_root,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_provenance_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" 203.0.113.7 , 10.0.0.1"));
        headers.insert("user-agent", HeaderValue::from_static("teller-ui/2.1"));
        assert_eq!(forwarded_for(&headers).as_deref(), Some("203.0.113.7"));
        assert_eq!(user_agent(&headers).as_deref(), Some("teller-ui/2.1"));

        let empty = HeaderMap::new();
        assert_eq!(forwarded_for(&empty), None);
        assert_eq!(user_agent(&empty), None);
    }
}
