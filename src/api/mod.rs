//! HTTP surface of the audit service
//!
//! Business services append through `POST /audit-log`; auditors verify and
//! export through the privileged `/audit-logs` routes.

pub mod auth;
pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::audit::AuditLogger;
use crate::config::AppConfig;

pub use auth::{issue_token, Claims};
pub use error::ApiError;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub logger: AuditLogger,
}

impl AppState {
    pub fn new(config: AppConfig, logger: AuditLogger) -> Self {
        Self {
            config: Arc::new(config),
            logger,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/audit-log", post(handlers::append_event))
        .route("/audit-logs", get(handlers::list_logs))
        .route("/audit-logs/verify-chain", get(handlers::verify_chain))
        .route("/audit-logs/export", post(handlers::export_logs))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .into_inner(),
        )
        .with_state(state)
}
