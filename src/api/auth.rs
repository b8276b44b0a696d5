//! Caller identity from HS256 bearer tokens

use axum::http::{header, HeaderMap};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::error::ApiError;
use crate::config::AuthConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

/// Resolve the caller from the `Authorization: Bearer` header.
pub fn authenticate(headers: &HeaderMap, auth: &AuthConfig) -> Result<Claims, ApiError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;

    let key = DecodingKey::from_secret(auth.jwt_secret.as_bytes());
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(token.trim(), &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            debug!(error = %e, "Rejected bearer token");
            ApiError::Unauthorized("Invalid bearer token".to_string())
        })
}

/// Like `authenticate`, but the caller's role must be privileged.
pub fn authorize_privileged(headers: &HeaderMap, auth: &AuthConfig) -> Result<Claims, ApiError> {
    let claims = authenticate(headers, auth)?;
    if !auth.is_privileged(&claims.role) {
        debug!(sub = %claims.sub, role = %claims.role, "Privileged route denied");
        return Err(ApiError::Forbidden);
    }
    Ok(claims)
}

/// Mint a token for `sub` with `role`, valid for `ttl_secs`.
pub fn issue_token(
    secret: &str,
    sub: &str,
    role: &str,
    ttl_secs: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: sub.to_string(),
        role: role.to_string(),
        exp: (Utc::now().timestamp() + ttl_secs).max(0) as usize,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}
