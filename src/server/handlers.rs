//! HTTP request handlers.

pub mod auth;
pub mod files;
pub mod publisher;
pub mod reader;
pub mod upload;

use crate::auth::{Identity, Role};
use crate::error::{AppError, Result};
use crate::server::AppState;
use axum::{
    extract::FromRequest,
    http::{HeaderMap, header},
};
use serde::Serialize;

/// JSON body extractor whose rejections render as [`AppError`].
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Plain `{"message": ...}` response.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    message: String,
}

impl MessageResponse {
    /// Wrap a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Extract token from Authorization header.
fn extract_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Get the identity carried by the request's bearer token.
fn get_identity(state: &AppState, headers: &HeaderMap) -> Result<Identity> {
    let token = extract_token(headers)
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

    state.auth.validate_token(&token)
}

fn require_role(identity: Identity, role: Role) -> Result<i64> {
    if identity.role != role {
        return Err(AppError::Unauthorized(format!(
            "Token is not valid for {} endpoints",
            role
        )));
    }
    Ok(identity.id)
}

/// Authenticate a publisher and check the account still exists.
fn get_publisher_id(state: &AppState, headers: &HeaderMap) -> Result<i64> {
    let id = require_role(get_identity(state, headers)?, Role::Publisher)?;
    state
        .db
        .get_publisher(id)?
        .ok_or_else(|| AppError::NotFound("Publisher not found".to_string()))?;
    Ok(id)
}

/// Authenticate a reader and check the account still exists.
fn get_reader_id(state: &AppState, headers: &HeaderMap) -> Result<i64> {
    let id = require_role(get_identity(state, headers)?, Role::Reader)?;
    state
        .db
        .get_reader(id)?
        .ok_or_else(|| AppError::NotFound("Reader not found".to_string()))?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_token(&headers).as_deref(), Some("abc.def"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_token(&headers), None);
    }

    #[test]
    fn test_require_role() {
        let reader = Identity {
            role: Role::Reader,
            id: 3,
        };
        assert_eq!(require_role(reader, Role::Reader).unwrap(), 3);
        assert!(matches!(
            require_role(reader, Role::Publisher),
            Err(AppError::Unauthorized(_))
        ));
    }
}
