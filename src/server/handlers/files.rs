//! Decrypting book stream, cover images and health check.

use super::get_identity;
use crate::auth::Role;
use crate::config::FileKind;
use crate::error::{AppError, Result};
use crate::server::AppState;
use crate::storage::{ENCRYPTED_SUFFIX, is_plain_file_name};
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::Response,
};
use serde::Serialize;

/// Build a binary response.
fn build_response(content_type: &str, disposition: Option<String>, body: Vec<u8>) -> Response<Body> {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, body.len())
        .header(header::CACHE_CONTROL, "private, max-age=300");
    if let Some(disposition) = disposition {
        builder = builder.header(header::CONTENT_DISPOSITION, disposition);
    }

    builder
        .body(Body::from(body))
        .unwrap_or_else(|_| Response::default())
}

/// Stream a decrypted book file to its publisher or a reader who bought it.
pub async fn stream_book(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(filename): Path<String>,
) -> Result<Response<Body>> {
    let identity = get_identity(&state, &headers)?;
    let not_found = || AppError::NotFound("File not found".to_string());

    if !is_plain_file_name(&filename) {
        return Err(not_found());
    }
    let file = state.db.find_book_file(&filename)?.ok_or_else(not_found)?;

    let allowed = match identity.role {
        Role::Publisher => file.publisher_id == identity.id,
        Role::Reader => state.db.has_purchased(identity.id, file.book_id)?,
    };
    if !allowed {
        return Err(not_found());
    }

    let blob = state
        .store
        .read_book_file(&filename)
        .await?
        .ok_or_else(|| {
            tracing::warn!(file = %filename, book_id = file.book_id, "Stored book file is missing");
            not_found()
        })?;
    let plaintext = state.cipher.decrypt(&blob)?;

    let original = filename
        .strip_suffix(ENCRYPTED_SUFFIX)
        .unwrap_or(&filename)
        .to_string();
    let content_type = FileKind::from_filename(&original)
        .map(|kind| kind.mime_type())
        .unwrap_or("application/octet-stream");

    tracing::debug!(
        file = %filename,
        role = %identity.role,
        id = identity.id,
        size = plaintext.len(),
        "Streaming book"
    );

    Ok(build_response(
        content_type,
        Some(format!("inline; filename=\"{}\"", original)),
        plaintext,
    ))
}

/// Serve a cover image to any authenticated caller.
pub async fn book_cover(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(filename): Path<String>,
) -> Result<Response<Body>> {
    get_identity(&state, &headers)?;
    let not_found = || AppError::NotFound("Cover not found".to_string());

    if !is_plain_file_name(&filename) {
        return Err(not_found());
    }
    state.db.find_book_by_cover(&filename)?.ok_or_else(not_found)?;

    let data = state.store.read_cover(&filename).await?.ok_or_else(not_found)?;
    let content_type = FileKind::from_filename(&filename)
        .map(|kind| kind.mime_type())
        .unwrap_or("application/octet-stream");

    Ok(build_response(content_type, None, data))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Liveness probe.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
