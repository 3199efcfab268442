//! Registration and login for publishers and readers.

use super::{ApiJson, MessageResponse};
use crate::auth::{Registration, Role};
use crate::error::Result;
use crate::server::AppState;
use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};

/// Login request.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
}

/// Login response.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    access_token: String,
    message: String,
}

fn register(state: &AppState, role: Role, req: &Registration) -> Result<(StatusCode, Json<MessageResponse>)> {
    state.auth.register(role, req)?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("Registration successful")),
    ))
}

fn login(state: &AppState, role: Role, req: &LoginRequest) -> Result<Json<LoginResponse>> {
    let access_token = state.auth.login(role, &req.email, &req.password)?;
    Ok(Json(LoginResponse {
        access_token,
        message: "Login successful".to_string(),
    }))
}

/// Register a publisher.
pub async fn publisher_register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<Registration>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    register(&state, Role::Publisher, &req)
}

/// Publisher login.
pub async fn publisher_login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    login(&state, Role::Publisher, &req)
}

/// Register a reader.
pub async fn reader_register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<Registration>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    register(&state, Role::Reader, &req)
}

/// Reader login.
pub async fn reader_login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    login(&state, Role::Reader, &req)
}
