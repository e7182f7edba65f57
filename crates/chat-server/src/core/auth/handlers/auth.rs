//! Auth handlers

use crate::core::config::AppState;
use crate::core::error::{Result, ValidationError};
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub token: String,
}

/// POST /register
pub async fn register(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Json<RegisterResponse>> {
    let Json(req) = payload.map_err(|e| ValidationError::Malformed(e.body_text()))?;
    info!("POST /register - {}", req.username);

    state.auth.register(&req.username, &req.password).await?;

    Ok(Json(RegisterResponse { success: true }))
}

/// POST /login
pub async fn login(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>> {
    let Json(req) = payload.map_err(|e| ValidationError::Malformed(e.body_text()))?;
    info!("POST /login - {}", req.username);

    let token = state.auth.login(&req.username, &req.password).await?;

    Ok(Json(LoginResponse {
        success: true,
        token,
    }))
}
