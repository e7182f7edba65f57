use crate::core::config::AppState;
use crate::core::ctx::Ctx;
use crate::core::error::Result;
use axum::{extract::State, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct UserDataResponse {
    pub avatar: String,
}

/// GET /get_user_data
pub async fn get_user_data(State(state): State<AppState>, ctx: Ctx) -> Result<Json<UserDataResponse>> {
    let avatar = state.auth.user_avatar(ctx.identity()).await?;

    Ok(Json(UserDataResponse { avatar }))
}
