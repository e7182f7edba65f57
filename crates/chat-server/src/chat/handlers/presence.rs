use crate::core::config::AppState;
use crate::core::ctx::Ctx;
use crate::core::models::Roster;
use axum::{extract::State, Json};
use tracing::debug;

/// GET /online_users
pub async fn get_online_users(State(state): State<AppState>, ctx: Ctx) -> Json<Roster> {
    debug!("GET /online_users - {}", ctx.identity());
    Json(state.gateway.roster())
}
