use crate::core::config::AppState;
use crate::core::ctx::Ctx;
use crate::core::error::Result;
use crate::core::models::ChatEvent;
use axum::{extract::State, Json};
use tracing::info;

/// GET /get_recent_messages
pub async fn get_recent_messages(
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<Json<Vec<ChatEvent>>> {
    info!("GET /get_recent_messages - {}", ctx.identity());

    let events = state.gateway.recent(state.config.history_limit).await?;

    Ok(Json(events))
}
