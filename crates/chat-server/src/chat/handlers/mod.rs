//! Chat Handlers and Router
//!
//! Realtime socket, history, presence and upload routes.

use crate::core::auth::middleware::mw_require_auth;
use crate::core::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};

pub mod messages;
pub mod presence;
pub mod uploads;
pub mod ws;

pub fn router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/get_recent_messages", get(messages::get_recent_messages))
        .route("/online_users", get(presence::get_online_users))
        .route("/upload_avatar", post(uploads::upload_avatar))
        .route("/upload_file", post(uploads::upload_file))
        .route_layer(middleware::from_fn_with_state(state, mw_require_auth));

    Router::new()
        // Token is checked inside the handler: browsers cannot set headers on upgrades
        .route("/ws", get(ws::ws_handler))
        .merge(protected)
}
