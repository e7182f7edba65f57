//! Core Router
//!
//! Account routes and the static file mounts.

use crate::core::auth::{handlers as auth_handlers, middleware::mw_require_auth};
use crate::core::uploads::{AVATAR_ROUTE, UPLOAD_ROUTE};
use crate::core::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::services::ServeDir;

pub fn router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/get_user_data", get(auth_handlers::get_user_data))
        .route_layer(middleware::from_fn_with_state(state.clone(), mw_require_auth));

    Router::new()
        .route("/register", post(auth_handlers::register))
        .route("/login", post(auth_handlers::login))
        .merge(protected)
        .nest_service(AVATAR_ROUTE, ServeDir::new(&state.config.avatar_dir))
        .nest_service(UPLOAD_ROUTE, ServeDir::new(&state.config.upload_dir))
}
