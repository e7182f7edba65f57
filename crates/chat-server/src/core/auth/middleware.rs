use crate::core::auth::token::bearer_token;
use crate::core::config::AppState;
use crate::core::ctx::Ctx;
use crate::core::error::{AuthError, Result};
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::debug;

pub async fn mw_require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    debug!("MIDDLEWARE: require_auth");

    let token = match req.headers().get(header::AUTHORIZATION) {
        Some(h) => {
            let value = h.to_str().map_err(|_| AuthError::TokenInvalid)?;
            Some(bearer_token(value).ok_or(AuthError::TokenInvalid)?)
        }
        None => None,
    };

    let identity = state.auth.verify_token(token).map_err(|e| {
        debug!(reason = %e, "Rejected request");
        e
    })?;

    req.extensions_mut().insert(Ctx::new(identity));

    Ok(next.run(req).await)
}
