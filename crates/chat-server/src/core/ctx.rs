use crate::core::error::{Error, Result};
use axum::{extract::FromRequestParts, http::request::Parts};

/// Authenticated caller, placed in request extensions by `mw_require_auth`.
#[derive(Clone, Debug)]
pub struct Ctx {
    identity: String,
}

impl Ctx {
    pub fn new(identity: String) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }
}

impl<S> FromRequestParts<S> for Ctx
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<Ctx>()
            .cloned()
            .ok_or_else(|| Error::Internal("Auth context missing".to_string()))
    }
}
