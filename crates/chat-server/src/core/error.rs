use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Token and credential failures. Raised before any shared state is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Access token required")]
    TokenMissing,
    #[error("Invalid access token")]
    TokenInvalid,
    #[error("Access token expired")]
    TokenExpired,
    #[error("Invalid credentials")]
    InvalidCredentials,
}

/// Rejected input: bad credential format, disallowed media, oversize payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Username must be 1-32 characters of letters, digits, '_', '-' or '.'")]
    InvalidUsername,
    #[error("Password must not be empty")]
    EmptyPassword,
    #[error("Missing '{0}' field in multipart form")]
    MissingField(&'static str),
    #[error("File type not allowed: {0}")]
    UnsupportedMediaType(String),
    #[error("File too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },
    #[error("Request body too large")]
    BodyTooLarge,
    #[error("Malformed request: {0}")]
    Malformed(String),
}

/// Failures of the underlying storage engines.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),
    #[error("password hashing: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Persistence failure: {0}")]
    Persistence(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Auth(AuthError::TokenMissing | AuthError::InvalidCredentials) => {
                StatusCode::UNAUTHORIZED
            }
            Error::Auth(AuthError::TokenInvalid | AuthError::TokenExpired) => StatusCode::FORBIDDEN,
            Error::Validation(ValidationError::TooLarge { .. } | ValidationError::BodyTooLarge) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            Error::Validation(_) | Error::Conflict(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Persistence(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Error::Persistence(e) => {
                error!(error = %e, "Persistence failure");
                "Internal server error".to_string()
            }
            Error::Internal(e) => {
                error!(error = %e, "Internal failure");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(err.to_string())
    }
}
