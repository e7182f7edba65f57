//! Authentication Module
//!
//! Handles user registration, login and access-token verification.
//! User records live behind the `UserStore` trait (SQLite by default).

pub mod handlers;
pub mod middleware;
pub mod token;

use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::config::ChatServerConfig;
use crate::core::error::{AuthError, Error, Result, StoreError, ValidationError};
use crate::core::store::{SqliteUserStore, UserRecord, UserStore};

pub use token::TokenKeys;

/// Avatar file every new user starts with.
pub const DEFAULT_AVATAR: &str = "default.jpg";

/// Auth manager handles all authentication
pub struct AuthManager {
    users: Arc<dyn UserStore>,
    tokens: TokenKeys,
    bcrypt_cost: u32,
}

impl AuthManager {
    pub fn new(users: Arc<dyn UserStore>, tokens: TokenKeys, bcrypt_cost: u32) -> Self {
        Self {
            users,
            tokens,
            bcrypt_cost,
        }
    }

    /// Open the SQLite user store configured for this server.
    pub async fn open(config: &ChatServerConfig) -> std::result::Result<Self, StoreError> {
        let users = SqliteUserStore::open(&config.user_db_path()).await?;
        let ttl = i64::try_from(config.token_ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        Ok(Self::new(
            Arc::new(users),
            TokenKeys::new(config.jwt_secret.as_bytes(), ttl),
            config.bcrypt_cost,
        ))
    }

    /// Register a new user
    pub async fn register(&self, username: &str, password: &str) -> Result<()> {
        validate_username(username)?;
        if password.is_empty() {
            return Err(ValidationError::EmptyPassword.into());
        }

        if self.users.get(username).await?.is_some() {
            info!("[Auth] Registration failed: {} already exists", username);
            return Err(Error::Conflict("User already exists".to_string()));
        }

        let password_hash = self.hash_password(password).await?;
        let user = UserRecord {
            username: username.to_string(),
            password_hash,
            avatar: DEFAULT_AVATAR.to_string(),
            created_at: Utc::now(),
        };

        // Two concurrent registrations can both pass the lookup above.
        if !self.users.insert(&user).await? {
            info!("[Auth] Registration failed: {} already exists", username);
            return Err(Error::Conflict("User already exists".to_string()));
        }

        info!("[Auth] User registered: {}", username);
        Ok(())
    }

    /// Check credentials and issue an access token
    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        let Some(user) = self.users.get(username).await? else {
            warn!("[Auth] Login failed: {} does not exist", username);
            return Err(AuthError::InvalidCredentials.into());
        };

        let password = password.to_string();
        let stored = user.password_hash.clone();
        let valid = tokio::task::spawn_blocking(move || verify(password, &stored))
            .await
            .map_err(|e| Error::Internal(e.to_string()))?
            .map_err(StoreError::from)?;

        if !valid {
            warn!("[Auth] Login failed: incorrect password for {}", username);
            return Err(AuthError::InvalidCredentials.into());
        }

        let token = self.tokens.issue(username)?;
        info!("[Auth] User logged in: {}", username);
        Ok(token)
    }

    /// Validate an access token and return its identity
    pub fn verify_token(&self, token: Option<&str>) -> std::result::Result<String, AuthError> {
        self.tokens.verify(token)
    }

    /// Avatar file name of a registered user
    pub async fn user_avatar(&self, username: &str) -> Result<String> {
        self.users
            .get(username)
            .await?
            .map(|u| u.avatar)
            .ok_or_else(|| Error::NotFound("User not found".to_string()))
    }

    /// Point a user's profile at a new avatar file
    pub async fn set_avatar(&self, username: &str, avatar: &str) -> Result<()> {
        if self.users.set_avatar(username, avatar).await? {
            Ok(())
        } else {
            Err(Error::NotFound("User not found".to_string()))
        }
    }

    async fn hash_password(&self, password: &str) -> Result<String> {
        let password = password.to_string();
        let cost = self.bcrypt_cost;
        let hashed = tokio::task::spawn_blocking(move || hash(password, cost))
            .await
            .map_err(|e| Error::Internal(e.to_string()))?
            .map_err(StoreError::from)?;
        Ok(hashed)
    }
}

/// Usernames double as avatar file names, so keep them path-safe.
pub fn validate_username(username: &str) -> std::result::Result<(), ValidationError> {
    let valid = !username.is_empty()
        && username.len() <= 32
        && !username.starts_with('.')
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));

    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidUsername)
    }
}
