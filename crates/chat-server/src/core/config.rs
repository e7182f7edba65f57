//! Chat server configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use crate::chat::gateway::Gateway;
use crate::core::auth::AuthManager;
use crate::core::uploads::UploadStore;

const DEV_JWT_SECRET: &str = "dev-only-chat-secret";

/// Configuration for the Chat Server
#[derive(Clone, Debug)]
pub struct ChatServerConfig {
    /// Socket address for the HTTP + WebSocket listener
    pub http_addr: SocketAddr,
    /// Root directory for the user database and message log
    pub data_dir: PathBuf,
    /// Avatar images, served under /avatars
    pub avatar_dir: PathBuf,
    /// Shared files, served under /uploads
    pub upload_dir: PathBuf,
    /// HMAC secret for access tokens
    pub jwt_secret: String,
    /// Access token lifetime in seconds
    pub token_ttl_secs: u64,
    /// Avatar size ceiling in bytes
    pub max_avatar_bytes: usize,
    /// Shared file size ceiling in bytes
    pub max_file_bytes: usize,
    /// Media types accepted by /upload_file
    pub allowed_file_types: Vec<String>,
    /// Number of events returned by /get_recent_messages
    pub history_limit: usize,
    /// bcrypt work factor
    pub bcrypt_cost: u32,
    /// Actively close a connection superseded by a reconnect of the same user
    pub close_superseded: bool,
    /// Keep the message log in memory only
    pub ephemeral: bool,
}

impl Default for ChatServerConfig {
    fn default() -> Self {
        Self::with_base_dir("chat_data")
    }
}

impl ChatServerConfig {
    /// Create config with custom base directory
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let data_dir = base_dir.into();
        Self {
            http_addr: ([0, 0, 0, 0], 9090).into(),
            avatar_dir: data_dir.join("public").join("avatars"),
            upload_dir: data_dir.join("public").join("uploads"),
            data_dir,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            token_ttl_secs: 60 * 60,
            max_avatar_bytes: 5 * 1024 * 1024,
            max_file_bytes: 10 * 1024 * 1024,
            allowed_file_types: default_allowed_types(),
            history_limit: 50,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            close_superseded: false,
            ephemeral: false,
        }
    }

    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = match std::env::var("CHAT_DATA_DIR") {
            Ok(dir) => Self::with_base_dir(dir),
            Err(_) => Self::default(),
        };

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default"),
            }
        } else if let Some(port) = env_parse::<u16>("PORT") {
            config.http_addr.set_port(port);
        }

        match std::env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => config.jwt_secret = secret,
            _ => tracing::warn!("JWT_SECRET not set, using development secret"),
        }

        if let Some(ttl) = env_parse("TOKEN_TTL_SECS") {
            config.token_ttl_secs = ttl;
        }
        if let Some(max) = env_parse("MAX_AVATAR_BYTES") {
            config.max_avatar_bytes = max;
        }
        if let Some(max) = env_parse("MAX_FILE_BYTES") {
            config.max_file_bytes = max;
        }
        if let Some(limit) = env_parse("HISTORY_LIMIT") {
            config.history_limit = limit;
        }
        if let Some(cost) = env_parse("BCRYPT_COST") {
            config.bcrypt_cost = cost;
        }

        if let Ok(types) = std::env::var("ALLOWED_FILE_TYPES") {
            let types: Vec<String> = types
                .split(',')
                .map(|t| t.trim().to_ascii_lowercase())
                .filter(|t| !t.is_empty())
                .collect();
            if !types.is_empty() {
                config.allowed_file_types = types;
            }
        }

        if let Ok(val) = std::env::var("CLOSE_SUPERSEDED") {
            config.close_superseded = env_flag(&val);
        }
        if let Ok(val) = std::env::var("CHAT_EPHEMERAL") {
            config.ephemeral = env_flag(&val);
        }

        config
    }

    pub fn user_db_path(&self) -> PathBuf {
        self.data_dir.join("users.sqlite")
    }

    pub fn message_log_path(&self) -> PathBuf {
        self.data_dir.join("messages.jsonl")
    }

    /// Largest request body any route has to accept, multipart framing included.
    pub fn body_limit(&self) -> usize {
        self.max_avatar_bytes.max(self.max_file_bytes) + 64 * 1024
    }

    /// Ensure all directories exist
    pub async fn ensure_dirs(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.data_dir).await?;
        tokio::fs::create_dir_all(&self.avatar_dir).await?;
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        Ok(())
    }
}

fn default_allowed_types() -> Vec<String> {
    [
        "image/jpeg",
        "image/png",
        "image/gif",
        "application/pdf",
        "text/plain",
        "application/msword",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "application/vnd.ms-excel",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparsable environment value");
            None
        }
    }
}

fn env_flag(val: &str) -> bool {
    val != "false" && val != "0" && !val.is_empty()
}

/// App state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ChatServerConfig>,
    pub auth: Arc<AuthManager>,
    pub gateway: Arc<Gateway>,
    pub uploads: Arc<UploadStore>,
}
