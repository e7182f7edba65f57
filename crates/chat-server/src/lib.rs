//! Chat Server Library
//!
//! Single-room realtime chat: token auth, presence, persisted history,
//! avatars and file sharing over HTTP + WebSocket.

pub mod chat;
pub mod core;

use axum::{extract::DefaultBodyLimit, extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::chat::Gateway;
use crate::core::auth::AuthManager;
use crate::core::store::{JsonlMessageLog, MemoryMessageLog, MessageLog};
use crate::core::uploads::UploadStore;
use crate::core::{AppState, ChatServerConfig};

/// Install the global subscriber. `RUST_LOG` wins over the built-in filter.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "chat_server=debug,tower_http=info,info".into());

    // A second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

impl AppState {
    /// Open every store named by `config` and wire up the shared state.
    pub async fn build(config: ChatServerConfig) -> anyhow::Result<Self> {
        config.ensure_dirs().await?;

        let auth = Arc::new(AuthManager::open(&config).await?);
        info!("Users database: {:?}", config.user_db_path());

        let log: Arc<dyn MessageLog> = if config.ephemeral {
            info!("Message log: in memory");
            Arc::new(MemoryMessageLog::new())
        } else {
            let log = JsonlMessageLog::open(config.message_log_path()).await?;
            info!("Message log: {:?}", log.path());
            Arc::new(log)
        };

        let gateway = Arc::new(Gateway::new(log, auth.clone(), config.close_superseded));
        let uploads = Arc::new(UploadStore::new(&config));

        Ok(Self {
            config: Arc::new(config),
            auth,
            gateway,
            uploads,
        })
    }
}

/// Full HTTP + WebSocket surface.
pub fn build_app(state: AppState) -> Router {
    let body_limit = state.config.body_limit();

    Router::new()
        .merge(core::router(state.clone()))
        .merge(chat::router(state.clone()))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    info!("=== Chat Server ===");

    let config = ChatServerConfig::from_env();
    info!("Data directory: {:?}", config.data_dir);

    let addr = config.http_addr;
    let state = AppState::build(config).await?;
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Chat server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Chat server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.gateway.connection_count(),
    }))
}
