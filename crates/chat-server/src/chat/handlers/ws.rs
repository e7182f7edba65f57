//! Realtime socket
//!
//! The token is verified before the upgrade is accepted, so an unauthenticated
//! client gets a plain HTTP error and never becomes a session.

use crate::chat::gateway::{ConnectionEvent, Gateway};
use crate::chat::registry::{self, Outbound};
use crate::core::auth::token::bearer_token;
use crate::core::config::AppState;
use crate::core::error::Result;
use crate::core::models::ClientEvent;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, HeaderMap},
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// GET /ws?token=...
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response> {
    let header_token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token);
    let token = params.token.as_deref().or(header_token);

    let identity = state.gateway.authenticate(token).map_err(|e| {
        warn!("Socket authentication error: {}", e);
        e
    })?;

    let gateway = state.gateway.clone();
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, gateway, identity)))
}

async fn handle_socket(socket: WebSocket, gateway: Arc<Gateway>, identity: String) {
    let (handle, mut outbound) = registry::channel();
    let mut conn = gateway.admit(identity, handle).await;
    let (mut sink, mut stream) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(out) = outbound.recv().await {
            match out {
                Outbound::Frame(frame) => {
                    if sink.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ClientEvent>(text.as_str()) {
                        Ok(event) => {
                            gateway
                                .handle_event(&mut conn, ConnectionEvent::Inbound(event))
                                .await;
                        }
                        Err(e) => debug!("Ignoring frame from {}: {}", conn.identity(), e),
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Socket error for {}: {}", conn.identity(), e);
                    break;
                }
            },
            // Writer stopped: peer went away or we were told to close.
            _ = &mut writer => break,
        }
    }

    info!("Socket closed for {}", conn.identity());
    gateway.handle_event(&mut conn, ConnectionEvent::Closed).await;
    writer.abort();
}
