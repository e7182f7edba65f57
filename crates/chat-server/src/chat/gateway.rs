//! Realtime gateway
//!
//! Owns the session registry and the message log and drives every live
//! connection through `Connecting -> Admitted -> Closed`. Socket I/O stays in
//! the per-connection writer task; the gateway only queues frames.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::registry::{roster_of, ConnectionHandle, ConnectionId, SessionRegistry};
use crate::core::auth::{AuthManager, DEFAULT_AVATAR};
use crate::core::error::{AuthError, Result};
use crate::core::models::{
    AvatarUpdate, ChatEvent, ClientEvent, FileShared, Roster, ServerEvent, TextMessage,
};
use crate::core::store::MessageLog;
use crate::core::uploads::avatar_url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Admitted,
    Closed,
}

/// Something that happened on one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Inbound(ClientEvent),
    Closed,
}

/// Gateway-side view of one live connection.
#[derive(Debug)]
pub struct Connection {
    identity: String,
    handle: ConnectionHandle,
    state: ConnectionState,
}

impl Connection {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn id(&self) -> ConnectionId {
        self.handle.id()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }
}

pub struct Gateway {
    registry: SessionRegistry,
    log: Arc<dyn MessageLog>,
    auth: Arc<AuthManager>,
    /// Keeps log order and broadcast order identical.
    publish_lock: tokio::sync::Mutex<()>,
    /// Serialises roster fan-outs so the last one sent is the newest.
    roster_lock: Mutex<()>,
    close_superseded: bool,
}

impl Gateway {
    pub fn new(log: Arc<dyn MessageLog>, auth: Arc<AuthManager>, close_superseded: bool) -> Self {
        Self {
            registry: SessionRegistry::new(),
            log,
            auth,
            publish_lock: tokio::sync::Mutex::new(()),
            roster_lock: Mutex::new(()),
            close_superseded,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Verify a connection token without touching any shared state.
    pub fn authenticate(&self, token: Option<&str>) -> std::result::Result<String, AuthError> {
        self.auth.verify_token(token)
    }

    /// Verify then admit. A bad token leaves the registry untouched.
    pub async fn connect(
        &self,
        token: Option<&str>,
        handle: ConnectionHandle,
    ) -> std::result::Result<Connection, AuthError> {
        let identity = self.authenticate(token).map_err(|e| {
            warn!("[Gateway] Connection refused: {}", e);
            e
        })?;
        Ok(self.admit(identity, handle).await)
    }

    /// Register an authenticated connection and announce the new roster.
    pub async fn admit(&self, identity: String, handle: ConnectionHandle) -> Connection {
        let mut conn = Connection {
            identity,
            handle,
            state: ConnectionState::Connecting,
        };

        let avatar = match self.auth.user_avatar(&conn.identity).await {
            Ok(file) => avatar_url(&file),
            Err(e) => {
                debug!("[Gateway] Avatar lookup for {} failed: {}", conn.identity, e);
                avatar_url(DEFAULT_AVATAR)
            }
        };

        if let Some(old) = self.registry.put(&conn.identity, conn.handle.clone(), avatar) {
            info!(
                "[Gateway] {} reconnected, superseding {}",
                conn.identity,
                old.handle.id()
            );
            if self.close_superseded {
                old.handle.close();
            }
        }

        conn.state = ConnectionState::Admitted;
        info!("[Gateway] {} connected ({})", conn.identity, conn.id());
        self.broadcast_roster();
        conn
    }

    /// Advance a connection's state machine by one event.
    pub async fn handle_event(&self, conn: &mut Connection, event: ConnectionEvent) {
        match (conn.state, event) {
            (ConnectionState::Admitted, ConnectionEvent::Inbound(ClientEvent::SendMessage { message })) => {
                if let Err(e) = self.send_message(&conn.identity, message).await {
                    error!("[Gateway] Message from {} not stored: {}", conn.identity, e);
                    let reply = ServerEvent::Error {
                        message: "Message could not be saved".to_string(),
                    };
                    if let Ok(frame) = serde_json::to_string(&reply) {
                        conn.handle.send(&frame);
                    }
                }
            }
            (ConnectionState::Admitted, ConnectionEvent::Closed) => self.disconnect(conn),
            (ConnectionState::Closed, _) => {}
            (ConnectionState::Connecting, event) => {
                debug!("[Gateway] Ignoring {:?} before admission", event);
            }
        }
    }

    /// Stamp, persist and broadcast a text message.
    pub async fn send_message(&self, sender: &str, body: String) -> Result<TextMessage> {
        let message = TextMessage::new(sender, body);
        self.publish(ChatEvent::Text(message.clone())).await?;
        Ok(message)
    }

    /// Persist and broadcast a file share.
    pub async fn share_file(&self, file: FileShared) -> Result<()> {
        self.publish(ChatEvent::File(file)).await
    }

    async fn publish(&self, event: ChatEvent) -> Result<()> {
        let _order = self.publish_lock.lock().await;
        self.log.append(event.clone()).await?;
        self.broadcast(&ServerEvent::from(event));
        Ok(())
    }

    /// Drop the connection's session if it is still current. Safe to repeat.
    pub fn disconnect(&self, conn: &mut Connection) {
        if conn.state == ConnectionState::Closed {
            return;
        }
        conn.state = ConnectionState::Closed;

        if self.registry.remove(&conn.identity, conn.id()) {
            info!("[Gateway] {} disconnected ({})", conn.identity, conn.id());
            self.broadcast_roster();
        } else {
            debug!(
                "[Gateway] Stale disconnect for {} ({}) ignored",
                conn.identity,
                conn.id()
            );
        }
    }

    /// Record a new avatar on the live session (if any) and tell everyone.
    pub fn announce_avatar(&self, identity: &str, avatar_url: &str) {
        if !self.registry.update_avatar(identity, avatar_url) {
            debug!("[Gateway] {} changed avatar while offline", identity);
        }
        self.broadcast(&ServerEvent::UpdateAvatar(AvatarUpdate {
            username: identity.to_string(),
            avatar_url: avatar_url.to_string(),
        }));
    }

    /// Last `n` chat events, oldest first.
    pub async fn recent(&self, n: usize) -> Result<Vec<ChatEvent>> {
        Ok(self.log.tail(n).await?)
    }

    pub fn roster(&self) -> Roster {
        self.registry.roster()
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    fn broadcast_roster(&self) {
        let _guard = self.roster_lock.lock();
        let roster = roster_of(&self.registry.snapshot());
        self.broadcast(&ServerEvent::UserList(roster));
    }

    /// Best-effort send to every session in the current snapshot.
    fn broadcast(&self, event: &ServerEvent) {
        let frame = match serde_json::to_string(event) {
            Ok(frame) => frame,
            Err(e) => {
                error!("[Gateway] Failed to encode event: {}", e);
                return;
            }
        };

        let snapshot = self.registry.snapshot();
        let mut dropped = 0;
        for session in snapshot.values() {
            if !session.handle.send(&frame) {
                dropped += 1;
            }
        }
        if dropped > 0 {
            debug!("[Gateway] {} connection(s) missed this frame", dropped);
        }
    }
}
