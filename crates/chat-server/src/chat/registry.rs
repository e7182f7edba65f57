//! Session registry: who is online right now.
//!
//! One entry per identity. A reconnect overwrites the entry, and a disconnect
//! only removes it when the stored connection id is still its own, so a late
//! disconnect from a superseded connection cannot evict the newer one.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;
use uuid::Uuid;

use crate::core::models::{Roster, RosterEntry};

pub type ConnectionId = Uuid;

/// Instructions for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(String),
    Close,
}

/// Frames queued per connection before new ones are dropped.
pub const OUTBOUND_CAPACITY: usize = 256;

/// Sending half of one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: mpsc::Sender<Outbound>,
}

impl ConnectionHandle {
    pub fn new(sender: mpsc::Sender<Outbound>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a text frame. Returns `false` if the writer is gone or the
    /// client has fallen too far behind; the frame is dropped either way.
    pub fn send(&self, frame: &str) -> bool {
        match self.sender.try_send(Outbound::Frame(frame.to_owned())) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("[Registry] Outbound queue full for {}, dropping frame", self.id);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Ask the writer to close the socket. Queued behind pending frames when
    /// the queue is full, so it is never dropped.
    pub fn close(&self) -> bool {
        match self.sender.try_send(Outbound::Close) {
            Ok(()) => true,
            Err(TrySendError::Full(close)) => {
                let sender = self.sender.clone();
                tokio::spawn(async move {
                    let _ = sender.send(close).await;
                });
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// New handle plus the receiver its writer task drains.
pub fn channel() -> (ConnectionHandle, mpsc::Receiver<Outbound>) {
    let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
    (ConnectionHandle::new(tx), rx)
}

#[derive(Debug, Clone)]
pub struct Session {
    pub identity: String,
    pub handle: ConnectionHandle,
    /// Public URL of the user's avatar
    pub avatar: String,
}

/// identity -> session, copied out for fan-out.
pub type Snapshot = BTreeMap<String, Session>;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<Snapshot>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `identity` on `handle`, returning the session it superseded.
    pub fn put(&self, identity: &str, handle: ConnectionHandle, avatar: String) -> Option<Session> {
        let id = handle.id();
        let session = Session {
            identity: identity.to_owned(),
            handle,
            avatar,
        };
        let previous = self.sessions.lock().insert(identity.to_owned(), session);
        previous.filter(|old| old.handle.id() != id)
    }

    /// Remove `identity` only if it is still bound to `connection`.
    pub fn remove(&self, identity: &str, connection: ConnectionId) -> bool {
        let mut sessions = self.sessions.lock();
        match sessions.get(identity) {
            Some(session) if session.handle.id() == connection => {
                sessions.remove(identity);
                true
            }
            _ => false,
        }
    }

    /// Point a live session at a new avatar. No-op if the user is offline.
    pub fn update_avatar(&self, identity: &str, avatar: &str) -> bool {
        match self.sessions.lock().get_mut(identity) {
            Some(session) => {
                session.avatar = avatar.to_owned();
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.sessions.lock().clone()
    }

    pub fn roster(&self) -> Roster {
        roster_of(&self.snapshot())
    }

    pub fn get(&self, identity: &str) -> Option<Session> {
        self.sessions.lock().get(identity).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

pub fn roster_of(snapshot: &Snapshot) -> Roster {
    snapshot
        .iter()
        .map(|(identity, session)| {
            (
                identity.clone(),
                RosterEntry {
                    connection_id: session.handle.id().to_string(),
                    avatar: session.avatar.clone(),
                },
            )
        })
        .collect()
}
