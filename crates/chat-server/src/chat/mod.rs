//! Chat Service Layer
//!
//! Realtime delivery, presence and shared history.

pub mod gateway;
pub mod handlers;
pub mod registry;

pub use gateway::{Connection, ConnectionEvent, ConnectionState, Gateway};
pub use handlers::router;
pub use registry::{ConnectionHandle, Outbound, SessionRegistry};
