//! Core Service Layer
//!
//! Shared infrastructure for the chat server: configuration, errors,
//! authentication, persistence, uploads and the wire models.

pub mod auth;
pub mod config;
pub mod ctx;
pub mod error;
pub mod models;
pub mod router;
pub mod store;
pub mod uploads;

// Re-exports for convenience
pub use config::{AppState, ChatServerConfig};
pub use ctx::Ctx;
pub use error::{Error, Result};
pub use router::router;
