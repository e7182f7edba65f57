//! Persistence layer
//!
//! The rest of the server only sees the `MessageLog` and `UserStore`
//! capability traits; the engines behind them are swappable.

pub mod message_log;
pub mod users;

pub use message_log::{JsonlMessageLog, MemoryMessageLog, MessageLog};
pub use users::{SqliteUserStore, UserRecord, UserStore};
