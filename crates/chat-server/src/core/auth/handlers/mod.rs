//! Auth Handlers

pub mod auth;
pub mod user_data;

pub use auth::{login, register};
pub use user_data::get_user_data;
