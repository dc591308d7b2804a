//! Request guards

pub mod auth;

pub use auth::{only_chief, require_login};
