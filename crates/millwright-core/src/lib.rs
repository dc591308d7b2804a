//! Millwright Core Library
//!
//! Core types, configuration and errors for the Millwright equipment
//! management service.

pub mod config;
pub mod error;
pub mod types;
pub mod utils;

pub use config::MillwrightConfig;
pub use error::{Error, Result};

/// Millwright version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 5002;

/// Default session lifetime (1 hour of inactivity)
pub const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60;

/// Maximum machine id length
pub const MAX_MACHINE_ID_LENGTH: usize = 64;

/// Maximum length of free-text fields (descriptions, positions)
pub const MAX_TEXT_LENGTH: usize = 4096;
