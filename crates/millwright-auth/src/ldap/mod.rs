//! LDAP directory access
//!
//! Provides:
//! - Directory client adapter over `ldap3` with scoped connections
//! - Validated directory configuration and escaped filter construction
//! - An in-memory directory for tests (`test-util` feature)

mod client;
mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod memory;

pub use client::{Directory, DirectoryConnection, LdapDirectory, ScopedConnection};
pub use types::*;
