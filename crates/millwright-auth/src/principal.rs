//! Session principal
//!
//! The principal is what later requests see of a login: the identity from
//! the directory plus the chief flag. It is composed once, after both
//! directory steps succeed, and installed into the session as a whole.

use crate::error::AuthResult;
use crate::ldap::DirectoryIdentity;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Outcome of the chief membership check
///
/// Only the membership resolver produces one, so `is_chief` always reflects
/// an actual directory answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorizationResult {
    is_chief: bool,
}

impl AuthorizationResult {
    pub(crate) fn from_membership(is_chief: bool) -> Self {
        Self { is_chief }
    }

    pub fn is_chief(&self) -> bool {
        self.is_chief
    }
}

/// Authenticated user as stored in the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPrincipal {
    common_name: String,
    uid: String,
    distinguished_name: String,
    is_chief: bool,
}

impl SessionPrincipal {
    pub fn compose(identity: DirectoryIdentity, authorization: AuthorizationResult) -> Self {
        Self {
            common_name: identity.common_name,
            uid: identity.uid,
            distinguished_name: identity.distinguished_name,
            is_chief: authorization.is_chief(),
        }
    }

    pub fn common_name(&self) -> &str {
        &self.common_name
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn distinguished_name(&self) -> &str {
        &self.distinguished_name
    }

    pub fn is_chief(&self) -> bool {
        self.is_chief
    }
}

/// Where a composed principal is installed
///
/// `install` replaces any principal already present. Implementations must
/// not leave a partially written principal behind on failure.
#[async_trait]
pub trait PrincipalStore: Send + Sync {
    async fn install(&self, principal: &SessionPrincipal) -> AuthResult<()>;
}

#[cfg(any(test, feature = "test-util"))]
pub mod memory {
    //! Principal store backed by a mutex, for tests

    use super::*;
    use crate::error::AuthError;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryPrincipalStore {
        principal: Mutex<Option<SessionPrincipal>>,
        failing: bool,
    }

    impl MemoryPrincipalStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Store whose writes always fail
        pub fn failing() -> Self {
            Self {
                principal: Mutex::new(None),
                failing: true,
            }
        }

        pub fn current(&self) -> Option<SessionPrincipal> {
            self.principal
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
        }
    }

    #[async_trait]
    impl PrincipalStore for MemoryPrincipalStore {
        async fn install(&self, principal: &SessionPrincipal) -> AuthResult<()> {
            if self.failing {
                return Err(AuthError::SessionWrite("store unavailable".to_string()));
            }
            *self.principal.lock().unwrap_or_else(|e| e.into_inner()) = Some(principal.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> DirectoryIdentity {
        DirectoryIdentity {
            common_name: "John Doe".to_string(),
            uid: "jdoe".to_string(),
            distinguished_name: "cn=John Doe,ou=People,dc=example,dc=com".to_string(),
        }
    }

    #[test]
    fn test_compose() {
        let principal =
            SessionPrincipal::compose(identity(), AuthorizationResult::from_membership(true));
        assert_eq!(principal.common_name(), "John Doe");
        assert_eq!(principal.uid(), "jdoe");
        assert!(principal.is_chief());

        let principal =
            SessionPrincipal::compose(identity(), AuthorizationResult::from_membership(false));
        assert!(!principal.is_chief());
    }

    #[test]
    fn test_serde_shape() {
        let principal =
            SessionPrincipal::compose(identity(), AuthorizationResult::from_membership(true));
        let json = serde_json::to_value(&principal).unwrap();
        assert_eq!(json["uid"], "jdoe");
        assert_eq!(json["is_chief"], true);

        let back: SessionPrincipal = serde_json::from_value(json).unwrap();
        assert_eq!(back, principal);
    }

    #[tokio::test]
    async fn test_memory_store_replaces_principal() {
        let store = memory::MemoryPrincipalStore::new();
        let first =
            SessionPrincipal::compose(identity(), AuthorizationResult::from_membership(true));
        let mut other = identity();
        other.uid = "mmajor".to_string();
        let second = SessionPrincipal::compose(other, AuthorizationResult::from_membership(false));

        store.install(&first).await.unwrap();
        store.install(&second).await.unwrap();

        let current = store.current().unwrap();
        assert_eq!(current.uid(), "mmajor");
        assert!(!current.is_chief());
    }
}
