//! Login flow
//!
//! authenticate -> resolve membership -> compose -> install. Each step runs
//! only after the previous one succeeded, and nothing is installed unless
//! all of them did.

use crate::authenticator::Authenticator;
use crate::error::AuthResult;
use crate::ldap::{Credentials, Directory, LdapConfig};
use crate::membership::MembershipResolver;
use crate::principal::{PrincipalStore, SessionPrincipal};
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub struct LoginFlow {
    authenticator: Authenticator,
    resolver: MembershipResolver,
}

impl LoginFlow {
    pub fn new(directory: Arc<dyn Directory>, config: LdapConfig) -> Self {
        let config = Arc::new(config);
        Self {
            authenticator: Authenticator::new(directory.clone(), config.clone()),
            resolver: MembershipResolver::new(directory, config),
        }
    }

    /// Log a user in and install the resulting principal into `store`
    #[instrument(skip_all, fields(username = %credentials.username))]
    pub async fn login(
        &self,
        credentials: Credentials,
        store: &dyn PrincipalStore,
    ) -> AuthResult<SessionPrincipal> {
        let result = self.run(credentials, store).await;

        match &result {
            Ok(principal) => info!(
                uid = %principal.uid(),
                is_chief = principal.is_chief(),
                "Login succeeded"
            ),
            Err(e) => warn!(kind = e.kind(), error = %e, "Login failed"),
        }

        result
    }

    async fn run(
        &self,
        credentials: Credentials,
        store: &dyn PrincipalStore,
    ) -> AuthResult<SessionPrincipal> {
        let identity = self.authenticator.authenticate(&credentials).await?;
        drop(credentials);

        let authorization = self.resolver.resolve(&identity).await?;
        let principal = SessionPrincipal::compose(identity, authorization);

        store.install(&principal).await?;
        Ok(principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;
    use crate::ldap::memory::{fixture_config, InMemoryDirectory, CHIEF_GID, GROUP_BASE};
    use crate::principal::memory::MemoryPrincipalStore;

    fn directory() -> InMemoryDirectory {
        InMemoryDirectory::new()
            .with_user("John Doe", "jdoe", "s3cret")
            .with_user("Mary Major", "mmajor", "hunter2")
            .with_group("staff", 20000, &["jdoe", "mmajor"])
            .with_group("chiefs", CHIEF_GID, &["mmajor"])
    }

    fn flow(directory: &InMemoryDirectory) -> LoginFlow {
        LoginFlow::new(Arc::new(directory.clone()), fixture_config())
    }

    #[tokio::test]
    async fn test_chief_login() {
        let directory = directory();
        let store = MemoryPrincipalStore::new();

        let principal = flow(&directory)
            .login(Credentials::new("Mary Major", "hunter2"), &store)
            .await
            .unwrap();

        assert!(principal.is_chief());
        assert_eq!(store.current(), Some(principal));

        // authentication and membership each used their own connection
        let stats = directory.stats();
        assert_eq!(stats.opened, 2);
        assert_eq!(stats.unbound, 2);
    }

    #[tokio::test]
    async fn test_non_chief_login() {
        let directory = directory();
        let store = MemoryPrincipalStore::new();

        let principal = flow(&directory)
            .login(Credentials::new("John Doe", "s3cret"), &store)
            .await
            .unwrap();

        assert!(!principal.is_chief());
        assert_eq!(principal.uid(), "jdoe");
    }

    #[tokio::test]
    async fn test_rejected_login_installs_nothing() {
        let directory = directory();
        let store = MemoryPrincipalStore::new();

        let err = flow(&directory)
            .login(Credentials::new("John Doe", "wrong"), &store)
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::Authentication));
        assert!(store.current().is_none());
        // membership was never consulted
        assert_eq!(directory.stats().opened, 1);
    }

    #[tokio::test]
    async fn test_membership_failure_aborts_login() {
        let directory = directory().fail_searches_under(GROUP_BASE);
        let store = MemoryPrincipalStore::new();

        let err = flow(&directory)
            .login(Credentials::new("Mary Major", "hunter2"), &store)
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::DirectoryUnavailable(_)));
        assert!(store.current().is_none());
        assert_eq!(directory.stats().unbound, 2);
    }

    #[tokio::test]
    async fn test_session_write_failure() {
        let directory = directory();
        let store = MemoryPrincipalStore::failing();

        let err = flow(&directory)
            .login(Credentials::new("Mary Major", "hunter2"), &store)
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::SessionWrite(_)));
        assert_eq!(err.kind(), "session_error");
    }

    #[tokio::test]
    async fn test_relogin_replaces_principal() {
        let directory = directory();
        let store = MemoryPrincipalStore::new();
        let flow = flow(&directory);

        flow.login(Credentials::new("Mary Major", "hunter2"), &store)
            .await
            .unwrap();
        flow.login(Credentials::new("John Doe", "s3cret"), &store)
            .await
            .unwrap();

        let current = store.current().unwrap();
        assert_eq!(current.uid(), "jdoe");
        assert!(!current.is_chief());
    }
}
