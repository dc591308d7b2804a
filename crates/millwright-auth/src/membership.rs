//! Chief group membership resolution

use crate::error::{AuthResult, DirectoryError};
use crate::ldap::{
    Directory, DirectoryIdentity, GroupMembershipQuery, LdapConfig, ScopedConnection, SearchScope,
};
use crate::principal::AuthorizationResult;
use std::sync::Arc;
use tracing::debug;

/// Decides whether an identity belongs to the chief group
///
/// Always binds with the service account, never with the user's
/// credentials, on a connection of its own.
pub struct MembershipResolver {
    directory: Arc<dyn Directory>,
    config: Arc<LdapConfig>,
}

impl MembershipResolver {
    pub fn new(directory: Arc<dyn Directory>, config: Arc<LdapConfig>) -> Self {
        Self { directory, config }
    }

    /// Resolve membership for an authenticated identity
    ///
    /// Search failures propagate as [`AuthError::DirectoryUnavailable`];
    /// they are never reported as "not a member".
    pub async fn resolve(&self, identity: &DirectoryIdentity) -> AuthResult<AuthorizationResult> {
        let query = self.config.membership_query(identity);

        let mut conn = ScopedConnection::open(self.directory.as_ref(), self.config.timeout).await?;
        let result = self.search_membership(&mut conn, &query).await;
        conn.release().await;

        let is_chief = result?;
        debug!(uid = %query.target_uid, is_chief, "Resolved chief membership");

        Ok(AuthorizationResult::from_membership(is_chief))
    }

    async fn search_membership(
        &self,
        conn: &mut ScopedConnection,
        query: &GroupMembershipQuery,
    ) -> AuthResult<bool> {
        let status = conn
            .simple_bind(&self.config.bind_dn, &self.config.bind_password)
            .await?;
        if !status.is_success() {
            return Err(DirectoryError::Protocol(format!(
                "Service account bind failed: {:?}",
                status
            ))
            .into());
        }

        let entries = conn
            .search(
                &self.config.group_search_base,
                SearchScope::Subtree,
                &query.group_filter,
                &["cn"],
            )
            .await?;

        Ok(!entries.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;
    use crate::ldap::memory::{fixture_config, InMemoryDirectory, CHIEF_GID, GROUP_BASE};

    fn identity(uid: &str) -> DirectoryIdentity {
        DirectoryIdentity {
            common_name: uid.to_string(),
            uid: uid.to_string(),
            distinguished_name: format!("cn={},ou=People,dc=example,dc=com", uid),
        }
    }

    fn resolver(directory: &InMemoryDirectory) -> MembershipResolver {
        MembershipResolver::new(Arc::new(directory.clone()), Arc::new(fixture_config()))
    }

    fn directory() -> InMemoryDirectory {
        InMemoryDirectory::new()
            .with_group("staff", 20000, &["alice", "bob", "carol"])
            .with_group("chiefs", CHIEF_GID, &["alice", "dave"])
            .with_group("night-shift", 20020, &["bob"])
    }

    #[tokio::test]
    async fn test_members_and_non_members() {
        let directory = directory();
        let resolver = resolver(&directory);

        assert!(resolver.resolve(&identity("alice")).await.unwrap().is_chief());
        assert!(resolver.resolve(&identity("dave")).await.unwrap().is_chief());
        assert!(!resolver.resolve(&identity("bob")).await.unwrap().is_chief());
        assert!(!resolver.resolve(&identity("zed")).await.unwrap().is_chief());

        let stats = directory.stats();
        assert_eq!(stats.opened, 4);
        assert_eq!(stats.unbound, 4);
    }

    #[tokio::test]
    async fn test_unrelated_group_order_does_not_matter() {
        let forward = InMemoryDirectory::new()
            .with_group("a", 1, &["erin"])
            .with_group("chiefs", CHIEF_GID, &["erin"])
            .with_group("b", 2, &["erin"]);
        let reversed = InMemoryDirectory::new()
            .with_group("b", 2, &["erin"])
            .with_group("chiefs", CHIEF_GID, &["erin"])
            .with_group("a", 1, &["erin"]);

        assert!(resolver(&forward).resolve(&identity("erin")).await.unwrap().is_chief());
        assert!(resolver(&reversed).resolve(&identity("erin")).await.unwrap().is_chief());
    }

    #[tokio::test]
    async fn test_injection_uid_does_not_widen_match() {
        let directory = directory();
        let result = resolver(&directory)
            .resolve(&identity("*)(uid=*"))
            .await
            .unwrap();
        assert!(!result.is_chief());

        let sent = directory.filters();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("(&(objectClass=posixGroup)(gidNumber=20010)(memberUid="));
        assert_eq!(sent[0].matches('(').count(), 4);
    }

    #[tokio::test]
    async fn test_search_error_is_not_a_downgrade() {
        let directory = directory().fail_searches_under(GROUP_BASE);
        let err = resolver(&directory).resolve(&identity("alice")).await.unwrap_err();

        assert!(matches!(err, AuthError::DirectoryUnavailable(_)));
        assert_eq!(directory.stats().unbound, 1);
    }

    #[tokio::test]
    async fn test_service_bind_failure() {
        let directory = directory();
        let mut config = fixture_config();
        config.bind_password = "wrong".to_string();
        let resolver = MembershipResolver::new(Arc::new(directory.clone()), Arc::new(config));

        let err = resolver.resolve(&identity("alice")).await.unwrap_err();
        assert!(matches!(err, AuthError::DirectoryUnavailable(_)));
        assert_eq!(directory.stats().searches, 0);
        assert_eq!(directory.stats().unbound, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_timeout() {
        let directory = directory().with_latency(std::time::Duration::from_secs(60));
        let err = resolver(&directory).resolve(&identity("alice")).await.unwrap_err();
        assert!(matches!(err, AuthError::DirectoryUnavailable(_)));
    }
}
