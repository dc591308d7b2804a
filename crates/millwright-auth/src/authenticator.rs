//! Credential authentication
//!
//! Search-then-bind: the service account locates the user entry by the
//! configured login attribute, then the same connection re-binds as that
//! entry with the supplied password.

use crate::error::{AuthError, AuthResult, DirectoryError};
use crate::ldap::{
    BindStatus, Credentials, Directory, DirectoryIdentity, LdapConfig, ScopedConnection,
    SearchScope,
};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct Authenticator {
    directory: Arc<dyn Directory>,
    config: Arc<LdapConfig>,
}

impl Authenticator {
    pub fn new(directory: Arc<dyn Directory>, config: Arc<LdapConfig>) -> Self {
        Self { directory, config }
    }

    /// Validate credentials and return the bound identity
    ///
    /// Unknown users, ambiguous matches and rejected binds all fail with
    /// [`AuthError::Authentication`]; transport and service-account failures
    /// fail with [`AuthError::DirectoryUnavailable`].
    pub async fn authenticate(&self, credentials: &Credentials) -> AuthResult<DirectoryIdentity> {
        let username = credentials.username.trim();

        // An empty password would be an unauthenticated bind, which succeeds
        if username.is_empty() || credentials.password.is_empty() {
            debug!("Rejecting login with empty username or password");
            return Err(AuthError::Authentication);
        }

        let mut conn = ScopedConnection::open(self.directory.as_ref(), self.config.timeout).await?;
        let result = self
            .search_then_bind(&mut conn, username, &credentials.password)
            .await;
        conn.release().await;

        result
    }

    async fn search_then_bind(
        &self,
        conn: &mut ScopedConnection,
        username: &str,
        password: &str,
    ) -> AuthResult<DirectoryIdentity> {
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

        let filter = self.config.build_user_filter(username);
        debug!("Searching for user with filter: {}", filter);

        let mut entries = conn
            .search(
                &self.config.user_search_base,
                SearchScope::Subtree,
                &filter,
                &[
                    self.config.uid_attribute.as_str(),
                    self.config.common_name_attribute.as_str(),
                ],
            )
            .await?;

        if entries.len() != 1 {
            debug!(matches = entries.len(), "User lookup did not yield a single entry");
            return Err(AuthError::Authentication);
        }
        let entry = entries.remove(0);

        match conn.simple_bind(&entry.dn, password).await? {
            BindStatus::Success => {}
            BindStatus::InvalidCredentials => return Err(AuthError::Authentication),
            BindStatus::Rejected(rc) => {
                debug!(rc, "User bind rejected");
                return Err(AuthError::Authentication);
            }
        }

        let uid = match entry.first(&self.config.uid_attribute) {
            Some(uid) if !uid.is_empty() => uid.to_string(),
            _ => {
                warn!(dn = %entry.dn, "Directory entry has no uid attribute");
                return Err(AuthError::Authentication);
            }
        };

        let common_name = entry
            .first(&self.config.common_name_attribute)
            .unwrap_or(username)
            .to_string();

        Ok(DirectoryIdentity {
            common_name,
            uid,
            distinguished_name: entry.dn,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ldap::memory::{fixture_config, InMemoryDirectory, PEOPLE_BASE};
    use crate::ldap::DirectoryEntry;

    fn authenticator(directory: &InMemoryDirectory) -> Authenticator {
        Authenticator::new(Arc::new(directory.clone()), Arc::new(fixture_config()))
    }

    fn directory() -> InMemoryDirectory {
        InMemoryDirectory::new()
            .with_user("John Doe", "jdoe", "s3cret")
            .with_user("Mary Major", "mmajor", "hunter2")
    }

    #[tokio::test]
    async fn test_valid_credentials() {
        let directory = directory();
        let identity = authenticator(&directory)
            .authenticate(&Credentials::new("John Doe", "s3cret"))
            .await
            .unwrap();

        assert_eq!(identity.uid, "jdoe");
        assert_eq!(identity.common_name, "John Doe");
        assert_eq!(
            identity.distinguished_name,
            format!("cn=John Doe,{}", PEOPLE_BASE)
        );

        // one connection, released
        let stats = directory.stats();
        assert_eq!(stats.opened, 1);
        assert_eq!(stats.unbound, 1);
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_user_are_indistinguishable() {
        let directory = directory();
        let auth = authenticator(&directory);

        let wrong_password = auth
            .authenticate(&Credentials::new("John Doe", "nope"))
            .await
            .unwrap_err();
        let unknown_user = auth
            .authenticate(&Credentials::new("Nobody", "s3cret"))
            .await
            .unwrap_err();

        assert!(matches!(wrong_password, AuthError::Authentication));
        assert!(matches!(unknown_user, AuthError::Authentication));
        assert_eq!(wrong_password.user_message(), unknown_user.user_message());
        assert_eq!(directory.stats().unbound, 2);
    }

    #[tokio::test]
    async fn test_empty_password_never_reaches_directory() {
        let directory = directory();
        let err = authenticator(&directory)
            .authenticate(&Credentials::new("John Doe", ""))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::Authentication));
        assert_eq!(directory.stats().opened, 0);
    }

    #[tokio::test]
    async fn test_wildcard_username_does_not_match_everyone() {
        let directory = directory();
        let err = authenticator(&directory)
            .authenticate(&Credentials::new("*", "s3cret"))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::Authentication));
        assert_eq!(directory.filters()[0].to_ascii_lowercase(), "(cn=\\2a)");
    }

    #[tokio::test]
    async fn test_entry_without_uid_is_rejected() {
        let directory = InMemoryDirectory::new();
        directory.add_entry(
            DirectoryEntry::new(format!("cn=Ghost,{}", PEOPLE_BASE)).with_attr("cn", "Ghost"),
            Some("boo"),
        );

        let err = authenticator(&directory)
            .authenticate(&Credentials::new("Ghost", "boo"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Authentication));
    }

    #[tokio::test]
    async fn test_unreachable_directory() {
        let directory = directory();
        directory.set_unreachable(true);

        let err = authenticator(&directory)
            .authenticate(&Credentials::new("John Doe", "s3cret"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::DirectoryUnavailable(_)));
    }

    #[tokio::test]
    async fn test_service_bind_failure_is_directory_error() {
        let directory = directory();
        let mut config = fixture_config();
        config.bind_password = "wrong".to_string();
        let auth = Authenticator::new(Arc::new(directory.clone()), Arc::new(config));

        let err = auth
            .authenticate(&Credentials::new("John Doe", "s3cret"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::DirectoryUnavailable(_)));
        assert_eq!(directory.stats().unbound, 1);
    }
}
