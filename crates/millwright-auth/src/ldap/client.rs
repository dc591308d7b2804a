//! Directory client adapter
//!
//! The login flow talks to the directory through the [`Directory`] and
//! [`DirectoryConnection`] traits. [`LdapDirectory`] implements them over
//! `ldap3`; every round trip goes through a [`ScopedConnection`] that bounds
//! it with a timeout and unbinds on every exit path.

use crate::error::DirectoryError;
use crate::ldap::types::*;
use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, SearchEntry};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Source of directory connections
#[async_trait]
pub trait Directory: Send + Sync {
    /// Open a new, unbound connection
    async fn connect(&self) -> Result<Box<dyn DirectoryConnection>, DirectoryError>;
}

/// A single directory connection
#[async_trait]
pub trait DirectoryConnection: Send {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<BindStatus, DirectoryError>;

    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attrs: &[&str],
    ) -> Result<Vec<DirectoryEntry>, DirectoryError>;

    async fn unbind(&mut self) -> Result<(), DirectoryError>;
}

/// Run one directory round trip under a timeout
pub(crate) async fn bounded<T, F>(timeout: Duration, op: F) -> Result<T, DirectoryError>
where
    F: Future<Output = Result<T, DirectoryError>>,
{
    match tokio::time::timeout(timeout, op).await {
        Ok(result) => result,
        Err(_) => Err(DirectoryError::Timeout(timeout)),
    }
}

/// Connection acquired for the duration of one flow step
///
/// Call [`ScopedConnection::release`] once the step has its result. If the
/// guard is dropped without being released (early return, cancellation, a
/// panic in the caller), the unbind is scheduled on the runtime instead.
pub struct ScopedConnection {
    inner: Option<Box<dyn DirectoryConnection>>,
    timeout: Duration,
}

impl ScopedConnection {
    /// Connect with the round-trip timeout applied to the connect itself
    pub async fn open(directory: &dyn Directory, timeout: Duration) -> Result<Self, DirectoryError> {
        let inner = bounded(timeout, directory.connect()).await?;
        Ok(Self {
            inner: Some(inner),
            timeout,
        })
    }

    fn conn(&mut self) -> Result<&mut Box<dyn DirectoryConnection>, DirectoryError> {
        self.inner.as_mut().ok_or(DirectoryError::Released)
    }

    pub async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<BindStatus, DirectoryError> {
        let timeout = self.timeout;
        let conn = self.conn()?;
        bounded(timeout, conn.simple_bind(dn, password)).await
    }

    pub async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attrs: &[&str],
    ) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        let timeout = self.timeout;
        let conn = self.conn()?;
        bounded(timeout, conn.search(base, scope, filter, attrs)).await
    }

    /// Unbind and close; failures are logged, not returned
    pub async fn release(mut self) {
        if let Some(mut conn) = self.inner.take() {
            if let Err(e) = bounded(self.timeout, conn.unbind()).await {
                warn!(error = %e, "Directory unbind failed");
            }
        }
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        if let Some(mut conn) = self.inner.take() {
            let timeout = self.timeout;
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(e) = bounded(timeout, conn.unbind()).await {
                            warn!(error = %e, "Deferred directory unbind failed");
                        }
                    });
                }
                Err(_) => debug!("No runtime available, dropping directory connection"),
            }
        }
    }
}

// ============================================================================
// ldap3 implementation
// ============================================================================

/// Directory backed by a real LDAP server
pub struct LdapDirectory {
    config: LdapConfig,
}

impl LdapDirectory {
    pub fn new(config: LdapConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LdapConfig {
        &self.config
    }

    fn settings(&self) -> LdapConnSettings {
        LdapConnSettings::new()
            .set_conn_timeout(self.config.timeout)
            .set_starttls(self.config.start_tls)
            .set_no_tls_verify(self.config.skip_tls_verify)
    }

    /// Bind with the service account and read the root DSE
    pub async fn test_connection(&self) -> Result<LdapServerInfo, DirectoryError> {
        let mut conn = ScopedConnection::open(self, self.config.timeout).await?;
        let result = self.read_root_dse(&mut conn).await;
        conn.release().await;
        result
    }

    async fn read_root_dse(&self, conn: &mut ScopedConnection) -> Result<LdapServerInfo, DirectoryError> {
        let status = conn
            .simple_bind(&self.config.bind_dn, &self.config.bind_password)
            .await?;
        if !status.is_success() {
            return Err(DirectoryError::Protocol(format!(
                "Service account bind failed: {:?}",
                status
            )));
        }

        let entries = conn
            .search(
                "",
                SearchScope::Base,
                "(objectClass=*)",
                &[
                    "vendorName",
                    "vendorVersion",
                    "namingContexts",
                    "supportedLDAPVersion",
                ],
            )
            .await?;

        let info = match entries.into_iter().next() {
            Some(entry) => LdapServerInfo {
                vendor: entry.first("vendorName").map(str::to_string),
                version: entry.first("vendorVersion").map(str::to_string),
                naming_contexts: entry.values("namingContexts").to_vec(),
                supported_ldap_version: entry.values("supportedLDAPVersion").to_vec(),
            },
            None => LdapServerInfo {
                vendor: None,
                version: None,
                naming_contexts: vec![],
                supported_ldap_version: vec!["3".to_string()],
            },
        };

        Ok(info)
    }
}

#[async_trait]
impl Directory for LdapDirectory {
    async fn connect(&self) -> Result<Box<dyn DirectoryConnection>, DirectoryError> {
        debug!("Connecting to LDAP server: {}", self.config.server_url);

        let (conn, ldap) = LdapConnAsync::with_settings(self.settings(), &self.config.server_url)
            .await
            .map_err(|e| DirectoryError::Connect(e.to_string()))?;

        ldap3::drive!(conn);

        Ok(Box::new(Ldap3Connection { ldap }))
    }
}

struct Ldap3Connection {
    ldap: Ldap,
}

#[async_trait]
impl DirectoryConnection for Ldap3Connection {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<BindStatus, DirectoryError> {
        let result = self.ldap.simple_bind(dn, password).await?;
        Ok(BindStatus::from_rc(result.rc))
    }

    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attrs: &[&str],
    ) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        let (rs, _res) = self
            .ldap
            .search(base, scope.into(), filter, attrs.to_vec())
            .await?
            .success()?;

        Ok(rs
            .into_iter()
            .map(|result| {
                let entry = SearchEntry::construct(result);
                DirectoryEntry {
                    dn: entry.dn,
                    attrs: entry.attrs.into_iter().collect(),
                }
            })
            .collect())
    }

    async fn unbind(&mut self) -> Result<(), DirectoryError> {
        self.ldap.unbind().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ldap::memory::InMemoryDirectory;

    #[tokio::test]
    async fn test_release_unbinds() {
        let directory = InMemoryDirectory::new();
        let conn = ScopedConnection::open(&directory, Duration::from_secs(1))
            .await
            .unwrap();
        conn.release().await;

        assert_eq!(directory.stats().opened, 1);
        assert_eq!(directory.stats().unbound, 1);
    }

    #[tokio::test]
    async fn test_drop_schedules_unbind() {
        let directory = InMemoryDirectory::new();
        {
            let _conn = ScopedConnection::open(&directory, Duration::from_secs(1))
                .await
                .unwrap();
        }
        // let the spawned unbind run
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(directory.stats().unbound, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_trip_timeout() {
        let directory = InMemoryDirectory::new().with_latency(Duration::from_secs(30));
        let result = ScopedConnection::open(&directory, Duration::from_secs(2)).await;
        assert!(matches!(result, Err(DirectoryError::Timeout(_))));
    }

    #[test]
    fn test_ldap_directory_settings() {
        let mut section = millwright_core::config::LdapConfigSection::default();
        section.server_url = "ldap://localhost:389".to_string();
        section.bind_dn = "cn=admin,dc=example,dc=com".to_string();
        section.user_search_base = "ou=People,dc=example,dc=com".to_string();
        section.group_search_base = "ou=Group,dc=example,dc=com".to_string();
        section.chief_group_id = Some(20010);

        let directory = LdapDirectory::new(LdapConfig::from_section(&section).unwrap());
        // Note: actual connection test requires running LDAP server
        assert_eq!(directory.config().timeout, Duration::from_secs(10));
    }
}
