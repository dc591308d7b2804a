//! LDAP types and configuration
//!
//! Covers:
//! - Runtime directory configuration and filter construction
//! - Credentials and the identity produced by a successful login
//! - Directory entries and bind outcomes

use crate::error::AuthError;
use ldap3::ldap_escape;
use millwright_core::config::LdapConfigSection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

// ============================================================================
// LDAP Configuration
// ============================================================================

/// Validated directory configuration
#[derive(Clone)]
pub struct LdapConfig {
    /// LDAP server URL (ldap:// or ldaps://)
    pub server_url: String,

    /// Use STARTTLS for connection upgrade
    pub start_tls: bool,

    /// Skip TLS certificate verification (not recommended for production)
    pub skip_tls_verify: bool,

    /// Service account DN
    pub bind_dn: String,

    /// Service account password
    pub bind_password: String,

    /// Base DN for user searches
    pub user_search_base: String,

    /// Attribute the login name is matched against
    pub username_attribute: String,

    /// Attribute holding the uid used for group membership
    pub uid_attribute: String,

    /// Attribute holding the common name
    pub common_name_attribute: String,

    /// Base DN for group searches
    pub group_search_base: String,

    /// Group object class, e.g. "posixGroup"
    pub group_object_class: String,

    /// Numeric group id attribute, e.g. "gidNumber"
    pub group_id_attribute: String,

    /// Id of the chief group
    pub chief_group_id: u32,

    /// Membership attribute, e.g. "memberUid"
    pub membership_attribute: String,

    /// Timeout applied to each directory round trip
    pub timeout: Duration,
}

impl fmt::Debug for LdapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LdapConfig")
            .field("server_url", &self.server_url)
            .field("start_tls", &self.start_tls)
            .field("skip_tls_verify", &self.skip_tls_verify)
            .field("bind_dn", &self.bind_dn)
            .field("bind_password", &"<redacted>")
            .field("user_search_base", &self.user_search_base)
            .field("username_attribute", &self.username_attribute)
            .field("uid_attribute", &self.uid_attribute)
            .field("common_name_attribute", &self.common_name_attribute)
            .field("group_search_base", &self.group_search_base)
            .field("group_object_class", &self.group_object_class)
            .field("group_id_attribute", &self.group_id_attribute)
            .field("chief_group_id", &self.chief_group_id)
            .field("membership_attribute", &self.membership_attribute)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl LdapConfig {
    /// Build and validate from the configuration file section
    pub fn from_section(section: &LdapConfigSection) -> Result<Self, AuthError> {
        let chief_group_id = section
            .chief_group_id
            .ok_or_else(|| AuthError::Config("Chief group id is required".to_string()))?;

        let config = Self {
            server_url: section.server_url.clone(),
            start_tls: section.start_tls,
            skip_tls_verify: section.skip_tls_verify,
            bind_dn: section.bind_dn.clone(),
            bind_password: section.bind_password.clone(),
            user_search_base: section.user_search_base.clone(),
            username_attribute: section.username_attribute.clone(),
            uid_attribute: section.uid_attribute.clone(),
            common_name_attribute: section.common_name_attribute.clone(),
            group_search_base: section.group_search_base.clone(),
            group_object_class: section.group_object_class.clone(),
            group_id_attribute: section.group_id_attribute.clone(),
            chief_group_id,
            membership_attribute: section.membership_attribute.clone(),
            timeout: Duration::from_secs(section.timeout_seconds.max(1)),
        };

        config.validate().map_err(AuthError::Config)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.server_url.is_empty() {
            return Err("Server URL is required".to_string());
        }

        if !self.server_url.starts_with("ldap://") && !self.server_url.starts_with("ldaps://") {
            return Err("Server URL must start with ldap:// or ldaps://".to_string());
        }

        if self.bind_dn.is_empty() {
            return Err("Bind DN is required".to_string());
        }

        if self.user_search_base.is_empty() {
            return Err("User search base is required".to_string());
        }

        if self.group_search_base.is_empty() {
            return Err("Group search base is required".to_string());
        }

        for (name, value) in [
            ("username_attribute", &self.username_attribute),
            ("uid_attribute", &self.uid_attribute),
            ("common_name_attribute", &self.common_name_attribute),
            ("group_object_class", &self.group_object_class),
            ("group_id_attribute", &self.group_id_attribute),
            ("membership_attribute", &self.membership_attribute),
        ] {
            if !is_attribute_name(value) {
                return Err(format!("{} is not a valid attribute name: {:?}", name, value));
            }
        }

        Ok(())
    }

    /// Filter locating a user entry by login name
    pub fn build_user_filter(&self, username: &str) -> String {
        format!("({}={})", self.username_attribute, ldap_escape(username))
    }

    /// Filter matching the chief group only if it lists `uid` as a member
    pub fn build_membership_filter(&self, uid: &str) -> String {
        format!(
            "(&(objectClass={})({}={})({}={}))",
            self.group_object_class,
            self.group_id_attribute,
            self.chief_group_id,
            self.membership_attribute,
            ldap_escape(uid)
        )
    }

    /// Membership query for an authenticated identity
    pub fn membership_query(&self, identity: &DirectoryIdentity) -> GroupMembershipQuery {
        GroupMembershipQuery {
            target_uid: identity.uid.clone(),
            group_filter: self.build_membership_filter(&identity.uid),
        }
    }
}

/// Attribute descriptions are a letter followed by letters, digits or hyphens
fn is_attribute_name(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

// ============================================================================
// Login data
// ============================================================================

/// Login credentials, discarded once the bind attempt completes
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Identity established by a successful bind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryIdentity {
    pub common_name: String,
    pub uid: String,
    pub distinguished_name: String,
}

/// Group membership search derived from an identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMembershipQuery {
    pub target_uid: String,
    pub group_filter: String,
}

// ============================================================================
// Directory protocol data
// ============================================================================

/// Search scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    Base,
    OneLevel,
    Subtree,
}

impl From<SearchScope> for ldap3::Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => ldap3::Scope::Base,
            SearchScope::OneLevel => ldap3::Scope::OneLevel,
            SearchScope::Subtree => ldap3::Scope::Subtree,
        }
    }
}

/// Outcome of a simple bind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindStatus {
    Success,
    /// RC 49
    InvalidCredentials,
    /// Any other non-zero result code
    Rejected(u32),
}

impl BindStatus {
    pub fn from_rc(rc: u32) -> Self {
        match rc {
            0 => BindStatus::Success,
            49 => BindStatus::InvalidCredentials,
            other => BindStatus::Rejected(other),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BindStatus::Success)
    }
}

/// A directory entry returned by a search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub dn: String,
    pub attrs: HashMap<String, Vec<String>>,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attrs: HashMap::new(),
        }
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attrs
            .entry(name.to_string())
            .or_default()
            .push(value.into());
        self
    }

    /// All values of an attribute; names compare case-insensitively
    pub fn values(&self, name: &str) -> &[String] {
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
            .unwrap_or(&[])
    }

    /// First value of an attribute
    pub fn first(&self, name: &str) -> Option<&str> {
        self.values(name).first().map(|s| s.as_str())
    }
}

/// Directory server information from the root DSE
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LdapServerInfo {
    pub vendor: Option<String>,
    pub version: Option<String>,
    pub naming_contexts: Vec<String>,
    pub supported_ldap_version: Vec<String>,
}
