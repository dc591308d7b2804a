//! Configuration for Millwright

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MillwrightConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub ldap: LdapConfigSection,
}

impl MillwrightConfig {
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content)
            .map_err(|e| crate::Error::ConfigError(format!("Failed to parse config: {}", e)))
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Override fields from `MILLWRIGHT_*` variables resolved through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("MILLWRIGHT_BIND_ADDRESS") {
            self.server.bind_address = addr;
        }
        if let Some(port) = lookup("MILLWRIGHT_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(url) = lookup("MILLWRIGHT_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(level) = lookup("MILLWRIGHT_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("MILLWRIGHT_LOG_FORMAT") {
            self.logging.format = format;
        }

        // Session
        if let Some(ttl) = lookup("MILLWRIGHT_SESSION_TTL_SECS").and_then(|v| v.parse().ok()) {
            self.session.ttl_secs = ttl;
        }
        if let Some(secure) = lookup("MILLWRIGHT_SESSION_SECURE") {
            self.session.secure = secure == "true";
        }

        // Directory
        if let Some(url) = lookup("MILLWRIGHT_LDAP_URL") {
            self.ldap.server_url = url;
        }
        if let Some(dn) = lookup("MILLWRIGHT_LDAP_BIND_DN") {
            self.ldap.bind_dn = dn;
        }
        if let Some(password) = lookup("MILLWRIGHT_LDAP_BIND_PASSWORD") {
            self.ldap.bind_password = password;
        }
        if let Some(base) = lookup("MILLWRIGHT_LDAP_USER_BASE") {
            self.ldap.user_search_base = base;
        }
        if let Some(attr) = lookup("MILLWRIGHT_LDAP_USERNAME_ATTRIBUTE") {
            self.ldap.username_attribute = attr;
        }
        if let Some(base) = lookup("MILLWRIGHT_LDAP_GROUP_BASE") {
            self.ldap.group_search_base = base;
        }
        if let Some(gid) = lookup("MILLWRIGHT_LDAP_CHIEF_GID").and_then(|v| v.parse().ok()) {
            self.ldap.chief_group_id = Some(gid);
        }
        if let Some(secs) = lookup("MILLWRIGHT_LDAP_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.ldap.timeout_seconds = secs;
        }
        if let Some(start_tls) = lookup("MILLWRIGHT_LDAP_START_TLS") {
            self.ldap.start_tls = start_tls == "true";
        }
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: crate::DEFAULT_PORT,
            request_timeout_secs: 30,
        }
    }
}

/// HTTP session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Inactivity window after which the session expires
    pub ttl_secs: u64,
    /// Session cookie name
    pub cookie_name: String,
    /// Only send the cookie over HTTPS
    pub secure: bool,
    /// SameSite=Lax (otherwise Strict)
    pub same_site_lax: bool,
    /// How often expired sessions are purged from the store
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: crate::DEFAULT_SESSION_TTL_SECS,
            cookie_name: "millwright.sid".to_string(),
            secure: false,
            same_site_lax: true,
            sweep_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://millwright.db?mode=rwc".to_string(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// LDAP directory configuration section
///
/// Deployment values (server URL, service account, search bases and the
/// chief group id) carry no defaults and must come from the config file or
/// the environment.
#[derive(Clone, Serialize, Deserialize)]
pub struct LdapConfigSection {
    /// LDAP server URL (ldap:// or ldaps://)
    #[serde(default)]
    pub server_url: String,

    /// Use STARTTLS
    #[serde(default)]
    pub start_tls: bool,

    /// Skip TLS certificate verification
    #[serde(default)]
    pub skip_tls_verify: bool,

    /// Service account DN used for searches
    #[serde(default)]
    pub bind_dn: String,

    /// Service account password
    #[serde(default)]
    pub bind_password: String,

    /// Base DN for user searches
    #[serde(default)]
    pub user_search_base: String,

    /// Attribute the login name is matched against
    #[serde(default = "default_username_attr")]
    pub username_attribute: String,

    /// Attribute holding the POSIX uid
    #[serde(default = "default_uid_attr")]
    pub uid_attribute: String,

    /// Attribute holding the display (common) name
    #[serde(default = "default_cn_attr")]
    pub common_name_attribute: String,

    /// Base DN for group searches
    #[serde(default)]
    pub group_search_base: String,

    /// Object class of group entries
    #[serde(default = "default_group_class")]
    pub group_object_class: String,

    /// Attribute holding the numeric group id
    #[serde(default = "default_gid_attr")]
    pub group_id_attribute: String,

    /// Numeric id of the chief group
    #[serde(default)]
    pub chief_group_id: Option<u32>,

    /// Multi-valued attribute listing member uids
    #[serde(default = "default_member_attr")]
    pub membership_attribute: String,

    /// Per round-trip timeout in seconds
    #[serde(default = "default_ldap_timeout")]
    pub timeout_seconds: u64,
}

impl fmt::Debug for LdapConfigSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LdapConfigSection")
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
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

fn default_username_attr() -> String {
    "cn".to_string()
}

fn default_uid_attr() -> String {
    "uid".to_string()
}

fn default_cn_attr() -> String {
    "cn".to_string()
}

fn default_group_class() -> String {
    "posixGroup".to_string()
}

fn default_gid_attr() -> String {
    "gidNumber".to_string()
}

fn default_member_attr() -> String {
    "memberUid".to_string()
}

fn default_ldap_timeout() -> u64 {
    10
}

impl Default for LdapConfigSection {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            start_tls: false,
            skip_tls_verify: false,
            bind_dn: String::new(),
            bind_password: String::new(),
            user_search_base: String::new(),
            username_attribute: default_username_attr(),
            uid_attribute: default_uid_attr(),
            common_name_attribute: default_cn_attr(),
            group_search_base: String::new(),
            group_object_class: default_group_class(),
            group_id_attribute: default_gid_attr(),
            chief_group_id: None,
            membership_attribute: default_member_attr(),
            timeout_seconds: default_ldap_timeout(),
        }
    }
}
