//! In-memory directory for tests
//!
//! Evaluates RFC 4515 search filters (`&`, `|`, `!`, equality, presence and
//! substring items, `\xx` escapes) against a fixed set of entries, so filter
//! construction is exercised the way a real server would read it.

use crate::error::DirectoryError;
use crate::ldap::client::{Directory, DirectoryConnection};
use crate::ldap::types::*;
use async_trait::async_trait;
use millwright_core::config::LdapConfigSection;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const BASE_DN: &str = "dc=example,dc=com";
pub const PEOPLE_BASE: &str = "ou=People,dc=example,dc=com";
pub const GROUP_BASE: &str = "ou=Group,dc=example,dc=com";
pub const ADMIN_DN: &str = "cn=admin,dc=example,dc=com";
pub const ADMIN_PASSWORD: &str = "admin-secret";
pub const CHIEF_GID: u32 = 20010;

/// Configuration section pointing at the fixture layout above
pub fn fixture_section() -> LdapConfigSection {
    LdapConfigSection {
        server_url: "ldap://directory.test:389".to_string(),
        bind_dn: ADMIN_DN.to_string(),
        bind_password: ADMIN_PASSWORD.to_string(),
        user_search_base: PEOPLE_BASE.to_string(),
        group_search_base: GROUP_BASE.to_string(),
        chief_group_id: Some(CHIEF_GID),
        timeout_seconds: 2,
        ..Default::default()
    }
}

pub fn fixture_config() -> LdapConfig {
    match LdapConfig::from_section(&fixture_section()) {
        Ok(config) => config,
        Err(e) => panic!("fixture config is invalid: {}", e),
    }
}

/// Counters of directory traffic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectoryStats {
    pub opened: usize,
    pub binds: usize,
    pub searches: usize,
    pub unbound: usize,
}

#[derive(Default)]
struct State {
    entries: Vec<(DirectoryEntry, Option<String>)>,
    stats: DirectoryStats,
    unreachable: bool,
    failing_bases: Vec<String>,
    latency: Option<Duration>,
    filters: Vec<String>,
}

/// Shared, cloneable in-memory directory
#[derive(Clone, Default)]
pub struct InMemoryDirectory {
    state: Arc<Mutex<State>>,
}

impl InMemoryDirectory {
    /// Empty directory containing only the service account
    pub fn new() -> Self {
        let directory = Self::default();
        directory.add_entry(
            DirectoryEntry::new(ADMIN_DN).with_attr("cn", "admin"),
            Some(ADMIN_PASSWORD),
        );
        directory
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_entry(&self, entry: DirectoryEntry, password: Option<&str>) {
        self.state()
            .entries
            .push((entry, password.map(str::to_string)));
    }

    /// Add a posixAccount under the people base
    pub fn with_user(self, cn: &str, uid: &str, password: &str) -> Self {
        self.add_entry(
            DirectoryEntry::new(format!("cn={},{}", cn, PEOPLE_BASE))
                .with_attr("objectClass", "posixAccount")
                .with_attr("cn", cn)
                .with_attr("uid", uid),
            Some(password),
        );
        self
    }

    /// Add a posixGroup under the group base
    pub fn with_group(self, cn: &str, gid: u32, members: &[&str]) -> Self {
        let mut entry = DirectoryEntry::new(format!("cn={},{}", cn, GROUP_BASE))
            .with_attr("objectClass", "posixGroup")
            .with_attr("cn", cn)
            .with_attr("gidNumber", gid.to_string());
        for member in members {
            entry = entry.with_attr("memberUid", *member);
        }
        self.add_entry(entry, None);
        self
    }

    /// Refuse all connections
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    /// Fail every search below `base`
    pub fn fail_searches_under(self, base: &str) -> Self {
        self.state().failing_bases.push(base.to_ascii_lowercase());
        self
    }

    /// Delay every operation
    pub fn with_latency(self, latency: Duration) -> Self {
        self.state().latency = Some(latency);
        self
    }

    pub fn stats(&self) -> DirectoryStats {
        self.state().stats
    }

    /// Filters received so far, in order
    pub fn filters(&self) -> Vec<String> {
        self.state().filters.clone()
    }

    async fn delay(&self) {
        let latency = self.state().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn connect(&self) -> Result<Box<dyn DirectoryConnection>, DirectoryError> {
        self.delay().await;

        let mut state = self.state();
        if state.unreachable {
            return Err(DirectoryError::Connect("connection refused".to_string()));
        }
        state.stats.opened += 1;

        Ok(Box::new(InMemoryConnection {
            directory: self.clone(),
            bound_dn: None,
        }))
    }
}

struct InMemoryConnection {
    directory: InMemoryDirectory,
    bound_dn: Option<String>,
}

#[async_trait]
impl DirectoryConnection for InMemoryConnection {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<BindStatus, DirectoryError> {
        self.directory.delay().await;

        let mut state = self.directory.state();
        state.stats.binds += 1;

        // Empty password is an unauthenticated bind, which servers accept
        if password.is_empty() {
            self.bound_dn = None;
            return Ok(BindStatus::Success);
        }

        let matches = state.entries.iter().any(|(entry, secret)| {
            entry.dn.eq_ignore_ascii_case(dn) && secret.as_deref() == Some(password)
        });

        if matches {
            self.bound_dn = Some(dn.to_string());
            Ok(BindStatus::Success)
        } else {
            self.bound_dn = None;
            Ok(BindStatus::InvalidCredentials)
        }
    }

    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        _attrs: &[&str],
    ) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        self.directory.delay().await;

        let mut state = self.directory.state();
        state.stats.searches += 1;
        state.filters.push(filter.to_string());

        if self.bound_dn.is_none() {
            return Err(DirectoryError::Protocol("insufficient access rights".to_string()));
        }

        let base_lower = base.to_ascii_lowercase();
        if state
            .failing_bases
            .iter()
            .any(|failing| base_lower.ends_with(failing.as_str()))
        {
            return Err(DirectoryError::Protocol("search failed: busy".to_string()));
        }

        let filter = Filter::parse(filter).map_err(DirectoryError::Protocol)?;

        Ok(state
            .entries
            .iter()
            .map(|(entry, _)| entry)
            .filter(|entry| in_scope(&entry.dn, &base_lower, scope))
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect())
    }

    async fn unbind(&mut self) -> Result<(), DirectoryError> {
        self.bound_dn = None;
        self.directory.state().stats.unbound += 1;
        Ok(())
    }
}

fn in_scope(dn: &str, base_lower: &str, scope: SearchScope) -> bool {
    let dn = dn.to_ascii_lowercase();
    match scope {
        SearchScope::Base => dn == base_lower,
        SearchScope::OneLevel => dn
            .split_once(',')
            .map(|(_, parent)| parent == base_lower)
            .unwrap_or(false),
        SearchScope::Subtree => {
            dn == base_lower || dn.ends_with(&format!(",{}", base_lower))
        }
    }
}

// ============================================================================
// Filter evaluation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equal(String, String),
    Present(String),
    /// Value split on unescaped `*`
    Substring(String, Vec<String>),
}

impl Filter {
    pub fn parse(input: &str) -> Result<Filter, String> {
        let bytes = input.as_bytes();
        let (filter, consumed) = parse_filter(bytes, 0)?;
        if consumed != bytes.len() {
            return Err(format!("trailing data in filter at offset {}", consumed));
        }
        Ok(filter)
    }

    pub fn matches(&self, entry: &DirectoryEntry) -> bool {
        match self {
            Filter::And(items) => items.iter().all(|f| f.matches(entry)),
            Filter::Or(items) => items.iter().any(|f| f.matches(entry)),
            Filter::Not(inner) => !inner.matches(entry),
            Filter::Present(attr) => {
                attr.eq_ignore_ascii_case("objectClass") || !entry.values(attr).is_empty()
            }
            Filter::Equal(attr, value) => entry
                .values(attr)
                .iter()
                .any(|v| v.eq_ignore_ascii_case(value)),
            Filter::Substring(attr, parts) => entry
                .values(attr)
                .iter()
                .any(|v| substring_match(&v.to_lowercase(), parts)),
        }
    }
}

fn parse_filter(bytes: &[u8], pos: usize) -> Result<(Filter, usize), String> {
    if bytes.get(pos) != Some(&b'(') {
        return Err(format!("expected '(' at offset {}", pos));
    }

    match bytes.get(pos + 1) {
        Some(b'&') => parse_set(bytes, pos + 2).map(|(items, end)| (Filter::And(items), end)),
        Some(b'|') => parse_set(bytes, pos + 2).map(|(items, end)| (Filter::Or(items), end)),
        Some(b'!') => {
            let (inner, end) = parse_filter(bytes, pos + 2)?;
            if bytes.get(end) != Some(&b')') {
                return Err(format!("expected ')' at offset {}", end));
            }
            Ok((Filter::Not(Box::new(inner)), end + 1))
        }
        Some(_) => parse_item(bytes, pos + 1),
        None => Err("unexpected end of filter".to_string()),
    }
}

fn parse_set(bytes: &[u8], mut pos: usize) -> Result<(Vec<Filter>, usize), String> {
    let mut items = Vec::new();
    while bytes.get(pos) == Some(&b'(') {
        let (item, end) = parse_filter(bytes, pos)?;
        items.push(item);
        pos = end;
    }
    if bytes.get(pos) != Some(&b')') {
        return Err(format!("expected ')' at offset {}", pos));
    }
    if items.is_empty() {
        return Err("empty filter set".to_string());
    }
    Ok((items, pos + 1))
}

fn parse_item(bytes: &[u8], start: usize) -> Result<(Filter, usize), String> {
    let end = bytes[start..]
        .iter()
        .position(|b| *b == b')')
        .map(|offset| start + offset)
        .ok_or_else(|| "unterminated filter item".to_string())?;

    let item = std::str::from_utf8(&bytes[start..end]).map_err(|e| e.to_string())?;
    if item.contains('(') {
        return Err(format!("unescaped '(' in filter item {:?}", item));
    }

    let (attr, raw_value) = item
        .split_once('=')
        .ok_or_else(|| format!("missing '=' in filter item {:?}", item))?;
    if attr.is_empty() || attr.ends_with(['~', '<', '>', ':']) {
        return Err(format!("unsupported filter item {:?}", item));
    }

    let filter = if raw_value == "*" {
        Filter::Present(attr.to_string())
    } else if raw_value.contains('*') {
        let parts = raw_value
            .split('*')
            .map(|part| unescape(part).map(|p| p.to_lowercase()))
            .collect::<Result<Vec<_>, _>>()?;
        Filter::Substring(attr.to_string(), parts)
    } else {
        Filter::Equal(attr.to_string(), unescape(raw_value)?)
    };

    Ok((filter, end + 1))
}

fn unescape(value: &str) -> Result<String, String> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            let hex = value
                .get(i + 1..i + 3)
                .ok_or_else(|| format!("truncated escape in {:?}", value))?;
            let byte = u8::from_str_radix(hex, 16)
                .map_err(|_| format!("invalid escape \\{} in {:?}", hex, value))?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|e| e.to_string())
}

fn substring_match(value: &str, parts: &[String]) -> bool {
    let (first, rest) = match parts.split_first() {
        Some(split) => split,
        None => return false,
    };
    let (last, middle) = match rest.split_last() {
        Some(split) => split,
        None => return value == first.as_str(),
    };

    if !value.starts_with(first.as_str()) {
        return false;
    }
    let mut remaining = &value[first.len()..];
    for part in middle {
        match remaining.find(part.as_str()) {
            Some(idx) => remaining = &remaining[idx + part.len()..],
            None => return false,
        }
    }
    remaining.ends_with(last.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group() -> DirectoryEntry {
        DirectoryEntry::new("cn=chiefs,ou=Group,dc=example,dc=com")
            .with_attr("objectClass", "posixGroup")
            .with_attr("gidNumber", "20010")
            .with_attr("memberUid", "alice")
            .with_attr("memberUid", "bob")
    }

    #[test]
    fn test_equality_and_sets() {
        let f = Filter::parse("(&(objectClass=posixGroup)(gidNumber=20010)(memberUid=alice))").unwrap();
        assert!(f.matches(&group()));

        let f = Filter::parse("(&(gidNumber=20010)(memberUid=carol))").unwrap();
        assert!(!f.matches(&group()));

        let f = Filter::parse("(|(memberUid=carol)(!(gidNumber=1)))").unwrap();
        assert!(f.matches(&group()));
    }

    #[test]
    fn test_presence_and_substring() {
        assert!(Filter::parse("(memberUid=*)").unwrap().matches(&group()));
        assert!(Filter::parse("(memberUid=al*)").unwrap().matches(&group()));
        assert!(Filter::parse("(memberUid=*o*)").unwrap().matches(&group()));
        assert!(!Filter::parse("(memberUid=*z)").unwrap().matches(&group()));
    }

    #[test]
    fn test_escaped_value_is_literal() {
        let f = Filter::parse("(memberUid=\\2a\\29\\28uid=\\2a)").unwrap();
        assert_eq!(f, Filter::Equal("memberUid".into(), "*)(uid=*".into()));
        assert!(!f.matches(&group()));
    }

    #[test]
    fn test_unescaped_injection_widens_match() {
        // What an unescaped uid of `*)(uid=*` turns the filter into
        let f = Filter::parse("(&(gidNumber=20010)(memberUid=*)(uid=*))").unwrap();
        let group = group().with_attr("uid", "x");
        assert!(f.matches(&group));
    }

    #[test]
    fn test_malformed_filters() {
        assert!(Filter::parse("memberUid=alice").is_err());
        assert!(Filter::parse("(memberUid=alice").is_err());
        assert!(Filter::parse("(memberUid=alice))").is_err());
        assert!(Filter::parse("(&)").is_err());
        assert!(Filter::parse("(memberUid=\\zz)").is_err());
    }

    #[test]
    fn test_scope() {
        assert!(in_scope("cn=a,ou=People,dc=example,dc=com", "ou=people,dc=example,dc=com", SearchScope::Subtree));
        assert!(in_scope("cn=a,ou=People,dc=example,dc=com", "ou=people,dc=example,dc=com", SearchScope::OneLevel));
        assert!(!in_scope("cn=a,ou=Group,dc=example,dc=com", "ou=people,dc=example,dc=com", SearchScope::Subtree));
    }
}
