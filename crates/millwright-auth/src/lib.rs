//! Directory-backed login for Millwright
//!
//! A login is a search-then-bind against the directory, followed by a
//! separate service-account search deciding chief group membership. The
//! result is a [`SessionPrincipal`] installed through a [`PrincipalStore`].

pub mod authenticator;
pub mod error;
pub mod flow;
pub mod ldap;
pub mod membership;
pub mod principal;

pub use authenticator::Authenticator;
pub use error::{AuthError, AuthResult, DirectoryError};
pub use flow::LoginFlow;
pub use ldap::{
    Credentials, Directory, DirectoryConnection, DirectoryIdentity, LdapConfig, LdapDirectory,
    LdapServerInfo,
};
pub use membership::MembershipResolver;
pub use principal::{AuthorizationResult, PrincipalStore, SessionPrincipal};
