//! Authentication error types

use std::time::Duration;
use thiserror::Error;

/// Result type for the login flow
pub type AuthResult<T> = Result<T, AuthError>;

/// Errors surfaced by the login flow
///
/// `Display` is meant for operator logs. User-facing text comes from
/// [`AuthError::user_message`], which never distinguishes an unknown user
/// from a wrong password.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Authentication failed")]
    Authentication,

    #[error("Directory unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error("Failed to write session: {0}")]
    SessionWrite(String),

    #[error("Invalid directory configuration: {0}")]
    Config(String),
}

impl AuthError {
    /// Short label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::Authentication => "rejected",
            AuthError::DirectoryUnavailable(_) | AuthError::Config(_) => "directory_unavailable",
            AuthError::SessionWrite(_) => "session_error",
        }
    }

    /// Generic message suitable for showing to the user
    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::Authentication => "Login failed: invalid username or password",
            AuthError::DirectoryUnavailable(_) | AuthError::Config(_) => {
                "Login failed: directory service unavailable, please try again later"
            }
            AuthError::SessionWrite(_) => "Login failed: please try again",
        }
    }
}

/// Errors raised by a directory connection
#[derive(Error, Debug, Clone)]
pub enum DirectoryError {
    #[error("Failed to connect to directory server: {0}")]
    Connect(String),

    #[error("Directory protocol error: {0}")]
    Protocol(String),

    #[error("Directory operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Directory connection already released")]
    Released,
}

impl From<DirectoryError> for AuthError {
    fn from(err: DirectoryError) -> Self {
        AuthError::DirectoryUnavailable(err.to_string())
    }
}

impl From<ldap3::LdapError> for DirectoryError {
    fn from(err: ldap3::LdapError) -> Self {
        DirectoryError::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages_do_not_leak_detail() {
        let err = AuthError::DirectoryUnavailable("bind to cn=admin failed: rc=49".into());
        assert!(!err.user_message().contains("cn=admin"));
        assert_eq!(
            AuthError::Authentication.user_message(),
            "Login failed: invalid username or password"
        );
    }

    #[test]
    fn test_directory_error_conversion() {
        let err: AuthError = DirectoryError::Timeout(Duration::from_secs(3)).into();
        assert!(matches!(err, AuthError::DirectoryUnavailable(_)));
        assert_eq!(err.kind(), "directory_unavailable");
    }
}
