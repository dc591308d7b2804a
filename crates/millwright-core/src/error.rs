//! Error types for Millwright

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // Lookup Errors
    #[error("The specified machine does not exist: {0}")]
    NoSuchMachine(String),

    #[error("The specified department does not exist: {0}")]
    NoSuchDepartment(i64),

    #[error("Machine id already exists: {0}")]
    MachineAlreadyExists(String),

    // Validation Errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Database Errors
    #[error("Database error: {0}")]
    DatabaseError(String),

    // Configuration Errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Internal Errors
    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::NoSuchMachine(_) => "NoSuchMachine",
            Error::NoSuchDepartment(_) => "NoSuchDepartment",
            Error::MachineAlreadyExists(_) => "MachineAlreadyExists",
            Error::InvalidArgument(_) => "InvalidArgument",
            Error::DatabaseError(_) => "InternalError",
            Error::ConfigError(_) => "ConfigError",
            Error::InternalError(_) => "InternalError",
            Error::Io(_) => "InternalError",
            Error::Other(_) => "InternalError",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Error::InvalidArgument(_) => 400,

            Error::NoSuchMachine(_) | Error::NoSuchDepartment(_) => 404,

            Error::MachineAlreadyExists(_) => 409,

            _ => 500,
        }
    }

    /// Whether the error is caused by caller input rather than the server
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.http_status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::NoSuchMachine("M-1".into()).http_status(), 404);
        assert_eq!(Error::MachineAlreadyExists("M-1".into()).http_status(), 409);
        assert_eq!(Error::DatabaseError("boom".into()).http_status(), 500);
        assert!(Error::InvalidArgument("x".into()).is_client_error());
        assert!(!Error::InternalError("x".into()).is_client_error());
    }

    #[test]
    fn test_codes() {
        assert_eq!(Error::DatabaseError("x".into()).code(), "InternalError");
        assert_eq!(Error::NoSuchDepartment(3).code(), "NoSuchDepartment");
    }
}
