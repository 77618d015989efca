//! Error types for Airgate

use std::fmt;

/// Main error type for Airgate
#[derive(Debug)]
pub enum Error {
    /// Configuration error
    Config(String),
    /// Database error
    Database(String),
    /// WBXML codec error
    Codec(String),
    /// ActiveSync protocol violation
    Protocol(String),
    /// Mail store failure
    Store(String),
    /// IO error
    Io(std::io::Error),
    /// Generic error
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Database(msg) => write!(f, "Database error: {}", msg),
            Error::Codec(msg) => write!(f, "WBXML error: {}", msg),
            Error::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            Error::Store(msg) => write!(f, "Mail store error: {}", msg),
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(err.to_string())
    }
}

/// Result type for Airgate operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Codec("unexpected END token".to_string());
        assert!(err.to_string().contains("WBXML error"));
    }

    #[test]
    fn test_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err = Error::from(io);
        assert!(matches!(err, Error::Io(_)));
    }
}
