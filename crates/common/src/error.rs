//! Common error types for the uptime monitor crates.

use std::fmt;

/// A specialized Result type for uptime monitor operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for uptime monitor operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown error: {0}")]
    Other(String),
}

impl Error {
    /// Create a new bind error for a listen address.
    pub fn bind(addr: impl fmt::Display, source: std::io::Error) -> Self {
        Error::Bind {
            addr: addr.to_string(),
            source,
        }
    }

    /// Create a new other error.
    pub fn other(msg: impl fmt::Display) -> Self {
        Error::Other(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_display() {
        let err = Error::bind("0.0.0.0:8080", io::Error::new(io::ErrorKind::AddrInUse, "in use"));
        assert_eq!(err.to_string(), "Failed to bind 0.0.0.0:8080: in use");
        assert_eq!(Error::other("boom").to_string(), "Unknown error: boom");
    }

    #[test]
    fn test_bind_error_keeps_source() {
        use std::error::Error as _;

        let err = Error::bind("127.0.0.1:1", io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_serialization_error_conversion() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
