//! Error types for nray-core

use std::io;
use thiserror::Error;

/// Result type alias for nray operations
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error types shared across the coordinator and scanner nodes
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors with automatic conversion
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration errors (missing listen port, bad certificate paths, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid CIDR notation or address-space too large to enumerate
    #[error("Invalid CIDR: {0}")]
    InvalidCidr(String),

    /// Invalid port range or port specification
    #[error("Invalid port range: {0}")]
    InvalidPortRange(String),

    /// Errors raised while assigning, completing, or evicting jobs/nodes
    #[error("Pool error: {0}")]
    Pool(String),

    /// Wire protocol errors: malformed frame, unknown variant
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Serialization error (bincode/JSON/TOML)
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A send/recv deadline elapsed
    #[error("Operation timed out")]
    Timeout,

    /// A node or pool id was referenced that does not exist
    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<ipnetwork::IpNetworkError> for Error {
    fn from(err: ipnetwork::IpNetworkError) -> Self {
        Error::InvalidCidr(format!("{err}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(format!("JSON error: {err}"))
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(format!("TOML parse error: {err}"))
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Config(format!("TOML serialization error: {err}"))
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(format!("bincode error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Pool("no such node".to_string());
        assert_eq!(err.to_string(), "Pool error: no such node");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<Vec<i32>>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_network_error_conversion() {
        let net_err = "999.0.0.0/24".parse::<ipnetwork::IpNetwork>().unwrap_err();
        let err: Error = net_err.into();
        assert!(matches!(err, Error::InvalidCidr(_)));
    }
}
